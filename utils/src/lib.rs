pub mod config;
pub mod nostr;
pub mod xlogging;

pub mod time {
    use std::time::SystemTime;

    pub fn time_now() -> u64 {
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0)
    }

    pub fn time_now_secs() -> u64 {
        time_now() / 1000
    }
}

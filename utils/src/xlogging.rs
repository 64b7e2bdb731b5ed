use serde::{Deserialize, Serialize};
use slog::{o, Drain, Logger};
use std::str::FromStr;

pub use slog;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoggingSettings {
    pub stdout: bool,
    pub level: String,
    pub log_path: Option<String>,
    pub name: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            stdout: true,
            level: "info".to_string(),
            log_path: None,
            name: "nip57_server".to_string(),
        }
    }
}

pub fn init_log(config: &LoggingSettings) -> Result<Logger, std::io::Error> {
    let LoggingSettings {
        stdout,
        level,
        log_path,
        name,
    } = config;

    let level = slog::Level::from_str(level).map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("Unknown logging level {:?}", level),
        )
    })?;

    let root = o!("name" => name.to_string());

    let drain_stdout_async = if *stdout {
        let decorator = slog_term::TermDecorator::new().build();
        let drain = slog_term::FullFormat::new(decorator).build().fuse();
        Some(slog_async::Async::new(drain).build().fuse())
    } else {
        None
    };

    let file_drain = match log_path {
        Some(path) => Some(build_file_drain(path)?),
        None => None,
    };

    let logger = match (drain_stdout_async, file_drain) {
        (Some(drain_stdout), Some(file_drain)) => {
            // create a logger w/ both a file drain and a stdout drain
            let drain = slog::Duplicate::new(drain_stdout, file_drain).fuse();
            Logger::root(slog::LevelFilter::new(drain, level).fuse(), root)
        }
        (Some(drain_stdout), None) => Logger::root(slog::LevelFilter::new(drain_stdout, level).fuse(), root),
        (None, Some(file_drain)) => Logger::root(slog::LevelFilter::new(file_drain, level).fuse(), root),
        (None, None) => Logger::root(slog::Discard, root),
    };
    Ok(logger)
}

fn build_file_drain(log_path: &str) -> Result<slog::Fuse<slog_async::Async>, std::io::Error> {
    let file = std::fs::OpenOptions::new().create(true).append(true).open(log_path)?;
    let decorator = slog_term::PlainSyncDecorator::new(file);
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    Ok(drain)
}

/// Logger that drops everything, for components built in tests.
pub fn discard() -> Logger {
    Logger::root(slog::Discard, o!())
}

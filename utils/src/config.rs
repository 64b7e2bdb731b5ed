use std::env;

/// Loads settings from `{FILE_NAME}.{ENV}.toml` (if `FILE_NAME` is set)
/// overlaid with `ZAPPER_*` environment variables. Nested keys use `__`,
/// e.g. `ZAPPER_LND__REST_ADDR`.
pub fn get_config_from_env<T>() -> Result<T, config::ConfigError>
where
    T: serde::de::DeserializeOwned,
{
    let environment: String = env::var("ENV").unwrap_or_else(|_| "dev".into());

    let mut builder = config::Config::builder();
    if let Ok(file_name) = env::var("FILE_NAME") {
        let file_path = format!("{}.{}.toml", file_name, environment);
        builder = builder.add_source(config::File::with_name(&file_path));
    }
    builder
        .add_source(
            config::Environment::with_prefix("ZAPPER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()
}

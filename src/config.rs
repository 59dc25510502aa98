use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_MODEL_PATH: &str = "models/atlas_model.json";
pub const DEFAULT_MODEL_COLUMNS_PATH: &str = "models/model_columns.json";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub model_path: PathBuf,
    pub model_columns_path: PathBuf,
    /// Expected SHA-256 of the model file; checked at load when set.
    pub model_sha256: Option<String>,
    pub rate_limit_per_second: u64,
    pub rate_limit_burst: u32,
    pub max_body_bytes: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            port: parse_or::<_, u16>(&lookup, "PORT", DEFAULT_PORT)
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))
                .and_then(|port| {
                    if port == 0 {
                        anyhow::bail!("PORT must be a valid number between 1-65535");
                    }
                    Ok(port)
                })?,
            model_path: path_or(&lookup, "MODEL_PATH", DEFAULT_MODEL_PATH)?,
            model_columns_path: path_or(&lookup, "MODEL_COLUMNS_PATH", DEFAULT_MODEL_COLUMNS_PATH)?,
            model_sha256: lookup("MODEL_SHA256")
                .map(|s| s.trim().to_ascii_lowercase())
                .filter(|s| !s.is_empty())
                .map(|digest| {
                    if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
                        anyhow::bail!("MODEL_SHA256 must be a 64-character hex digest");
                    }
                    Ok(digest)
                })
                .transpose()?,
            rate_limit_per_second: parse_or::<_, u64>(&lookup, "RATE_LIMIT_PER_SECOND", 10)
                .map_err(|_| anyhow::anyhow!("RATE_LIMIT_PER_SECOND must be a positive number"))
                .and_then(|n| {
                    if n == 0 {
                        anyhow::bail!("RATE_LIMIT_PER_SECOND must be a positive number");
                    }
                    Ok(n)
                })?,
            rate_limit_burst: parse_or::<_, u32>(&lookup, "RATE_LIMIT_BURST", 20)
                .map_err(|_| anyhow::anyhow!("RATE_LIMIT_BURST must be a positive number"))
                .and_then(|n| {
                    if n == 0 {
                        anyhow::bail!("RATE_LIMIT_BURST must be a positive number");
                    }
                    Ok(n)
                })?,
            max_body_bytes: parse_or::<_, usize>(&lookup, "MAX_BODY_BYTES", 1024 * 1024)
                .map_err(|_| anyhow::anyhow!("MAX_BODY_BYTES must be a number of bytes"))?,
        };

        tracing::debug!("Model path: {}", config.model_path.display());
        tracing::debug!("Model columns path: {}", config.model_columns_path.display());
        if config.model_sha256.is_some() {
            tracing::info!("Model checksum pinned via MODEL_SHA256");
        }
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, T::Err>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw.trim().parse(),
        _ => Ok(default),
    }
}

fn path_or<F>(lookup: &F, key: &str, default: &str) -> anyhow::Result<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if raw.trim().is_empty() => anyhow::bail!("{} cannot be empty", key),
        Some(raw) => Ok(PathBuf::from(raw.trim())),
        None => Ok(PathBuf::from(default)),
    }
}

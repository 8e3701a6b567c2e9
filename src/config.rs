use clap::{Args, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Process settings. Each flag falls back to an environment variable.
#[derive(Debug, Clone, Args)]
pub struct Config {
    /// SQLite database file
    #[arg(long = "db", env = "TICKETDESK_DB", default_value = "ticketdesk.db", global = true)]
    pub database_path: PathBuf,

    /// Shared HMAC secret used to verify bearer tokens
    #[arg(long = "secret", env = "TICKETDESK_SECRET", hide_env_values = true, global = true)]
    pub signing_secret: Option<String>,

    /// Lifetime of cached listings, in seconds
    #[arg(long = "cache-ttl", env = "TICKETDESK_CACHE_TTL_SECS", default_value_t = 300, global = true)]
    pub cache_ttl_secs: u64,

    /// Log output format
    #[arg(long = "log-format", env = "TICKETDESK_LOG_FORMAT", value_enum, default_value = "text", global = true)]
    pub log_format: LogFormat,
}

impl Config {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn secret(&self) -> anyhow::Result<&[u8]> {
        match self.signing_secret.as_deref() {
            Some(s) if !s.is_empty() => Ok(s.as_bytes()),
            _ => anyhow::bail!("No signing secret configured. Pass --secret or set TICKETDESK_SECRET"),
        }
    }
}

// Runtime configuration shared by the CLI and the API server

use std::env;
use std::path::PathBuf;

pub const DEFAULT_DB_PATH: &str = "fin_insight.db";
pub const DEFAULT_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// SQLite database file
    pub db_path: PathBuf,
    /// Bind address for the API server
    pub addr: String,
    /// Client account used by the CLI (the server reads it per request)
    pub client_id: Option<i64>,
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            addr: DEFAULT_ADDR.to_string(),
            client_id: None,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl AppConfig {
    /// Load `.env` (if any) and read FIN_INSIGHT_* variables on top of defaults
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Self {
            db_path: lookup("FIN_INSIGHT_DB")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            addr: lookup("FIN_INSIGHT_ADDR").unwrap_or(defaults.addr),
            client_id: lookup("FIN_INSIGHT_CLIENT").and_then(|v| v.trim().parse().ok()),
            log_filter: lookup("RUST_LOG").unwrap_or(defaults.log_filter),
        }
    }
}

/// Install the tracing subscriber used by both binaries. Logs go to stderr so
/// CLI output and the TUI keep stdout.
pub fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_new(&config.log_filter)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_when_unset() {
        let config = AppConfig::from_lookup(|_| None);
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.db_path, PathBuf::from("fin_insight.db"));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("FIN_INSIGHT_DB", "/tmp/x.db"),
            ("FIN_INSIGHT_ADDR", "127.0.0.1:8080"),
            ("FIN_INSIGHT_CLIENT", " 42 "),
        ]
        .into_iter()
        .collect();

        let config = AppConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.db_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(config.addr, "127.0.0.1:8080");
        assert_eq!(config.client_id, Some(42));
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn test_bad_client_id_ignored() {
        let config = AppConfig::from_lookup(|k| {
            (k == "FIN_INSIGHT_CLIENT").then(|| "abc".to_string())
        });
        assert_eq!(config.client_id, None);
    }
}

use config::{builder::DefaultState, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

pub const PHISHTANK_FEED_URL: &str = "http://data.phishtank.com/data/online-valid.csv";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub model_path: String,
    pub history_path: String,
    pub feed_url: String,
    pub feed_cache_path: String,
    pub feed_max_age_secs: u64,
    pub http_timeout_secs: u64,
    pub clickhouse_url: Option<String>,
    pub clickhouse_database: String,
    pub clickhouse_user: Option<String>,
    pub clickhouse_password: Option<String>,
    pub threat_log_table: String,
    pub email_relay_url: String,
    pub email_user: Option<String>,
    pub email_password: Option<String>,
    pub report_recipient: String,
}

impl Config {
    /// Defaults, then an optional `threatlens.toml`, then the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_environment(Environment::default())
    }

    /// Environment values stay strings; numeric fields are converted when
    /// the struct is deserialized.
    fn from_environment(environment: Environment) -> Result<Self, ConfigError> {
        Self::defaults()?
            .add_source(File::with_name("threatlens").required(false))
            .add_source(environment)
            .build()?
            .try_deserialize()
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        config::Config::builder()
            .set_default("host", "0.0.0.0")?
            .set_default("port", 5001)?
            .set_default("model_path", "./cyber_threat_model/model.json")?
            .set_default("history_path", "threat_history.json")?
            .set_default("feed_url", PHISHTANK_FEED_URL)?
            .set_default("feed_cache_path", "phishtank.csv")?
            .set_default("feed_max_age_secs", 3600)?
            .set_default("http_timeout_secs", 30)?
            .set_default("clickhouse_database", "default")?
            .set_default("threat_log_table", "threat_logs")?
            .set_default("email_relay_url", "http://localhost:8025/api/send")?
            .set_default("report_recipient", "alerts@threatlens.local")
    }

    #[cfg(test)]
    pub(crate) fn test_default() -> Self {
        Self::defaults()
            .and_then(|builder| builder.build())
            .and_then(|config| config.try_deserialize())
            .expect("default configuration")
    }

    pub fn feed_max_age(&self) -> Duration {
        Duration::from_secs(self.feed_max_age_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Both halves of the relay login, or `None` if either is unset or blank.
    pub fn email_credentials(&self) -> Option<(String, String)> {
        let user = self.email_user.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        let password = self.email_password.as_deref().filter(|s| !s.is_empty())?;
        Some((user.to_string(), password.to_string()))
    }
}

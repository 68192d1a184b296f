use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use thiserror::Error;

const DEFAULT_HANDSHAKE_TIMEOUT: &str = "60s";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Startup configuration of the webhook process.
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// API group the webhook is registered under.
    pub group_name: String,
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_handshake_timeout() -> String {
    DEFAULT_HANDSHAKE_TIMEOUT.to_owned()
}

impl Settings {
    pub fn new() -> Result<Self, SettingsError> {
        let mut builder = Config::builder();
        if let Ok(group_name) = std::env::var("GROUP_NAME") {
            builder = builder.set_default("group_name", group_name)?;
        }

        let cfg = builder
            .add_source(File::with_name("config").required(false))
            .add_source(File::with_name("/etc/dynu-dns-solver/config").required(false))
            .add_source(Environment::with_prefix("APP"))
            .build()?;

        Self::from_config(cfg)
    }

    fn from_config(cfg: Config) -> Result<Self, SettingsError> {
        let settings: Self = cfg.try_deserialize()?;

        if settings.group_name.is_empty() {
            return Err(SettingsError::MissingGroupName);
        }
        settings.handshake_timeout()?;

        Ok(settings)
    }

    pub fn handshake_timeout(&self) -> Result<Duration, SettingsError> {
        Ok(humantime::parse_duration(&self.handshake_timeout)?)
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error(transparent)]
    ConfigError(#[from] ConfigError),
    #[error("group_name must be specified")]
    MissingGroupName,
    #[error("invalid handshake_timeout: {0}")]
    DurationError(#[from] humantime::DurationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(overrides: &[(&str, &str)]) -> Result<Settings, SettingsError> {
        let mut builder = Config::builder();
        for (key, value) in overrides {
            builder = builder.set_override(*key, *value).unwrap();
        }
        Settings::from_config(builder.build().unwrap())
    }

    #[test]
    fn applies_defaults() {
        let settings = settings(&[("group_name", "acme.example.com")]).unwrap();

        assert_eq!(settings.group_name, "acme.example.com");
        assert_eq!(settings.log_format, LogFormat::Text);
        assert_eq!(settings.handshake_timeout().unwrap(), Duration::from_secs(60));
    }

    #[test]
    fn reads_overrides() {
        let settings = settings(&[
            ("group_name", "acme.example.com"),
            ("handshake_timeout", "1m 30s"),
            ("log_format", "json"),
        ])
        .unwrap();

        assert_eq!(settings.log_format, LogFormat::Json);
        assert_eq!(settings.handshake_timeout().unwrap(), Duration::from_secs(90));
    }

    #[test]
    fn requires_group_name() {
        assert!(matches!(
            settings(&[("group_name", "")]),
            Err(SettingsError::MissingGroupName)
        ));
        assert!(matches!(settings(&[]), Err(SettingsError::ConfigError(_))));
    }

    #[test]
    fn rejects_bad_timeout() {
        assert!(matches!(
            settings(&[("group_name", "acme.example.com"), ("handshake_timeout", "soon")]),
            Err(SettingsError::DurationError(_))
        ));
    }
}

use serde::Deserialize;
use thiserror::Error;

use crate::oauth2::flow::is_http_url;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Settings for the single upstream identity provider.
#[derive(Clone, Debug, Deserialize)]
pub struct UpstreamConfig {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_authorization_endpoint")]
    pub authorization_endpoint: String,
    #[serde(default = "default_token_endpoint")]
    pub token_endpoint: String,
    #[serde(default = "default_scope")]
    pub scope: String,
    /// Upper bound for the server-to-server code exchange.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SweepConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_sweep_interval_secs")]
    pub interval_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Exposure of the storage latency histograms on `/metrics`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Externally visible base URL of this service. The upstream provider sends
    /// users back to `<public_url>/callback`.
    pub public_url: String,
    /// Where browsers land after a failed callback or a revoke without `callback`.
    #[serde(default = "default_landing_url")]
    pub landing_url: String,
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl AppConfig {
    /// The fixed return endpoint registered with the upstream provider.
    pub fn callback_url(&self) -> String {
        format!("{}/callback", self.public_url.trim_end_matches('/'))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.upstream.client_id.is_empty() {
            return Err(ConfigError::Validation(
                "upstream.client_id must not be empty".into(),
            ));
        }
        for (name, value) in [
            ("public_url", &self.public_url),
            ("landing_url", &self.landing_url),
            (
                "upstream.authorization_endpoint",
                &self.upstream.authorization_endpoint,
            ),
            ("upstream.token_endpoint", &self.upstream.token_endpoint),
        ] {
            if !is_http_url(value) {
                return Err(ConfigError::Validation(format!(
                    "{name} must be an http(s) URL"
                )));
            }
        }
        if self.upstream.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "upstream.timeout_secs must be > 0".into(),
            ));
        }
        if self.sweep.interval_secs == 0 {
            return Err(ConfigError::Validation(
                "sweep.interval_secs must be > 0".into(),
            ));
        }
        Ok(())
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_landing_url() -> String {
    "https://www.example.com/".to_string()
}

fn default_authorization_endpoint() -> String {
    "https://accounts.google.com/o/oauth2/auth".to_string()
}

fn default_token_endpoint() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_scope() -> String {
    "https://www.googleapis.com/auth/userinfo.email".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_sweep_interval_secs() -> u64 {
    3600
}

fn default_true() -> bool {
    true
}

/// Load application configuration from `config.yaml` + environment overrides.
///
/// Any environment variable matching the key path separated by double underscores
/// (e.g. `UPSTREAM__CLIENT_SECRET`) overrides the file value.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};
    let cfg = Config::builder()
        .add_source(File::with_name("config.yaml").required(false))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    app.validate()?;
    Ok(app)
}

/// Convenience helper for binaries wanting panic-on-error behaviour.
pub fn load_config_or_panic() -> AppConfig {
    match load_config() {
        Ok(c) => c,
        Err(e) => panic!("Failed to load configuration: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            database_url: "sqlite::memory:".into(),
            listen_addr: default_listen_addr(),
            public_url: "https://auth.example.com/".into(),
            landing_url: default_landing_url(),
            upstream: UpstreamConfig {
                client_id: "upstream-id".into(),
                client_secret: "upstream-secret".into(),
                authorization_endpoint: default_authorization_endpoint(),
                token_endpoint: default_token_endpoint(),
                scope: default_scope(),
                timeout_secs: 10,
            },
            sweep: SweepConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }

    #[test]
    fn callback_url_strips_trailing_slash() {
        assert_eq!(
            base_config().callback_url(),
            "https://auth.example.com/callback"
        );
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_upstream_client() {
        let mut cfg = base_config();
        cfg.upstream.client_id.clear();
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn validate_rejects_non_http_public_url() {
        let mut cfg = base_config();
        cfg.public_url = "ftp://auth.example.com".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_hostless_urls() {
        let mut cfg = base_config();
        cfg.upstream.token_endpoint = "https://".into();
        assert!(cfg.validate().is_err());

        let mut cfg = base_config();
        cfg.landing_url = "file:///tmp/landing".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_intervals() {
        let mut cfg = base_config();
        cfg.sweep.interval_secs = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = base_config();
        cfg.upstream.timeout_secs = 0;
        assert!(cfg.validate().is_err());
    }
}

//! Service configuration loading.
//!
//! The `ENV` environment variable (`development`, `production`, `staging`,
//! `testing`) selects `config/<ENV>.yaml`. The DMData refresh token comes
//! from the `REFRESH_TOKEN` environment variable, never from the file;
//! `DMDATA_WEBHOOK_URL` optionally enables the raw-telegram webhook.
//!
//! Any missing or invalid piece is a boot failure (exit 1 in main).

use std::path::Path;

use serde::Deserialize;

use crate::errors::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunEnvironment {
    Development,
    Production,
    Staging,
    Testing,
}

impl RunEnvironment {
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var("ENV").as_deref() {
            Ok("development") => Ok(Self::Development),
            Ok("production") => Ok(Self::Production),
            Ok("staging") => Ok(Self::Staging),
            Ok("testing") => Ok(Self::Testing),
            Ok(other) => Err(ConfigError::Invalid(format!("unknown ENV '{other}'"))),
            Err(_) => Err(ConfigError::MissingEnv("ENV")),
        }
    }

    pub fn config_file(self) -> &'static str {
        match self {
            Self::Development => "development.yaml",
            Self::Production => "production.yaml",
            Self::Staging => "staging.yaml",
            Self::Testing => "testing.yaml",
        }
    }
}

/// Which periodic modules the scheduler registers.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleFlags {
    pub p2p_earthquake: bool,
    pub shake_level: bool,
    pub eew: bool,
    pub tsunami: bool,
    pub global_earthquake: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DmdataConfig {
    pub enabled: bool,
    pub client_id: String,
    pub client_token: String,
    /// Sent as `appName` when opening the socket session.
    #[serde(default = "default_app_name")]
    pub app_name: String,
}

fn default_app_name() -> String {
    "JQuake-1.8.5".to_owned()
}

#[derive(Debug, Clone, Deserialize)]
pub struct EewConfig {
    /// When set, the arbitrator never falls back to the kmoni event.
    #[serde(default)]
    pub only_dmdata: bool,
    /// Offset added to the local clock to align it with the vendor's
    /// wall clock before recency checks.
    #[serde(default = "default_clock_offset")]
    pub clock_offset_secs: i64,
}

fn default_clock_offset() -> i64 {
    3600
}

#[derive(Debug, Clone, Deserialize)]
pub struct GlobalEarthquakeConfig {
    #[serde(default = "default_list_count")]
    pub list_count: usize,
}

fn default_list_count() -> usize {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:8900".to_owned()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetsConfig {
    #[serde(default = "default_assets_dir")]
    pub dir: String,
}

fn default_assets_dir() -> String {
    "assets".to_owned()
}

/// Top-level service configuration (deserialized from `config/<ENV>.yaml`,
/// then completed from the environment).
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub modules: ModuleFlags,
    pub dmdata: DmdataConfig,
    pub eew: EewConfig,
    #[serde(default)]
    pub global_earthquake: Option<GlobalEarthquakeConfig>,
    #[serde(default)]
    pub server: Option<ServerConfig>,
    #[serde(default)]
    pub assets: Option<AssetsConfig>,

    // Environment-sourced; never present in the YAML.
    #[serde(skip)]
    pub refresh_token: String,
    #[serde(skip)]
    pub webhook_url: Option<String>,
}

impl Config {
    /// Load `config/<ENV>.yaml` from `config_dir` and complete the
    /// environment-sourced fields.
    pub fn load(env: RunEnvironment, config_dir: &Path) -> Result<Self, ConfigError> {
        let path = config_dir.join(env.config_file());
        let raw = std::fs::read_to_string(&path)?;
        let mut config: Config = serde_yaml::from_str(&raw)?;

        if config.dmdata.enabled {
            let token = std::env::var("REFRESH_TOKEN").unwrap_or_default();
            if token.is_empty() {
                return Err(ConfigError::MissingEnv("REFRESH_TOKEN"));
            }
            if config.dmdata.client_id.is_empty() || config.dmdata.client_token.is_empty() {
                return Err(ConfigError::Invalid(
                    "dmdata enabled but client_id/client_token missing".to_owned(),
                ));
            }
            config.refresh_token = token;
        }
        config.webhook_url = std::env::var("DMDATA_WEBHOOK_URL").ok().filter(|u| !u.is_empty());

        Ok(config)
    }

    pub fn bind_addr(&self) -> String {
        self.server
            .as_ref()
            .map_or_else(default_bind, |s| s.bind.clone())
    }

    pub fn assets_dir(&self) -> String {
        self.assets
            .as_ref()
            .map_or_else(default_assets_dir, |a| a.dir.clone())
    }

    pub fn global_list_count(&self) -> usize {
        self.global_earthquake
            .as_ref()
            .map_or_else(default_list_count, |g| g.list_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = "\
modules:
  p2p_earthquake: true
  shake_level: true
  eew: true
  tsunami: true
  global_earthquake: false
dmdata:
  enabled: false
  client_id: \"\"
  client_token: \"\"
eew:
  only_dmdata: false
";

    #[test]
    fn minimal_config_parses_with_defaults() {
        let config: Config = serde_yaml::from_str(MINIMAL).unwrap();
        assert!(config.modules.p2p_earthquake);
        assert!(!config.dmdata.enabled);
        assert_eq!(config.eew.clock_offset_secs, 3600);
        assert_eq!(config.bind_addr(), "127.0.0.1:8900");
        assert_eq!(config.global_list_count(), 5);
    }

    #[test]
    fn load_requires_refresh_token_when_dmdata_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = MINIMAL.replace("enabled: false", "enabled: true");
        let yaml = yaml.replace("client_id: \"\"", "client_id: \"CLIENT\"");
        let yaml = yaml.replace("client_token: \"\"", "client_token: \"SECRET\"");
        std::fs::write(dir.path().join("testing.yaml"), yaml).unwrap();

        std::env::remove_var("REFRESH_TOKEN");
        let err = Config::load(RunEnvironment::Testing, dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnv("REFRESH_TOKEN")));
    }
}

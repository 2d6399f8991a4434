//! Capability registry client configuration types and loading

use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::{Capability, ProviderIdentity, ProviderRecord};
use crate::notifier::NotifierConfig;

/// Main client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Client identity and request defaults
    pub client: ClientConfig,

    /// Heartbeat schedule
    pub notifier: NotifierConfig,

    /// Provider announced by the demo
    pub provider: ProviderConfig,

    /// Log level used when `--log-level` is not given
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl Config {
    /// Validate configuration before use
    pub fn validate(&self) -> Result<()> {
        self.notifier.validate()?;
        if self.client.reply_to.trim().is_empty() {
            return Err(eyre!("client reply-to must not be empty"));
        }
        if self.client.hostname.trim().is_empty() {
            return Err(eyre!("client hostname must not be empty"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    ///
    /// An explicit path must load and validate. Otherwise the first search
    /// path that does is used; broken candidates are skipped with a warning.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_validated(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::search_paths() {
            if !candidate.exists() {
                continue;
            }
            match Self::load_validated(&candidate) {
                Ok(config) => return Ok(config),
                Err(e) => tracing::warn!("Skipping config {}: {:#}", candidate.display(), e),
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Implicit config locations: `./.capregistry.yml`, then the user config dir
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".capregistry.yml")];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("capregistry").join("capregistry.yml"));
        }
        paths
    }

    fn load_validated(path: &Path) -> Result<Self> {
        let config = Self::load_from_file(path)?;
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Client identity and request defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Host name stamped on every outbound message
    pub hostname: String,

    /// Reply destination the registry answers requests on
    #[serde(rename = "reply-to")]
    pub reply_to: String,

    /// Default timeout for request/reply calls in milliseconds
    #[serde(rename = "request-timeout-ms")]
    pub request_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            reply_to: default_reply_to(),
            request_timeout_ms: 10_000,
        }
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Provider announced on registration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub identity: ProviderIdentity,
    pub capabilities: Vec<Capability>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            identity: ProviderIdentity::new(format!("capregistry-{}", default_hostname()))
                .with_description("capability registry client"),
            capabilities: vec![Capability::new("heartbeat").with_profile("v1")],
        }
    }
}

impl ProviderConfig {
    pub fn record(&self) -> ProviderRecord {
        ProviderRecord::new(self.identity.clone(), self.capabilities.clone())
    }
}

/// Local host name, or `localhost` when it cannot be determined
pub fn default_hostname() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

fn default_reply_to() -> String {
    format!("capregistry.reply.{}", uuid::Uuid::now_v7().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.client.hostname.is_empty());
        assert!(config.client.reply_to.starts_with("capregistry.reply."));
        assert_eq!(config.client.request_timeout_ms, 10_000);
        assert_eq!(config.notifier, NotifierConfig::default());
        assert!(config.log_level.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_reply_to_is_unique() {
        assert_ne!(ClientConfig::default().reply_to, ClientConfig::default().reply_to);
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
client:
  hostname: node-a
  reply-to: replies.node-a
  request-timeout-ms: 500
notifier:
  initial-delay-ms: 10
  period-ms: 1000
  shutdown-wait-ms: 50
provider:
  identity:
    name: storage
    description: block storage
  capabilities:
    - name: volumes
      profile: v2
    - name: snapshots
log-level: debug
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.client.hostname, "node-a");
        assert_eq!(config.client.reply_to, "replies.node-a");
        assert_eq!(config.client.request_timeout(), Duration::from_millis(500));
        assert_eq!(config.notifier.initial_delay_ms, 10);
        assert_eq!(config.notifier.period_ms, 1000);
        assert_eq!(config.notifier.shutdown_wait_ms, 50);
        assert_eq!(config.provider.identity.name, "storage");
        assert_eq!(config.provider.identity.description.as_deref(), Some("block storage"));
        assert_eq!(config.provider.capabilities.len(), 2);
        assert_eq!(config.provider.capabilities[1].profile, None);
        assert_eq!(config.log_level.as_deref(), Some("debug"));

        let record = config.provider.record();
        assert!(record.offers("snapshots"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
client:
  hostname: node-b
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.client.hostname, "node-b");
        assert_eq!(config.client.request_timeout_ms, 10_000);
        assert!(config.client.reply_to.starts_with("capregistry.reply."));
        assert_eq!(config.notifier.period_ms, 30_000);
        assert!(!config.provider.capabilities.is_empty());
    }

    #[test]
    fn test_validate_rejects_zero_period() {
        let mut config = Config::default();
        config.notifier.period_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_reply_to() {
        let mut config = Config::default();
        config.client.reply_to = "  ".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("reply-to"));
    }

    #[test]
    fn test_load_explicit_path() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "client:\n  hostname: from-file\nnotifier:\n  period-ms: 250").unwrap();

        let path = file.path().to_path_buf();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.client.hostname, "from-file");
        assert_eq!(config.notifier.period_ms, 250);
    }

    #[test]
    fn test_load_explicit_path_missing_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.yml");
        let err = Config::load(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("Failed to load config"));
    }

    #[test]
    fn test_load_explicit_path_validates() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "notifier:\n  period-ms: 0").unwrap();

        let path = file.path().to_path_buf();
        let err = Config::load(Some(&path)).unwrap_err();
        assert!(format!("{err:#}").contains("Invalid configuration"));
    }

    #[test]
    fn test_search_paths_start_with_project_local() {
        let paths = Config::search_paths();
        assert_eq!(paths[0], PathBuf::from(".capregistry.yml"));
        assert!(paths.iter().skip(1).all(|p| p.ends_with("capregistry/capregistry.yml")));
    }

    #[test]
    fn test_load_explicit_path_invalid_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "client: [not, a, map").unwrap();
        let path = file.path().to_path_buf();
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_roundtrip_yaml() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("reply-to"));
        assert!(yaml.contains("period-ms"));
        assert!(!yaml.contains("log-level"));
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.client.reply_to, config.client.reply_to);
    }
}

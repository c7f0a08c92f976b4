//! `edgegate.toml` manifest for native hosts.
//!
//! ```toml
//! [gateway]
//! name = "DNS Manager Worker"
//!
//! [backend]
//! origin = "https://dns.example.com"
//!
//! [cache]
//! ttl_secs = 300
//!
//! [server]
//! addr = "127.0.0.1:8787"
//! ```

use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::LevelFilter;
use serde::Deserialize;
use validator::{Validate, ValidateUrl, ValidationError};

use crate::cache::DEFAULT_CACHE_TTL;
use crate::config::{DatabaseBinding, GatewayConfig, WorkerIdentity};

/// Default manifest file name looked up in the working directory.
pub const MANIFEST_FILE: &str = "edgegate.toml";
/// Environment variable overriding `[server] addr`.
pub const ADDR_VAR: &str = "EDGEGATE_ADDR";

const DEFAULT_ADDR: &str = "127.0.0.1:8787";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse manifest: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid manifest: {0}")]
    Invalid(String),
}

impl From<validator::ValidationErrors> for ConfigError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ConfigError::Invalid(errors.to_string())
    }
}

pub struct ManifestLoader {
    manifest: Arc<Manifest>,
    path: Option<PathBuf>,
}

impl ManifestLoader {
    pub fn load_from_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            manifest: Arc::new(Manifest::parse(contents)?),
            path: None,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            manifest: Arc::new(Manifest::parse(&contents)?),
            path: Some(path.to_path_buf()),
        })
    }

    /// Load `path` when it exists, otherwise fall back to an all-defaults manifest.
    pub fn from_path_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_path(path)
        } else {
            log::info!(
                "manifest {} not found; using defaults",
                path.display()
            );
            Self::load_from_str("")
        }
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Source file, when the manifest was read from disk.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    #[validate(nested)]
    pub gateway: ManifestGateway,
    #[serde(default)]
    #[validate(nested)]
    pub backend: ManifestBackend,
    #[serde(default)]
    #[validate(nested)]
    pub cache: ManifestCache,
    #[serde(default)]
    #[validate(nested)]
    pub database: ManifestDatabase,
    #[serde(default)]
    #[validate(nested)]
    pub server: ManifestServer,
    #[serde(default)]
    pub logging: ManifestLogging,
}

impl Manifest {
    fn parse(contents: &str) -> Result<Self, ConfigError> {
        let manifest: Manifest = toml::from_str(contents)?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn identity(&self) -> WorkerIdentity {
        let mut identity = WorkerIdentity::default();
        let gateway = &self.gateway;
        if let Some(worker) = &gateway.worker {
            identity.worker = worker.clone();
        }
        if let Some(name) = &gateway.name {
            identity.name = name.clone();
        }
        if let Some(version) = &gateway.version {
            identity.version = version.clone();
        }
        if let Some(description) = &gateway.description {
            identity.description = description.clone();
        }
        if let Some(documentation) = &gateway.documentation {
            identity.documentation = documentation.clone();
        }
        identity
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache
            .ttl_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_CACHE_TTL)
    }

    /// Gateway configuration without a cache store; the host attaches one when `[cache]` is
    /// enabled.
    pub fn gateway_config(&self) -> GatewayConfig {
        let mut config = GatewayConfig::new()
            .with_identity(self.identity())
            .with_cache_ttl(self.cache_ttl());
        if let Some(origin) = &self.backend.origin {
            config = config.with_backend(origin.clone());
        }
        if let Some(key) = &self.backend.api_key {
            config = config.with_api_key(key.clone());
        }
        if let Some(name) = &self.database.name {
            config = config.with_database(DatabaseBinding::new(name.clone()));
        }
        config
    }

    /// Listen address, with `EDGEGATE_ADDR` from `lookup` taking precedence over `[server]`.
    pub fn server_addr<F>(&self, lookup: F) -> Result<SocketAddr, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw = lookup(ADDR_VAR)
            .filter(|value| !value.trim().is_empty())
            .or_else(|| self.server.addr.clone())
            .unwrap_or_else(|| DEFAULT_ADDR.to_string());
        raw.trim()
            .parse()
            .map_err(|err| ConfigError::Invalid(format!("invalid listen address `{raw}`: {err}")))
    }

    pub fn log_level(&self) -> LogLevel {
        self.logging.level.unwrap_or_default()
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ManifestGateway {
    #[serde(default)]
    #[validate(length(min = 1))]
    pub worker: Option<String>,
    #[serde(default)]
    #[validate(length(min = 1))]
    pub name: Option<String>,
    #[serde(default)]
    #[validate(length(min = 1))]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    #[validate(url)]
    pub documentation: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ManifestBackend {
    /// A blank value means "not configured".
    #[serde(default)]
    #[validate(custom(function = "blank_or_url"))]
    pub origin: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

fn blank_or_url(origin: &str) -> Result<(), ValidationError> {
    if origin.trim().is_empty() || origin.validate_url() {
        Ok(())
    } else {
        Err(ValidationError::new("url"))
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ManifestCache {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    #[validate(range(min = 60, max = 31_536_000))]
    pub ttl_secs: Option<u64>,
}

impl Default for ManifestCache {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: None,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ManifestDatabase {
    #[serde(default)]
    #[validate(length(min = 1))]
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ManifestServer {
    #[serde(default)]
    #[validate(length(min = 1))]
    pub addr: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestLogging {
    #[serde(default)]
    pub level: Option<LogLevel>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Off,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Off => "off",
        }
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::Trace,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Off => LevelFilter::Off,
        }
    }
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        match value.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            "off" => Ok(Self::Off),
            other => Err(serde::de::Error::custom(format!(
                "logging level must be trace, debug, info, warn, error, or off (got `{}`)",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"
[gateway]
worker = "edge-dns"
name = "Edge DNS"
version = "2.1.0"

[backend]
origin = "https://dns.example.com"
api_key = "manifest-key"

[cache]
ttl_secs = 120

[database]
name = "DNS_DB"

[server]
addr = "0.0.0.0:9000"

[logging]
level = "Debug"
"#;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn parse_manifest_sample() {
        let loader = ManifestLoader::load_from_str(SAMPLE).expect("manifest");
        let manifest = loader.manifest();
        assert!(loader.path().is_none());
        assert_eq!(manifest.cache_ttl(), Duration::from_secs(120));
        assert!(manifest.cache.enabled);
        assert_eq!(manifest.log_level(), LogLevel::Debug);
        assert_eq!(
            manifest.server_addr(no_env).unwrap(),
            "0.0.0.0:9000".parse::<SocketAddr>().unwrap()
        );

        let identity = manifest.identity();
        assert_eq!(identity.worker, "edge-dns");
        assert_eq!(identity.name, "Edge DNS");
        assert_eq!(identity.version, "2.1.0");
        assert_eq!(identity.description, WorkerIdentity::default().description);
    }

    #[test]
    fn gateway_config_reflects_manifest() {
        let loader = ManifestLoader::load_from_str(SAMPLE).expect("manifest");
        let config = loader.manifest().gateway_config();
        assert_eq!(config.backend().unwrap().as_str(), "https://dns.example.com");
        assert_eq!(config.api_key(), Some("manifest-key"));
        assert_eq!(config.database().unwrap().name, "DNS_DB");
        assert_eq!(config.cache_ttl(), Duration::from_secs(120));
        assert!(config.cache().is_none());
    }

    #[test]
    fn empty_manifest_uses_defaults() {
        let loader = ManifestLoader::load_from_str("").expect("manifest");
        let manifest = loader.manifest();
        let config = manifest.gateway_config();
        assert!(config.backend().is_none());
        assert_eq!(config.cache_ttl(), DEFAULT_CACHE_TTL);
        assert_eq!(config.identity(), &WorkerIdentity::default());
        assert_eq!(manifest.log_level(), LogLevel::Info);
        assert_eq!(
            manifest.server_addr(no_env).unwrap().to_string(),
            DEFAULT_ADDR
        );
    }

    #[test]
    fn env_addr_overrides_manifest() {
        let loader = ManifestLoader::load_from_str(SAMPLE).expect("manifest");
        let addr = loader
            .manifest()
            .server_addr(|key| (key == ADDR_VAR).then(|| "127.0.0.1:7000".to_string()))
            .unwrap();
        assert_eq!(addr.port(), 7000);
    }

    #[test]
    fn rejects_short_ttl_and_empty_names() {
        let err = ManifestLoader::load_from_str("[cache]\nttl_secs = 10\n")
            .err()
            .expect("ttl below minimum");
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = ManifestLoader::load_from_str("[gateway]\nname = \"\"\n")
            .err()
            .expect("empty name");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_ttl_beyond_one_year() {
        let err = ManifestLoader::load_from_str("[cache]\nttl_secs = 9223372036854775807\n")
            .err()
            .expect("ttl above maximum");
        assert!(matches!(err, ConfigError::Invalid(_)));

        let loader = ManifestLoader::load_from_str("[cache]\nttl_secs = 31536000\n").unwrap();
        assert_eq!(loader.manifest().cache_ttl(), Duration::from_secs(31_536_000));
    }

    #[test]
    fn origin_must_be_url_unless_blank() {
        let err = ManifestLoader::load_from_str("[backend]\norigin = \"dns manager\"\n")
            .err()
            .expect("non-url origin");
        assert!(matches!(err, ConfigError::Invalid(_)));

        let loader = ManifestLoader::load_from_str("[backend]\norigin = \"  \"\n").unwrap();
        assert!(loader.manifest().gateway_config().backend().is_none());
    }

    #[test]
    fn rejects_unknown_keys_and_levels() {
        assert!(matches!(
            ManifestLoader::load_from_str("[backend]\nurl = \"https://x\"\n"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            ManifestLoader::load_from_str("[logging]\nlevel = \"loud\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn invalid_addr_is_reported() {
        let loader = ManifestLoader::load_from_str("[server]\naddr = \"nowhere\"\n").unwrap();
        assert!(matches!(
            loader.manifest().server_addr(no_env),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn from_path_reads_file_and_reports_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        fs::write(&path, SAMPLE).unwrap();

        let loader = ManifestLoader::from_path(&path).expect("manifest");
        assert_eq!(loader.path(), Some(path.as_path()));
        assert_eq!(loader.manifest().identity().worker, "edge-dns");

        let missing = dir.path().join("absent.toml");
        assert!(matches!(
            ManifestLoader::from_path(&missing),
            Err(ConfigError::Io { .. })
        ));
        let fallback = ManifestLoader::from_path_or_default(&missing).expect("defaults");
        assert!(fallback.path().is_none());
    }
}

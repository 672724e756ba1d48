//! Configuration loading and types.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  Secrets may be left out of the file and supplied
//! through the environment instead (see [`Config::apply_env`]).

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::blob_store::MAX_VALIDITY_HOURS;

/// Environment variable consulted when `storage.azure.connection_string`
/// is empty.
pub const CONNECTION_STRING_ENV: &str = "AZURE_STORAGE_CONNECTION_STRING";

/// Environment variable consulted when `auth.jwt_secret` is empty.
pub const JWT_SECRET_ENV: &str = "IMAGESTORE_JWT_SECRET";

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Bearer token settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Blob storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind host address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and the `/metrics` endpoint.
    #[serde(default = "default_true")]
    pub metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { metrics: true }
    }
}

/// Bearer token settings.
#[derive(Clone, Deserialize)]
pub struct AuthConfig {
    /// HS256 shared secret.
    #[serde(default)]
    pub jwt_secret: String,

    /// Required `iss` claim, if any.
    #[serde(default)]
    pub issuer: Option<String>,

    /// Lifetime of minted tokens in seconds.
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            issuer: None,
            token_ttl_secs: default_token_ttl(),
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("token_ttl_secs", &self.token_ttl_secs)
            .finish()
    }
}

/// Blob storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Backend type: `azure` or `memory`.
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// Container holding the images.
    #[serde(default = "default_container_name")]
    pub container_name: String,

    /// Default validity of generated access URLs, in hours.
    #[serde(default = "default_sas_validity_hours")]
    pub sas_token_validity_hours: u64,

    /// Timeout for backing-store HTTP requests, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Azure Blob Storage settings.
    #[serde(default)]
    pub azure: AzureStorageConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            container_name: default_container_name(),
            sas_token_validity_hours: default_sas_validity_hours(),
            request_timeout_secs: default_request_timeout(),
            azure: AzureStorageConfig::default(),
        }
    }
}

impl StorageConfig {
    /// Default access URL validity as a [`Duration`].
    pub fn sas_validity(&self) -> Duration {
        Duration::from_secs(self.sas_token_validity_hours.saturating_mul(3600))
    }

    /// Backing-store request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Azure Blob Storage configuration.
#[derive(Clone, Deserialize, Default)]
pub struct AzureStorageConfig {
    /// Azure storage connection string.
    #[serde(default)]
    pub connection_string: String,
}

impl std::fmt::Debug for AzureStorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureStorageConfig")
            .field("connection_string", &"<redacted>")
            .finish()
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_token_ttl() -> u64 {
    86_400
}

fn default_storage_backend() -> String {
    "azure".to_string()
}

fn default_container_name() -> String {
    "images".to_string()
}

fn default_sas_validity_hours() -> u64 {
    24
}

fn default_request_timeout() -> u64 {
    30
}

// -- Loader ------------------------------------------------------------------

impl Config {
    /// Fill empty secrets from the environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.storage.azure.connection_string.is_empty() {
            if let Some(value) = lookup(CONNECTION_STRING_ENV) {
                self.storage.azure.connection_string = value;
            }
        }
        if self.auth.jwt_secret.is_empty() {
            if let Some(value) = lookup(JWT_SECRET_ENV) {
                self.auth.jwt_secret = value;
            }
        }
    }

    /// Reject configurations the service cannot start with.
    pub fn validate(&self) -> anyhow::Result<()> {
        match self.storage.backend.as_str() {
            "azure" if self.storage.azure.connection_string.is_empty() => anyhow::bail!(
                "storage.backend is 'azure' but no connection string is configured \
                 (set storage.azure.connection_string or {})",
                CONNECTION_STRING_ENV
            ),
            "azure" | "memory" => {}
            other => anyhow::bail!("Unknown storage.backend '{}'", other),
        }
        if self.storage.container_name.is_empty() {
            anyhow::bail!("storage.container_name must not be empty");
        }
        if !(1..=MAX_VALIDITY_HOURS).contains(&self.storage.sas_token_validity_hours) {
            anyhow::bail!(
                "storage.sas_token_validity_hours must be between 1 and {}",
                MAX_VALIDITY_HOURS
            );
        }
        self.validate_auth()
    }

    /// Reject an `auth` section that cannot sign or verify tokens.
    pub fn validate_auth(&self) -> anyhow::Result<()> {
        if self.auth.jwt_secret.is_empty() {
            anyhow::bail!(
                "auth.jwt_secret is empty (set it in the config file or {})",
                JWT_SECRET_ENV
            );
        }
        Ok(())
    }
}

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", path.display(), e))?;
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(yaml: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_from_empty_file() {
        let file = write_config("{}");
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.backend, "azure");
        assert_eq!(config.storage.container_name, "images");
        assert_eq!(config.storage.sas_token_validity_hours, 24);
        assert_eq!(config.storage.sas_validity(), Duration::from_secs(86_400));
        assert!(config.observability.metrics);
    }

    #[test]
    fn test_full_file() {
        let file = write_config(
            r#"
server:
  host: 127.0.0.1
  port: 9000
auth:
  jwt_secret: s3cret
  issuer: users-service
storage:
  backend: azure
  container_name: reviews
  sas_token_validity_hours: 2
  azure:
    connection_string: "UseDevelopmentStorage=true"
logging:
  format: json
"#,
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.auth.issuer.as_deref(), Some("users-service"));
        assert_eq!(config.storage.container_name, "reviews");
        assert_eq!(config.storage.sas_validity(), Duration::from_secs(7200));
        assert_eq!(config.logging.format, "json");
        config.validate().unwrap();
    }

    #[test]
    fn test_missing_file() {
        assert!(load_config("/nonexistent/imagestore.yaml").is_err());
    }

    #[test]
    fn test_env_fills_empty_secrets_only() {
        let mut config = Config::default();
        config.auth.jwt_secret = "from-file".into();
        config.apply_env_from(|key| match key {
            CONNECTION_STRING_ENV => Some("UseDevelopmentStorage=true".into()),
            JWT_SECRET_ENV => Some("from-env".into()),
            _ => None,
        });
        assert_eq!(
            config.storage.azure.connection_string,
            "UseDevelopmentStorage=true"
        );
        assert_eq!(config.auth.jwt_secret, "from-file");
    }

    #[test]
    fn test_validate_rejects_missing_secrets() {
        let config = Config::default();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains(CONNECTION_STRING_ENV));

        let mut config = Config::default();
        config.storage.backend = "memory".into();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains(JWT_SECRET_ENV));
    }

    #[test]
    fn test_validate_bounds_sas_validity() {
        let mut config = Config::default();
        config.storage.backend = "memory".into();
        config.auth.jwt_secret = "x".into();

        config.storage.sas_token_validity_hours = MAX_VALIDITY_HOURS;
        config.validate().unwrap();

        for hours in [0, MAX_VALIDITY_HOURS + 1, u64::MAX] {
            config.storage.sas_token_validity_hours = hours;
            assert!(config.validate().is_err(), "hours={}", hours);
        }
        // Out-of-range values never overflow.
        assert_eq!(config.storage.sas_validity(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_validate_auth_ignores_storage() {
        let mut config = Config::default();
        assert!(config.validate_auth().is_err());
        config.auth.jwt_secret = "x".into();
        config.validate_auth().unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_backend() {
        let mut config = Config::default();
        config.storage.backend = "gcs".into();
        config.auth.jwt_secret = "x".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = Config::default();
        config.auth.jwt_secret = "topsecret".into();
        config.storage.azure.connection_string = "AccountKey=abc".into();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("topsecret"));
        assert!(!rendered.contains("AccountKey"));
    }
}

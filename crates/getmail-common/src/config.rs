//! Configuration for getmail

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "GETMAIL_CONFIG";

/// Prefix for environment overrides, e.g. `GETMAIL__SMTP__PORT=2525`
const ENV_PREFIX: &str = "GETMAIL";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// SMTP configuration
    #[serde(default)]
    pub smtp: SmtpConfig,

    /// TLS configuration
    pub tls: Option<TlsConfig>,

    /// SPF verification configuration
    #[serde(default)]
    pub spf: SpfConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Hostname announced in the SMTP banner
    #[serde(default = "default_hostname")]
    pub hostname: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
        }
    }
}

fn default_hostname() -> String {
    "localhost".to_string()
}

/// SMTP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// Bind host
    #[serde(default = "default_smtp_host")]
    pub host: String,

    /// SMTP port (inbound)
    #[serde(default = "default_smtp_port")]
    pub port: u16,

    /// Maximum message size in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Maximum recipients per message
    #[serde(default = "default_max_recipients")]
    pub max_recipients: usize,

    /// Worker threads handling connections
    #[serde(default = "default_num_threads")]
    pub num_threads: u32,

    /// Recipient domains accepted by RCPT; empty accepts every domain
    #[serde(default)]
    pub trusted_domains: Vec<String>,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: default_smtp_host(),
            port: default_smtp_port(),
            max_message_size: default_max_message_size(),
            max_recipients: default_max_recipients(),
            num_threads: default_num_threads(),
            trusted_domains: Vec::new(),
        }
    }
}

impl SmtpConfig {
    /// Socket address the listener binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_smtp_host() -> String {
    "0.0.0.0".to_string()
}

fn default_smtp_port() -> u16 {
    25
}

fn default_max_message_size() -> usize {
    1024 * 1024 // 1 MiB
}

fn default_max_recipients() -> usize {
    50
}

fn default_num_threads() -> u32 {
    4
}

/// TLS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Path to certificate file
    pub cert_path: PathBuf,

    /// Path to private key file
    pub key_path: PathBuf,
}

impl TlsConfig {
    /// Check that both files exist
    pub fn is_configured(&self) -> bool {
        self.cert_path.exists() && self.key_path.exists()
    }
}

/// SPF verification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpfConfig {
    /// Verify SPF for received mail
    #[serde(default = "default_spf_enabled")]
    pub enabled: bool,

    /// Upper bound for a whole SPF resolution, in seconds
    #[serde(default = "default_spf_timeout")]
    pub timeout_secs: u64,
}

impl Default for SpfConfig {
    fn default() -> Self {
        Self {
            enabled: default_spf_enabled(),
            timeout_secs: default_spf_timeout(),
        }
    }
}

fn default_spf_enabled() -> bool {
    true
}

fn default_spf_timeout() -> u64 {
    10
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter directive
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
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

fn default_log_level() -> String {
    "info,getmail=debug".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Load configuration from the first file found plus environment overrides
    pub fn load() -> crate::Result<Self> {
        let explicit = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);

        let path = match explicit {
            Some(path) if !path.exists() => {
                return Err(crate::Error::Config(format!(
                    "Config file {} does not exist",
                    path.display()
                )));
            }
            Some(path) => Some(path),
            None => [
                PathBuf::from("./config.toml"),
                PathBuf::from("/etc/getmail/config.toml"),
            ]
            .into_iter()
            .find(|path| path.exists()),
        };

        Self::load_layered(path.as_deref())
    }

    /// Layer an optional file under `GETMAIL__*` environment variables
    pub fn load_layered(path: Option<&Path>) -> crate::Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("smtp.trusted_domains")
                .try_parsing(true),
        );

        builder
            .build()
            .and_then(|settings| settings.try_deserialize::<Config>())
            .map_err(|e| crate::Error::Config(format!("Failed to load config: {}", e)))
    }
}

//! Server configuration
//!
//! Configuration is assembled from three layers, highest priority first:
//! YAML file values, environment variables (including values loaded from a
//! .env file at startup), then built-in defaults.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::core::engine::{CredentialMap, EngineKind};

mod yaml;

pub use yaml::YamlConfig;

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,
    pub tls: Option<TlsConfig>,

    // Authentication
    /// When false the gateway runs open (development mode): every request
    /// gets an admin-equivalent context and no quotas apply.
    pub auth_required: bool,
    /// Plaintext admin secret seeded into the key store at startup
    pub admin_api_key: Option<String>,

    // Engine credentials
    pub elevenlabs_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    /// AWS region for Polly (e.g. "us-east-1")
    pub aws_region: Option<String>,
    pub piper_binary_path: Option<String>,
    pub piper_model_dir: Option<String>,

    // Security
    /// CORS allowed origins (comma-separated list or "*" for all).
    /// Default: None (CORS disabled, same-origin only)
    pub cors_allowed_origins: Option<String>,
    /// Maximum requests per second per IP address
    pub rate_limit_requests_per_second: u32,
    /// Maximum burst size for IP rate limiting
    pub rate_limit_burst_size: u32,
}

/// Zeroize all secret fields when the config is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.admin_api_key {
            key.zeroize();
        }
        if let Some(ref mut key) = self.elevenlabs_api_key {
            key.zeroize();
        }
        if let Some(ref mut key) = self.openai_api_key {
            key.zeroize();
        }
        if let Some(ref mut key) = self.aws_access_key_id {
            key.zeroize();
        }
        if let Some(ref mut key) = self.aws_secret_access_key {
            key.zeroize();
        }
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            tls: None,
            auth_required: true,
            admin_api_key: None,
            elevenlabs_api_key: None,
            openai_api_key: None,
            aws_access_key_id: None,
            aws_secret_access_key: None,
            aws_region: None,
            piper_binary_path: None,
            piper_model_dir: None,
            cors_allowed_origins: None,
            rate_limit_requests_per_second: 60,
            rate_limit_burst_size: 10,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables over defaults.
    /// The .env file, if any, is loaded into the environment in main.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let defaults = Self::default();

        let tls = match (env_string("VOXGATE_TLS_CERT"), env_string("VOXGATE_TLS_KEY")) {
            (Some(cert), Some(key)) => Some(TlsConfig {
                cert_path: PathBuf::from(cert),
                key_path: PathBuf::from(key),
            }),
            (None, None) => None,
            _ => {
                return Err(
                    "VOXGATE_TLS_CERT and VOXGATE_TLS_KEY must both be set to enable TLS".into(),
                );
            }
        };

        let config = Self {
            host: env_string("VOXGATE_HOST").unwrap_or(defaults.host.clone()),
            port: env_parse("VOXGATE_PORT", defaults.port),
            tls,
            auth_required: env_bool("VOXGATE_AUTH_REQUIRED", defaults.auth_required),
            admin_api_key: env_string("VOXGATE_ADMIN_KEY"),
            elevenlabs_api_key: env_string("ELEVENLABS_API_KEY"),
            openai_api_key: env_string("OPENAI_API_KEY"),
            aws_access_key_id: env_string("AWS_ACCESS_KEY_ID"),
            aws_secret_access_key: env_string("AWS_SECRET_ACCESS_KEY"),
            aws_region: env_string("AWS_REGION"),
            piper_binary_path: env_string("PIPER_BINARY_PATH"),
            piper_model_dir: env_string("PIPER_MODEL_DIR"),
            cors_allowed_origins: env_string("VOXGATE_CORS_ORIGINS"),
            rate_limit_requests_per_second: env_parse(
                "VOXGATE_RATE_LIMIT_RPS",
                defaults.rate_limit_requests_per_second,
            ),
            rate_limit_burst_size: env_parse(
                "VOXGATE_RATE_LIMIT_BURST",
                defaults.rate_limit_burst_size,
            ),
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base.
    ///
    /// Priority order (highest to lowest): YAML values, environment
    /// variables, defaults.
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let mut config = Self::from_env()?;
        let yaml = YamlConfig::from_file(path)?;

        if let Some(server) = yaml.server {
            if let Some(host) = server.host {
                config.host = host;
            }
            if let Some(port) = server.port {
                config.port = port;
            }
            if let Some(tls) = server.tls {
                if tls.enabled.unwrap_or(true) {
                    match (tls.cert_path, tls.key_path) {
                        (Some(cert), Some(key)) => {
                            config.tls = Some(TlsConfig {
                                cert_path: PathBuf::from(cert),
                                key_path: PathBuf::from(key),
                            });
                        }
                        _ => return Err("tls requires both cert_path and key_path".into()),
                    }
                } else {
                    config.tls = None;
                }
            }
        }

        if let Some(auth) = yaml.auth {
            if let Some(required) = auth.required {
                config.auth_required = required;
            }
            if let Some(key) = auth.admin_api_key {
                config.admin_api_key = Some(key);
            }
        }

        if let Some(engines) = yaml.engines {
            macro_rules! take {
                ($field:ident) => {
                    if let Some(value) = engines.$field {
                        config.$field = Some(value);
                    }
                };
            }
            take!(elevenlabs_api_key);
            take!(openai_api_key);
            take!(aws_access_key_id);
            take!(aws_secret_access_key);
            take!(aws_region);
            take!(piper_binary_path);
            take!(piper_model_dir);
        }

        if let Some(security) = yaml.security {
            if let Some(origins) = security.cors_allowed_origins {
                config.cors_allowed_origins = Some(origins);
            }
            if let Some(rps) = security.rate_limit_requests_per_second {
                config.rate_limit_requests_per_second = rps;
            }
            if let Some(burst) = security.rate_limit_burst_size {
                config.rate_limit_burst_size = burst;
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.port == 0 {
            return Err("port must be non-zero".into());
        }
        if self.auth_required && self.admin_api_key.is_none() {
            tracing::warn!(
                "auth is required but VOXGATE_ADMIN_KEY is not set; \
                 keys can only be created if one already exists in the store"
            );
        }
        if let Some(ref tls) = self.tls {
            if !tls.cert_path.exists() {
                return Err(
                    format!("TLS cert not found: {}", tls.cert_path.display()).into(),
                );
            }
            if !tls.key_path.exists() {
                return Err(format!("TLS key not found: {}", tls.key_path.display()).into());
            }
        }
        Ok(())
    }

    /// The server address as "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// System credential maps for every engine, keyed by engine. Engines with
    /// no configured fields get an empty map (the free local engines need
    /// none).
    pub fn engine_credentials(&self) -> HashMap<EngineKind, CredentialMap> {
        let mut all = HashMap::new();

        let mut elevenlabs = CredentialMap::new();
        if let Some(ref key) = self.elevenlabs_api_key {
            elevenlabs.insert("api_key".to_string(), key.clone());
        }
        all.insert(EngineKind::Elevenlabs, elevenlabs);

        let mut openai = CredentialMap::new();
        if let Some(ref key) = self.openai_api_key {
            openai.insert("api_key".to_string(), key.clone());
        }
        all.insert(EngineKind::OpenAi, openai);

        let mut polly = CredentialMap::new();
        if let Some(ref id) = self.aws_access_key_id {
            polly.insert("aws_access_key_id".to_string(), id.clone());
        }
        if let Some(ref secret) = self.aws_secret_access_key {
            polly.insert("aws_secret_access_key".to_string(), secret.clone());
        }
        if let Some(ref region) = self.aws_region {
            polly.insert("aws_region".to_string(), region.clone());
        }
        all.insert(EngineKind::Polly, polly);

        all.insert(EngineKind::Espeak, CredentialMap::new());

        let mut piper = CredentialMap::new();
        if let Some(ref path) = self.piper_binary_path {
            piper.insert("binary_path".to_string(), path.clone());
        }
        if let Some(ref dir) = self.piper_model_dir {
            piper.insert("model_dir".to_string(), dir.clone());
        }
        all.insert(EngineKind::Piper, piper);

        all
    }
}

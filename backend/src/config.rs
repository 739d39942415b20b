use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;
const DEFAULT_CLASSIFIER_CONFIG: &str = "config/classifier.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
    #[error("Invalid telemetry endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
    #[error("Failed to read classifier config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse classifier config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone)]
pub struct TelemetrySettings {
    pub endpoint: Url,
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub temp_dir: PathBuf,
    pub max_upload_bytes: u64,
    pub classifier_config: PathBuf,
    /// `None` when either the endpoint or the token is missing.
    pub telemetry: Option<TelemetrySettings>,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = match lookup("PORT") {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue { key: "PORT", value })?,
            None => DEFAULT_PORT,
        };

        let max_upload_bytes = match lookup("SKIN_MAX_UPLOAD_BYTES") {
            Some(value) => match value.trim().parse::<u64>() {
                Ok(limit) if limit > 0 => limit,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "SKIN_MAX_UPLOAD_BYTES",
                        value,
                    });
                }
            },
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let temp_dir = lookup("SKIN_TEMP_DIR")
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join("skin-uploads"));

        let classifier_config = lookup("CLASSIFIER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(default_classifier_config);

        let endpoint = lookup("TELEMETRY_ENDPOINT").filter(|v| !v.trim().is_empty());
        let token = lookup("TELEMETRY_TOKEN").filter(|v| !v.trim().is_empty());
        let telemetry = match (endpoint, token) {
            (Some(endpoint), Some(token)) => Some(TelemetrySettings {
                endpoint: Url::parse(endpoint.trim())?,
                token,
            }),
            _ => None,
        };

        Ok(Self {
            port,
            temp_dir,
            max_upload_bytes,
            classifier_config,
            telemetry,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

fn default_classifier_config() -> PathBuf {
    match std::env::var("CARGO_MANIFEST_DIR") {
        Ok(manifest_dir) => Path::new(&manifest_dir)
            .join("..")
            .join(DEFAULT_CLASSIFIER_CONFIG),
        Err(_) => PathBuf::from(DEFAULT_CLASSIFIER_CONFIG),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassifierConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl ClassifierConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&config_str)
    }

    pub fn from_yaml(config_str: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(config_str)?)
    }
}

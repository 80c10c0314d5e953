//! Runtime configuration.
//!
//! Values come from an optional YAML file (`FACTEUR_CONFIG_PATH`) with
//! `FACTEUR_`-prefixed environment variables overriding individual keys.
//! Normalisation fills defaults, then validation reports every missing
//! required key at once.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bus::{BusConfig, SaslOptions, TlsOptions};

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("failed to read configuration file: {0}")]
    FileRead(std::io::Error),

    #[error("failed to parse configuration: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("invalid configuration value for {0}")]
    InvalidValue(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub argo: ArgoConfig,
    pub consumer: ConsumerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_address: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Path of the embedded session database.
    pub path: String,
    /// Key prefix for persisted entries.
    pub prefix: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ArgoConfig {
    pub namespace: String,
    pub workflow_template: String,
    pub service_account: String,
    pub parameters: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ConsumerConfig {
    pub enabled: bool,
    pub brokers: Vec<String>,
    pub topic: String,
    pub group_id: String,
    pub min_bytes: usize,
    pub max_bytes: usize,
    /// Longest fetch block, in seconds.
    pub max_wait: u64,
    pub dlq: DlqConfig,
    pub tls: TlsConfig,
    pub sasl: SaslConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DlqConfig {
    pub enabled: bool,
    pub topic: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TlsConfig {
    pub enabled: bool,
    pub insecure_skip_verify: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SaslConfig {
    pub enabled: bool,
    pub mechanism: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl AppConfig {
    /// Load configuration: YAML file when `FACTEUR_CONFIG_PATH` is set,
    /// environment overrides on top, then defaults and validation.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var("FACTEUR_CONFIG_PATH").ok() {
            Some(path) => {
                let path = PathBuf::from(path);
                if !path.exists() {
                    return Err(ConfigError::FileNotFound(path));
                }
                let content = std::fs::read_to_string(&path).map_err(ConfigError::FileRead)?;
                serde_yaml::from_str(&content)?
            }
            None => AppConfig::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.normalise();
        config.validate()?;
        Ok(config)
    }

    /// Apply `FACTEUR_`-prefixed overrides through the supplied lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("FACTEUR_SERVER_LISTEN_ADDRESS") {
            self.server.listen_address = value;
        }
        if let Some(value) = lookup("FACTEUR_SESSION_PATH") {
            self.session.path = value;
        }
        if let Some(value) = lookup("FACTEUR_SESSION_PREFIX") {
            self.session.prefix = value;
        }
        if let Some(value) = lookup("FACTEUR_ARGO_NAMESPACE") {
            self.argo.namespace = value;
        }
        if let Some(value) = lookup("FACTEUR_ARGO_WORKFLOW_TEMPLATE") {
            self.argo.workflow_template = value;
        }
        if let Some(value) = lookup("FACTEUR_ARGO_SERVICE_ACCOUNT") {
            self.argo.service_account = value;
        }
        if let Some(value) = lookup("FACTEUR_ARGO_PARAMETERS") {
            self.argo.parameters = parse_pairs(&value, "FACTEUR_ARGO_PARAMETERS")?;
        }
        if let Some(value) = lookup("FACTEUR_CONSUMER_ENABLED") {
            self.consumer.enabled = parse_bool(&value, "FACTEUR_CONSUMER_ENABLED")?;
        }
        if let Some(value) = lookup("FACTEUR_CONSUMER_BROKERS") {
            self.consumer.brokers = value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(value) = lookup("FACTEUR_CONSUMER_TOPIC") {
            self.consumer.topic = value;
        }
        if let Some(value) = lookup("FACTEUR_CONSUMER_GROUP_ID") {
            self.consumer.group_id = value;
        }
        if let Some(value) = lookup("FACTEUR_CONSUMER_MIN_BYTES") {
            self.consumer.min_bytes = parse_number(&value, "FACTEUR_CONSUMER_MIN_BYTES")?;
        }
        if let Some(value) = lookup("FACTEUR_CONSUMER_MAX_BYTES") {
            self.consumer.max_bytes = parse_number(&value, "FACTEUR_CONSUMER_MAX_BYTES")?;
        }
        if let Some(value) = lookup("FACTEUR_CONSUMER_MAX_WAIT") {
            self.consumer.max_wait = parse_number(&value, "FACTEUR_CONSUMER_MAX_WAIT")?;
        }
        if let Some(value) = lookup("FACTEUR_CONSUMER_DLQ_ENABLED") {
            self.consumer.dlq.enabled = parse_bool(&value, "FACTEUR_CONSUMER_DLQ_ENABLED")?;
        }
        if let Some(value) = lookup("FACTEUR_CONSUMER_DLQ_TOPIC") {
            self.consumer.dlq.topic = value;
        }
        if let Some(value) = lookup("FACTEUR_CONSUMER_TLS_ENABLED") {
            self.consumer.tls.enabled = parse_bool(&value, "FACTEUR_CONSUMER_TLS_ENABLED")?;
        }
        if let Some(value) = lookup("FACTEUR_CONSUMER_TLS_INSECURE_SKIP_VERIFY") {
            self.consumer.tls.insecure_skip_verify =
                parse_bool(&value, "FACTEUR_CONSUMER_TLS_INSECURE_SKIP_VERIFY")?;
        }
        if let Some(value) = lookup("FACTEUR_CONSUMER_SASL_ENABLED") {
            self.consumer.sasl.enabled = parse_bool(&value, "FACTEUR_CONSUMER_SASL_ENABLED")?;
        }
        if let Some(value) = lookup("FACTEUR_CONSUMER_SASL_MECHANISM") {
            self.consumer.sasl.mechanism = value;
        }
        if let Some(value) = lookup("FACTEUR_CONSUMER_SASL_USERNAME") {
            self.consumer.sasl.username = value;
        }
        if let Some(value) = lookup("FACTEUR_CONSUMER_SASL_PASSWORD") {
            self.consumer.sasl.password = value;
        }
        if let Some(value) = lookup("FACTEUR_LOGGING_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = lookup("FACTEUR_LOGGING_FORMAT") {
            self.logging.format = value;
        }
        Ok(())
    }

    /// Fill unset fields with defaults.
    pub fn normalise(&mut self) {
        if self.server.listen_address.is_empty() {
            self.server.listen_address = ":8080".to_string();
        }
        if self.session.prefix.is_empty() {
            self.session.prefix = "facteur".to_string();
        }
        if self.consumer.brokers.is_empty() {
            self.consumer.brokers = vec!["nats://localhost:4222".to_string()];
        }
        if self.consumer.topic.is_empty() {
            self.consumer.topic = "discord.commands.incoming".to_string();
        }
        if self.consumer.group_id.is_empty() {
            self.consumer.group_id = "facteur".to_string();
        }
        if self.consumer.min_bytes == 0 {
            self.consumer.min_bytes = 1;
        }
        if self.consumer.max_bytes == 0 {
            self.consumer.max_bytes = 10 << 20;
        }
        if self.consumer.max_wait == 0 {
            self.consumer.max_wait = 1;
        }
        if self.consumer.dlq.enabled && self.consumer.dlq.topic.is_empty() {
            self.consumer.dlq.topic = format!("{}.dlq", self.consumer.topic);
        }
        if self.consumer.sasl.mechanism.is_empty() {
            self.consumer.sasl.mechanism = "plain".to_string();
        }
        if self.logging.level.is_empty() {
            self.logging.level = "info".to_string();
        }
        if self.logging.format.is_empty() {
            self.logging.format = "json".to_string();
        }
    }

    /// Report every violated constraint at once.
    pub fn validate(&self) -> Result<()> {
        let mut errs = Vec::new();

        if self.argo.namespace.is_empty() {
            errs.push("argo.namespace is required");
        }
        if self.argo.workflow_template.is_empty() {
            errs.push("argo.workflow_template is required");
        }
        if self.consumer.enabled {
            if self.consumer.brokers.is_empty() {
                errs.push("consumer.brokers is required when consumer.enabled is true");
            }
            if self.consumer.dlq.enabled && self.consumer.dlq.topic.is_empty() {
                errs.push("consumer.dlq.topic is required when consumer.dlq.enabled is true");
            }
            if self.consumer.sasl.enabled {
                if self.consumer.sasl.username.is_empty() {
                    errs.push("consumer.sasl.username is required when consumer.sasl.enabled is true");
                }
                if self.consumer.sasl.password.is_empty() {
                    errs.push("consumer.sasl.password is required when consumer.sasl.enabled is true");
                }
            }
            if self.session.path.is_empty() {
                errs.push("session.path is required when consumer.enabled is true");
            }
        }

        if errs.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errs.join("; ")))
        }
    }

    /// Log transport configuration derived from the consumer block.
    pub fn bus_config(&self) -> BusConfig {
        BusConfig {
            brokers: self.consumer.brokers.clone(),
            topic: self.consumer.topic.clone(),
            group_id: self.consumer.group_id.clone(),
            min_bytes: self.consumer.min_bytes,
            max_bytes: self.consumer.max_bytes,
            max_wait: Duration::from_secs(self.consumer.max_wait),
            tls: TlsOptions {
                enabled: self.consumer.tls.enabled,
                insecure_skip_verify: self.consumer.tls.insecure_skip_verify,
            },
            sasl: SaslOptions {
                enabled: self.consumer.sasl.enabled,
                mechanism: self.consumer.sasl.mechanism.clone(),
                username: self.consumer.sasl.username.clone(),
                password: self.consumer.sasl.password.clone(),
            },
        }
    }
}

fn parse_bool(value: &str, key: &str) -> Result<bool> {
    value
        .parse::<bool>()
        .map_err(|_| ConfigError::InvalidValue(key.to_string()))
}

fn parse_number<T: std::str::FromStr>(value: &str, key: &str) -> Result<T> {
    value
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidValue(key.to_string()))
}

/// Parse `key=value,key=value` pairs.
fn parse_pairs(value: &str, key: &str) -> Result<BTreeMap<String, String>> {
    let mut pairs = BTreeMap::new();
    for entry in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (name, val) = entry
            .split_once('=')
            .ok_or_else(|| ConfigError::InvalidValue(key.to_string()))?;
        pairs.insert(name.trim().to_string(), val.trim().to_string());
    }
    Ok(pairs)
}

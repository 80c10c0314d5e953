//! Connection knobs for the log transport.

use std::time::Duration;

pub const DEFAULT_MIN_BYTES: usize = 1;
pub const DEFAULT_MAX_BYTES: usize = 10 << 20;
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(1);

/// Configuration for a consumer-group log connection.
#[derive(Debug, Clone)]
pub struct BusConfig {
    pub brokers: Vec<String>,
    pub topic: String,
    pub group_id: String,
    pub min_bytes: usize,
    pub max_bytes: usize,
    pub max_wait: Duration,
    pub tls: TlsOptions,
    pub sasl: SaslOptions,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["nats://localhost:4222".to_string()],
            topic: "discord.commands.incoming".to_string(),
            group_id: "facteur".to_string(),
            min_bytes: DEFAULT_MIN_BYTES,
            max_bytes: DEFAULT_MAX_BYTES,
            max_wait: DEFAULT_MAX_WAIT,
            tls: TlsOptions::default(),
            sasl: SaslOptions::default(),
        }
    }
}

impl BusConfig {
    /// Clamp zeroed knobs back to their defaults.
    pub fn normalised(mut self) -> Self {
        if self.min_bytes == 0 {
            self.min_bytes = DEFAULT_MIN_BYTES;
        }
        if self.max_bytes == 0 {
            self.max_bytes = DEFAULT_MAX_BYTES;
        }
        if self.max_wait.is_zero() {
            self.max_wait = DEFAULT_MAX_WAIT;
        }
        self
    }

    /// Stream name derived from the topic (stream names may not contain
    /// dots).
    pub fn stream_name(&self) -> String {
        self.topic.replace('.', "_").to_ascii_uppercase()
    }
}

/// TLS options for the broker connection.
#[derive(Debug, Clone, Default)]
pub struct TlsOptions {
    pub enabled: bool,
    pub insecure_skip_verify: bool,
}

/// Credential options for the broker connection.
#[derive(Debug, Clone)]
pub struct SaslOptions {
    pub enabled: bool,
    pub mechanism: String,
    pub username: String,
    pub password: String,
}

impl Default for SaslOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            mechanism: "plain".to_string(),
            username: String::new(),
            password: String::new(),
        }
    }
}

//! Log transport over NATS JetStream.

pub mod config;
pub mod nats;

pub use config::{BusConfig, SaslOptions, TlsOptions};
pub use nats::{JetStreamReader, JetStreamWriter, LogBus};

//! Infrastructure adapters for the facteur command bridge.
//!
//! Implementations of the port traits: a NATS JetStream log transport, a
//! redb-backed session store and a Kubernetes-backed Argo workflow client,
//! plus configuration loading for all of it.

pub mod argo;
pub mod bus;
pub mod config;
pub mod session;

pub use argo::ArgoWorkflowApi;
pub use bus::{BusConfig, LogBus};
pub use config::{AppConfig, ConfigError};
pub use session::RedbSessionStore;

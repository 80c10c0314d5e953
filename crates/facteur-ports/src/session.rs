//! Session store port.

use std::time::Duration;

use async_trait::async_trait;

/// Session store errors.
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("session: not found")]
    NotFound,

    #[error("session: {0}")]
    Backend(String),
}

/// Persists ephemeral dispatch metadata keyed by user.
///
/// Implementations must be safe for concurrent callers; many consumers may
/// share one store client.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Write a value with the supplied TTL, overwriting any prior value.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), SessionError>;

    /// Read a value, returning `SessionError::NotFound` when absent or
    /// expired.
    async fn get(&self, key: &str) -> Result<Vec<u8>, SessionError>;

    /// Remove a value; missing keys are treated as success.
    async fn delete(&self, key: &str) -> Result<(), SessionError>;
}

/// Key under which the latest dispatch result for a user is stored.
pub fn dispatch_key(user_id: &str) -> String {
    format!("dispatch:{user_id}")
}

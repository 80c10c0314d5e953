//! Failure taxonomy for the command bridge.
//!
//! Two axes classify failures: terminal-per-message versus loop-fatal.
//! `BridgeError` covers the former (decode, validation, submit,
//! persistence, template-status) and is what the consumer quarantines or
//! leaves uncommitted; `ConsumerError` covers the latter and aborts the
//! loop.

/// Result alias for per-message bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Terminal per-message errors. None of these are retried against the same
/// offset inside the loop; the commit discipline decides what happens next.
#[derive(thiserror::Error, Debug)]
pub enum BridgeError {
    #[error("decode event: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("{0}")]
    Validation(String),

    #[error("persist dispatch result: {0}")]
    Persistence(String),

    #[error("submit workflow: {0}")]
    Submit(String),

    #[error("template status: {0}")]
    TemplateStatus(String),
}

impl BridgeError {
    /// Stable kind label used in logs and metric attributes.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::Decode(_) => "decode",
            BridgeError::Validation(_) => "validation",
            BridgeError::Persistence(_) => "persistence",
            BridgeError::Submit(_) => "submit",
            BridgeError::TemplateStatus(_) => "template-status",
        }
    }
}

/// Loop-fatal consumer errors. A commit failure means the offset state is
/// unknown; the process exits and the container restart recovers.
#[derive(thiserror::Error, Debug)]
pub enum ConsumerError {
    #[error("consumer: fetch message: {0}")]
    Fetch(String),

    #[error("consumer: commit message: {0}")]
    Commit(String),

    #[error("consumer: commit after dlq: {0}")]
    CommitAfterQuarantine(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(
            BridgeError::Validation("missing command field".into()).kind(),
            "validation"
        );
        assert_eq!(BridgeError::Submit("boom".into()).kind(), "submit");
        assert_eq!(
            BridgeError::Persistence("store down".into()).kind(),
            "persistence"
        );
    }

    #[test]
    fn messages_carry_context() {
        let err = ConsumerError::CommitAfterQuarantine("ack timeout".into());
        assert!(err.to_string().contains("commit after dlq"));

        let err = BridgeError::Submit("server unavailable".into());
        assert_eq!(err.to_string(), "submit workflow: server unavailable");
    }
}

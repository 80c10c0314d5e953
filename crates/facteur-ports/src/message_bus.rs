//! Partitioned-log port.
//!
//! The reader surface mirrors a consumer-group log client: fetch one message,
//! process it, then commit the offset. Commit is the only durability
//! primitive; a message that is never committed is redelivered by the group.

use async_trait::async_trait;

/// A message header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub key: String,
    pub value: Vec<u8>,
}

/// A single message fetched from (or published to) the log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub partition: i32,
    pub offset: u64,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub headers: Vec<Header>,
}

impl Message {
    /// Copy of this message with one extra header appended.
    pub fn with_header(&self, key: &str, value: &[u8]) -> Message {
        let mut copy = self.clone();
        copy.headers.push(Header {
            key: key.to_string(),
            value: value.to_vec(),
        });
        copy
    }
}

/// Log transport errors, including the clean-exit sentinels.
#[derive(thiserror::Error, Debug)]
pub enum BusError {
    /// The surrounding context was cancelled; the loop exits cleanly.
    #[error("context cancelled")]
    Cancelled,

    /// The log has no further messages and never will (test readers).
    #[error("end of stream")]
    EndOfStream,

    #[error("transport error: {0}")]
    Transport(String),
}

impl BusError {
    /// True for the sentinels that terminate the consumer loop cleanly.
    pub fn is_clean_shutdown(&self) -> bool {
        matches!(self, BusError::Cancelled | BusError::EndOfStream)
    }
}

/// Consumer-group log reader. One reader is owned by exactly one consumer.
#[async_trait]
pub trait MessageReader: Send + Sync {
    /// Block until a message is available, the context is cancelled or the
    /// stream ends.
    async fn fetch(&mut self) -> Result<Message, BusError>;

    /// Durably mark the message's offset as processed for the group.
    async fn commit(&mut self, message: &Message) -> Result<(), BusError>;

    /// Release the underlying transport.
    async fn close(&mut self) -> Result<(), BusError>;
}

/// Log publisher, used for dead-letter quarantine.
#[async_trait]
pub trait MessageWriter: Send + Sync {
    async fn write(&self, message: Message) -> Result<(), BusError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_header_preserves_payload_and_appends() {
        let message = Message {
            topic: "commands".into(),
            partition: 2,
            offset: 41,
            key: b"key-1".to_vec(),
            value: b"{}".to_vec(),
            headers: vec![Header {
                key: "traceparent".into(),
                value: b"00-aa-bb-01".to_vec(),
            }],
        };

        let quarantined = message.with_header("facteur-error", b"decode event");

        assert_eq!(quarantined.key, message.key);
        assert_eq!(quarantined.value, message.value);
        assert_eq!(quarantined.headers.len(), 2);
        assert_eq!(quarantined.headers[1].key, "facteur-error");
        // the original is untouched
        assert_eq!(message.headers.len(), 1);
    }

    #[test]
    fn shutdown_sentinels() {
        assert!(BusError::Cancelled.is_clean_shutdown());
        assert!(BusError::EndOfStream.is_clean_shutdown());
        assert!(!BusError::Transport("broker away".into()).is_clean_shutdown());
    }
}

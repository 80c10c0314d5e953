//! Fetch-dispatch-commit consumer loop.
//!
//! Commit discipline is the at-least-once primitive: an offset is committed
//! only after a successful dispatch (and session write) or a successful
//! dead-letter publish. Without a dead-letter writer a failed message is
//! left uncommitted and the consumer group redelivers it. No in-process
//! retry is layered around dispatch.

use std::sync::Arc;
use std::time::{Duration, Instant};

use facteur_core::dispatch::{DispatchRequest, DispatchResult};
use facteur_core::error::{BridgeError, ConsumerError};
use facteur_core::event::CommandEvent;
use facteur_ports::dispatcher::Dispatcher;
use facteur_ports::message_bus::{Message, MessageReader, MessageWriter};
use facteur_ports::session::{dispatch_key, SessionStore};

use crate::metrics::ConsumerMetrics;

/// Default expiry for persisted dispatch sessions.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(15 * 60);

/// Header carrying the terminal error message on dead-letter messages.
pub const ERROR_HEADER: &str = "facteur-error";

/// Bridges command events from the log to the dispatcher.
///
/// The consumer exclusively owns its reader; parallelism comes from running
/// more consumers in the group, not from fanning out within one.
pub struct CommandConsumer {
    reader: Box<dyn MessageReader>,
    dispatcher: Arc<dyn Dispatcher>,
    store: Option<Arc<dyn SessionStore>>,
    dlq: Option<Arc<dyn MessageWriter>>,
    session_ttl: Duration,
    metrics: Option<ConsumerMetrics>,
}

impl CommandConsumer {
    pub fn new(reader: Box<dyn MessageReader>, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            reader,
            dispatcher,
            store: None,
            dlq: None,
            session_ttl: DEFAULT_SESSION_TTL,
            metrics: None,
        }
    }

    /// Configure session persistence.
    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Attach a dead-letter publisher. Its presence switches the failure
    /// policy from "leave uncommitted" to "quarantine and commit".
    pub fn with_dlq(mut self, writer: Arc<dyn MessageWriter>) -> Self {
        self.dlq = Some(writer);
        self
    }

    /// Override the TTL for persisted session data; zero is ignored.
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        if !ttl.is_zero() {
            self.session_ttl = ttl;
        }
        self
    }

    pub fn with_metrics(mut self, metrics: ConsumerMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run the consumer loop until the reader reports cancellation or an
    /// unrecoverable error occurs. The reader is closed on every exit path.
    pub async fn run(&mut self) -> Result<(), ConsumerError> {
        let outcome = self.run_loop().await;

        if let Err(err) = self.reader.close().await {
            tracing::warn!(error = %err, "closing log reader failed");
        }

        outcome
    }

    async fn run_loop(&mut self) -> Result<(), ConsumerError> {
        loop {
            let message = match self.reader.fetch().await {
                Ok(message) => message,
                Err(err) if err.is_clean_shutdown() => return Ok(()),
                Err(err) => return Err(ConsumerError::Fetch(err.to_string())),
            };

            let started = Instant::now();
            // Decode up front so failures can still be attributed to a
            // command in logs and metrics.
            let (command, outcome) = match CommandEvent::decode(&message.value) {
                Ok(event) => {
                    let command = event.command.clone();
                    (command, self.handle_event(&event, &message).await)
                }
                Err(err) => (String::new(), Err(err)),
            };

            match outcome {
                Ok(_) => {
                    self.reader
                        .commit(&message)
                        .await
                        .map_err(|err| ConsumerError::Commit(err.to_string()))?;
                    if let Some(metrics) = &self.metrics {
                        metrics.record_processed(&command, started.elapsed());
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        topic = %message.topic,
                        partition = message.partition,
                        offset = message.offset,
                        kind = err.kind(),
                        error = %err,
                        "command consumer failure",
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.record_failed(&command);
                    }

                    let Some(dlq) = &self.dlq else {
                        // Without a DLQ the offset intentionally stays
                        // uncommitted so the consumer group redelivers.
                        continue;
                    };

                    let quarantined =
                        message.with_header(ERROR_HEADER, err.to_string().as_bytes());
                    if let Err(dlq_err) = dlq.write(quarantined).await {
                        tracing::warn!(error = %dlq_err, "dead-letter publish failed");
                        // Uncommitted: the message is retried on the next fetch.
                        continue;
                    }

                    self.reader
                        .commit(&message)
                        .await
                        .map_err(|err| ConsumerError::CommitAfterQuarantine(err.to_string()))?;
                    if let Some(metrics) = &self.metrics {
                        metrics.record_quarantined(&command);
                    }
                }
            }
        }
    }

    async fn handle_event(
        &self,
        event: &CommandEvent,
        message: &Message,
    ) -> Result<DispatchResult, BridgeError> {
        let result = process_event(
            event,
            self.dispatcher.as_ref(),
            self.store.as_deref(),
            self.session_ttl,
        )
        .await?;

        let correlation = if result.correlation_id.is_empty() {
            "(none)"
        } else {
            result.correlation_id.as_str()
        };
        tracing::info!(
            command = %event.command,
            user = %event.user_id,
            workflow = %result.workflow_name,
            namespace = %result.namespace,
            correlation = correlation,
            trace = %event.trace_id,
            partition = message.partition,
            offset = message.offset,
            "command consumer success",
        );

        Ok(result)
    }
}

/// Dispatch a command event and persist session metadata when a store is
/// configured. A store failure fails the message.
pub async fn process_event(
    event: &CommandEvent,
    dispatcher: &dyn Dispatcher,
    store: Option<&dyn SessionStore>,
    ttl: Duration,
) -> Result<DispatchResult, BridgeError> {
    event.validate()?;

    let mut result = dispatcher
        .dispatch(DispatchRequest {
            command: event.command.clone(),
            user_id: event.user_id.clone(),
            options: event.options.clone(),
            correlation_id: event.correlation_id.clone(),
            trace_id: event.trace_id.clone(),
        })
        .await?;

    if !event.correlation_id.is_empty() && result.correlation_id.is_empty() {
        result.correlation_id = event.correlation_id.clone();
    }

    if let Some(store) = store {
        if !event.user_id.is_empty() {
            let payload = serde_json::to_vec(&result)
                .map_err(|err| BridgeError::Persistence(err.to_string()))?;
            let ttl = if ttl.is_zero() { DEFAULT_SESSION_TTL } else { ttl };
            store
                .set(&dispatch_key(&event.user_id), &payload, ttl)
                .await
                .map_err(|err| BridgeError::Persistence(err.to_string()))?;
        }
    }

    Ok(result)
}

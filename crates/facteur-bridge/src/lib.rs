//! Application services for the facteur command bridge.
//!
//! Three services live here: the deterministic [`runner::WorkflowRunner`],
//! the [`dispatcher::WorkflowDispatcher`] that merges parameters and traces
//! each submission, and the [`consumer::CommandConsumer`] fetch-dispatch-
//! commit loop with dead-letter quarantine.

pub mod consumer;
pub mod dispatcher;
pub mod metrics;
pub mod runner;

pub use consumer::{process_event, CommandConsumer, DEFAULT_SESSION_TTL};
pub use dispatcher::WorkflowDispatcher;
pub use metrics::ConsumerMetrics;
pub use runner::WorkflowRunner;

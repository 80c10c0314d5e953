//! Prometheus metrics for the command consumer.

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

const COMMAND_LABEL: &[&str] = &["command"];

/// Consumer throughput and quarantine metrics, labelled per command.
///
/// Quarantined messages get their own counter, separate from general
/// failures: a rising `dlq_total` with a flat `failed_total` delta reads as
/// poison input, the inverse as an infrastructure problem.
#[derive(Debug, Clone)]
pub struct ConsumerMetrics {
    pub processed_total: IntCounterVec,
    pub failed_total: IntCounterVec,
    pub dlq_total: IntCounterVec,
    pub duration_seconds: HistogramVec,
}

impl ConsumerMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let processed_total = IntCounterVec::new(
            Opts::new(
                "facteur_command_events_processed_total",
                "Number of command events processed successfully.",
            ),
            COMMAND_LABEL,
        )?;

        let failed_total = IntCounterVec::new(
            Opts::new(
                "facteur_command_events_failed_total",
                "Number of command events that failed.",
            ),
            COMMAND_LABEL,
        )?;

        let dlq_total = IntCounterVec::new(
            Opts::new(
                "facteur_command_events_dlq_total",
                "Number of command events routed to the dead-letter topic.",
            ),
            COMMAND_LABEL,
        )?;

        let duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "facteur_command_events_duration_seconds",
                "Processing latency for command events in seconds.",
            )
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0]),
            COMMAND_LABEL,
        )?;

        Ok(Self {
            processed_total,
            failed_total,
            dlq_total,
            duration_seconds,
        })
    }

    /// Register all collectors with a registry.
    pub fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.processed_total.clone()))?;
        registry.register(Box::new(self.failed_total.clone()))?;
        registry.register(Box::new(self.dlq_total.clone()))?;
        registry.register(Box::new(self.duration_seconds.clone()))?;
        Ok(())
    }

    pub fn record_processed(&self, command: &str, duration: std::time::Duration) {
        let command = command_label(command);
        self.processed_total.with_label_values(&[command]).inc();
        self.duration_seconds
            .with_label_values(&[command])
            .observe(duration.as_secs_f64());
    }

    pub fn record_failed(&self, command: &str) {
        self.failed_total
            .with_label_values(&[command_label(command)])
            .inc();
    }

    pub fn record_quarantined(&self, command: &str) {
        self.dlq_total
            .with_label_values(&[command_label(command)])
            .inc();
    }
}

/// Messages that never yielded a command still need a label value.
fn command_label(command: &str) -> &str {
    if command.is_empty() {
        "(unknown)"
    } else {
        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_track_per_command() {
        let metrics = ConsumerMetrics::new().expect("metrics");

        metrics.record_processed("dispatch", std::time::Duration::from_millis(20));
        metrics.record_failed("dispatch");
        metrics.record_failed("status");
        metrics.record_quarantined("dispatch");

        assert_eq!(
            metrics
                .processed_total
                .with_label_values(&["dispatch"])
                .get(),
            1
        );
        assert_eq!(metrics.failed_total.with_label_values(&["dispatch"]).get(), 1);
        assert_eq!(metrics.failed_total.with_label_values(&["status"]).get(), 1);
        assert_eq!(metrics.dlq_total.with_label_values(&["dispatch"]).get(), 1);
    }

    #[test]
    fn empty_command_falls_back_to_unknown() {
        let metrics = ConsumerMetrics::new().expect("metrics");

        metrics.record_failed("");
        metrics.record_quarantined("");

        assert_eq!(
            metrics.failed_total.with_label_values(&["(unknown)"]).get(),
            1
        );
        assert_eq!(
            metrics.dlq_total.with_label_values(&["(unknown)"]).get(),
            1
        );
    }

    #[test]
    fn registers_with_a_registry() {
        let metrics = ConsumerMetrics::new().expect("metrics");
        let registry = Registry::new();
        metrics.register(&registry).expect("register");

        metrics.record_quarantined("dispatch");

        let families = registry.gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "facteur_command_events_dlq_total"));
    }
}

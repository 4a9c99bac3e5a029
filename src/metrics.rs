use prometheus::core::Collector;
use prometheus::{Counter, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder};
use tracing::error;

lazy_static::lazy_static! {
    // Coordinator metrics
    pub static ref MESSAGES_ACCEPTED: Counter = Counter::with_opts(
        Opts::new("kbrelay_messages_accepted_total", "Messages buffered for a conversation")
    ).unwrap();

    pub static ref MESSAGES_DUPLICATE: Counter = Counter::with_opts(
        Opts::new("kbrelay_messages_duplicate_total", "Redelivered messages suppressed by id")
    ).unwrap();

    pub static ref FLUSHES: Counter = Counter::with_opts(
        Opts::new("kbrelay_flushes_total", "Aggregated messages emitted after a quiet period")
    ).unwrap();

    pub static ref PENDING_CONVERSATIONS: Gauge = Gauge::with_opts(
        Opts::new("kbrelay_pending_conversations", "Conversations with a scheduled flush")
    ).unwrap();

    pub static ref SEEN_MESSAGES: Gauge = Gauge::with_opts(
        Opts::new("kbrelay_seen_message_ids", "Message ids remembered for dedup")
    ).unwrap();

    // Answer service metrics
    pub static ref ANSWER_REQUESTS: Counter = Counter::with_opts(
        Opts::new("kbrelay_answer_requests_total", "Questions forwarded to the answer service")
    ).unwrap();

    pub static ref ANSWER_FAILURES: Counter = Counter::with_opts(
        Opts::new("kbrelay_answer_failures_total", "Answer service calls that failed")
    ).unwrap();

    pub static ref ANSWER_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new("kbrelay_answer_duration_seconds", "Time spent waiting for the answer service")
    ).unwrap();

    pub static ref COMMANDS_HANDLED: Counter = Counter::with_opts(
        Opts::new("kbrelay_commands_handled_total", "Special commands (@stats, @audit) handled")
    ).unwrap();

    // Transport metrics
    pub static ref REPLIES_SENT: Counter = Counter::with_opts(
        Opts::new("kbrelay_replies_sent_total", "Replies delivered to a conversation")
    ).unwrap();

    pub static ref REPLIES_FAILED: Counter = Counter::with_opts(
        Opts::new("kbrelay_replies_failed_total", "Replies the transport refused")
    ).unwrap();
}

pub struct MetricsRegistry {
    registry: Registry,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let registry = Registry::new();

        let collectors: Vec<Box<dyn Collector>> = vec![
            Box::new(MESSAGES_ACCEPTED.clone()),
            Box::new(MESSAGES_DUPLICATE.clone()),
            Box::new(FLUSHES.clone()),
            Box::new(PENDING_CONVERSATIONS.clone()),
            Box::new(SEEN_MESSAGES.clone()),
            Box::new(ANSWER_REQUESTS.clone()),
            Box::new(ANSWER_FAILURES.clone()),
            Box::new(ANSWER_DURATION.clone()),
            Box::new(COMMANDS_HANDLED.clone()),
            Box::new(REPLIES_SENT.clone()),
            Box::new(REPLIES_FAILED.clone()),
        ];
        for collector in collectors {
            if let Err(e) = registry.register(collector) {
                error!("Failed to register metric: {}", e);
            }
        }

        Self { registry }
    }

    pub fn gather_metrics(&self) -> String {
        let metric_families = self.registry.gather();
        let encoder = TextEncoder::new();
        encoder.encode_to_string(&metric_families).unwrap_or_else(|e| {
            error!("Failed to encode metrics: {}", e);
            String::new()
        })
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposition_lists_coordinator_metrics() {
        MESSAGES_ACCEPTED.inc();
        let text = MetricsRegistry::new().gather_metrics();

        assert!(text.contains("kbrelay_messages_accepted_total"));
        assert!(text.contains("kbrelay_pending_conversations"));
        assert!(text.contains("kbrelay_answer_duration_seconds"));
    }
}

use prometheus::{Encoder, IntCounter, Registry, TextEncoder};

/// Settlement counters with their own registry, so independent processor
/// instances never collide on metric names.
pub struct Metrics {
    registry: Registry,
    pub events_received: IntCounter,
    pub events_skipped: IntCounter,
    pub settlements_completed: IntCounter,
    pub settlements_failed: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        let events_received = IntCounter::new(
            "settlement_events_received_total",
            "Swap request events observed on the subscription",
        )
        .expect("failed to build counter");
        let events_skipped = IntCounter::new(
            "settlement_events_skipped_total",
            "Request events dropped for unsupported assets",
        )
        .expect("failed to build counter");
        let settlements_completed = IntCounter::new(
            "settlements_completed_total",
            "Settlements that distributed the realized stable amount",
        )
        .expect("failed to build counter");
        let settlements_failed = IntCounter::new(
            "settlements_failed_total",
            "Settlements dropped after a quote, swap, or distribution failure",
        )
        .expect("failed to build counter");

        for counter in [
            &events_received,
            &events_skipped,
            &settlements_completed,
            &settlements_failed,
        ] {
            registry
                .register(Box::new(counter.clone()))
                .expect("failed to register counter");
        }

        Self {
            registry,
            events_received,
            events_skipped,
            settlements_completed,
            settlements_failed,
        }
    }

    /// Prometheus text exposition for the HTTP endpoint.
    pub fn export(&self) -> String {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .ok();
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

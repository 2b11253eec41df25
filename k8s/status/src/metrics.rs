use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, histogram::Histogram},
    registry::Registry,
};

/// Counters and a latency histogram for the §4.9 reconciliation loop, scraped
/// by the same `prometheus_client` registry the rest of the controller uses.
pub struct ReconcileMetrics {
    reconciles: Family<GroupLabels, Counter>,
    errors: Family<ErrorLabels, Counter>,
    reconcile_duration_seconds: Histogram,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct GroupLabels {
    namespace: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ErrorLabels {
    namespace: String,
    kind: String,
}

impl ReconcileMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let reconciles = Family::default();
        prom.register(
            "reconciles",
            "Count of completed group reconciliations",
            reconciles.clone(),
        );

        let errors = Family::default();
        prom.register(
            "reconcile_errors",
            "Count of reconciliation errors by ControllerError kind",
            errors.clone(),
        );

        let reconcile_duration_seconds = Histogram::new(
            [0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0].into_iter(),
        );
        prom.register(
            "reconcile_duration_seconds",
            "Histogram of reconciliation loop iteration latency",
            reconcile_duration_seconds.clone(),
        );

        Self {
            reconciles,
            errors,
            reconcile_duration_seconds,
        }
    }

    pub fn record_success(&self, namespace: &str, elapsed: std::time::Duration) {
        self.reconciles
            .get_or_create(&GroupLabels {
                namespace: namespace.to_string(),
            })
            .inc();
        self.reconcile_duration_seconds.observe(elapsed.as_secs_f64());
    }

    pub fn record_error(&self, namespace: &str, kind: &str, elapsed: std::time::Duration) {
        self.errors
            .get_or_create(&ErrorLabels {
                namespace: namespace.to_string(),
                kind: kind.to_string(),
            })
            .inc();
        self.reconcile_duration_seconds.observe(elapsed.as_secs_f64());
    }
}

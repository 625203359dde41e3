#[derive(Debug, Clone)]
pub struct Metrics {
    upstream_requests: prometheus::IntCounterVec,
    upstream_pages: prometheus::IntCounterVec,
    aggregations: prometheus::IntCounterVec,
    pub last_request: prometheus::Gauge,
}

impl Metrics {
    pub fn new(registry: &prometheus::Registry) -> Result<Self, prometheus::Error> {
        let upstream_requests = prometheus::IntCounterVec::new(
            prometheus::Opts::new("upstream_requests", "The number of upstream API calls"),
            &["resource", "outcome"],
        )?;
        registry.register(Box::new(upstream_requests.clone()))?;

        let upstream_pages = prometheus::IntCounterVec::new(
            prometheus::Opts::new(
                "upstream_pages",
                "The number of pages loaded while following cursors",
            ),
            &["resource"],
        )?;
        registry.register(Box::new(upstream_pages.clone()))?;

        let aggregations = prometheus::IntCounterVec::new(
            prometheus::Opts::new("aggregations", "The number of answered inbound requests"),
            &["endpoint", "status"],
        )?;
        registry.register(Box::new(aggregations.clone()))?;

        let last_request =
            prometheus::Gauge::new("last_request", "The Unix Timestamp of the last inbound request")?;
        registry.register(Box::new(last_request.clone()))?;

        Ok(Self {
            upstream_requests,
            upstream_pages,
            aggregations,
            last_request,
        })
    }

    /// Metrics that are not exposed anywhere, for tests and one-off clients
    pub fn unregistered() -> Self {
        let registry = prometheus::Registry::new();
        match Self::new(&registry) {
            Ok(m) => m,
            // A fresh registry has no name collisions
            Err(e) => unreachable!("registering on an empty registry: {e}"),
        }
    }

    pub fn upstream(&self, resource: &str, ok: bool) {
        let outcome = if ok { "ok" } else { "failed" };
        self.upstream_requests
            .with_label_values(&[resource, outcome])
            .inc();
    }

    pub fn page(&self, resource: &str) {
        self.upstream_pages.with_label_values(&[resource]).inc();
    }

    pub fn answered(&self, endpoint: &str, status: axum::http::StatusCode) {
        self.aggregations
            .with_label_values(&[endpoint, status.as_str()])
            .inc();

        let unix_timestamp = std::time::SystemTime::now()
            .duration_since(std::time::SystemTime::UNIX_EPOCH)
            .unwrap_or_default();
        self.last_request.set(unix_timestamp.as_secs() as f64);
    }

    pub fn upstream_count(&self, resource: &str, outcome: &str) -> u64 {
        self.upstream_requests
            .with_label_values(&[resource, outcome])
            .get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_upstream_outcomes() {
        let metrics = Metrics::unregistered();
        metrics.upstream("badges", true);
        metrics.upstream("badges", true);
        metrics.upstream("badges", false);

        assert_eq!(metrics.upstream_count("badges", "ok"), 2);
        assert_eq!(metrics.upstream_count("badges", "failed"), 1);
    }

    #[test]
    fn registering_twice_fails() {
        let registry = prometheus::Registry::new();
        assert!(Metrics::new(&registry).is_ok());
        assert!(Metrics::new(&registry).is_err());
    }
}

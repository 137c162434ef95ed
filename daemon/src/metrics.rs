/// Metrics collection and exposure
use crate::errors::{DaemonError, DaemonResult};
use prometheus::{Counter, Encoder, Histogram, HistogramOpts, IntGauge, Registry, TextEncoder};
use std::time::Instant;

fn metric<T>(result: Result<T, prometheus::Error>) -> DaemonResult<T> {
    result.map_err(|e| DaemonError::MetricsError(e.to_string()))
}

pub struct MetricsCollector {
    registry: Registry,

    pub request_total: Counter,
    pub request_duration: Histogram,
    pub request_errors: Counter,

    pub workflows_started: Counter,
    pub workflows_completed: Counter,
    pub workflows_failed: Counter,
    pub workflows_running: IntGauge,

    pub connections_total: Counter,
    pub connections_active: IntGauge,

    server_start: Instant,
}

impl MetricsCollector {
    pub fn new() -> DaemonResult<Self> {
        let registry = Registry::new();

        let request_total = metric(Counter::new("requests_total", "Total HTTP requests"))?;
        registry.register(Box::new(request_total.clone())).map_err(|e| DaemonError::MetricsError(e.to_string()))?;

        let request_duration = metric(Histogram::with_opts(HistogramOpts::new(
            "request_duration_seconds",
            "Request duration",
        )))?;
        registry.register(Box::new(request_duration.clone())).map_err(|e| DaemonError::MetricsError(e.to_string()))?;

        let request_errors = metric(Counter::new("request_errors_total", "Total request errors"))?;
        registry.register(Box::new(request_errors.clone())).map_err(|e| DaemonError::MetricsError(e.to_string()))?;

        let workflows_started = metric(Counter::new("workflows_started_total", "Total workflows started"))?;
        registry.register(Box::new(workflows_started.clone())).map_err(|e| DaemonError::MetricsError(e.to_string()))?;

        let workflows_completed = metric(Counter::new("workflows_completed_total", "Total workflows completed"))?;
        registry.register(Box::new(workflows_completed.clone())).map_err(|e| DaemonError::MetricsError(e.to_string()))?;

        let workflows_failed = metric(Counter::new("workflows_failed_total", "Total workflows failed"))?;
        registry.register(Box::new(workflows_failed.clone())).map_err(|e| DaemonError::MetricsError(e.to_string()))?;

        let workflows_running = metric(IntGauge::new("workflows_running", "Currently running workflows"))?;
        registry.register(Box::new(workflows_running.clone())).map_err(|e| DaemonError::MetricsError(e.to_string()))?;

        let connections_total = metric(Counter::new("connections_total", "Total connections"))?;
        registry.register(Box::new(connections_total.clone())).map_err(|e| DaemonError::MetricsError(e.to_string()))?;

        let connections_active = metric(IntGauge::new("connections_active", "Active connections"))?;
        registry.register(Box::new(connections_active.clone())).map_err(|e| DaemonError::MetricsError(e.to_string()))?;

        Ok(MetricsCollector {
            registry,
            request_total,
            request_duration,
            request_errors,
            workflows_started,
            workflows_completed,
            workflows_failed,
            workflows_running,
            connections_total,
            connections_active,
            server_start: Instant::now(),
        })
    }

    pub fn record_request(&self, duration_secs: f64) {
        self.request_total.inc();
        self.request_duration.observe(duration_secs);
    }

    pub fn record_error(&self) {
        self.request_errors.inc();
    }

    pub fn record_workflow_started(&self) {
        self.workflows_started.inc();
        self.workflows_running.inc();
    }

    pub fn record_workflow_finished(&self, failed: bool) {
        self.workflows_running.dec();
        if failed {
            self.workflows_failed.inc();
        } else {
            self.workflows_completed.inc();
        }
    }

    pub fn record_connection(&self) {
        self.connections_total.inc();
        self.connections_active.inc();
    }

    pub fn record_connection_closed(&self) {
        self.connections_active.dec();
    }

    pub fn uptime_secs(&self) -> u64 {
        self.server_start.elapsed().as_secs()
    }

    pub fn gather_metrics(&self) -> DaemonResult<String> {
        let metrics = self.registry.gather();
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&metrics, &mut buf)
            .map_err(|e| DaemonError::MetricsError(e.to_string()))?;
        Ok(String::from_utf8(buf).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_creation_and_gathering() {
        let metrics = MetricsCollector::new().unwrap();
        assert!(metrics.gather_metrics().is_ok());
    }

    #[test]
    fn request_recording() {
        let metrics = MetricsCollector::new().unwrap();
        metrics.record_request(0.5);
        assert_eq!(metrics.request_total.get(), 1.0);
    }

    #[test]
    fn workflow_lifecycle_counters() {
        let metrics = MetricsCollector::new().unwrap();
        metrics.record_workflow_started();
        assert_eq!(metrics.workflows_running.get(), 1);
        metrics.record_workflow_finished(false);
        assert_eq!(metrics.workflows_running.get(), 0);
        assert_eq!(metrics.workflows_completed.get(), 1.0);
    }
}

use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;

use crate::models::ProviderMetrics;

/// Accumulates call statistics for one adapter instance.
///
/// Averages are updated incrementally so memory stays constant; only the most
/// recent error message is kept.
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    inner: Mutex<ProviderMetrics>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, latency: Duration) {
        self.record(latency, None);
    }

    pub fn record_failure(&self, latency: Duration, error: impl Into<String>) {
        self.record(latency, Some(error.into()));
    }

    fn record(&self, latency: Duration, error: Option<String>) {
        let mut metrics = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        metrics.api_calls_count += 1;
        #[allow(clippy::cast_precision_loss)]
        let n = metrics.api_calls_count as f64;
        let latency_ms = latency.as_secs_f64() * 1000.0;

        metrics.average_response_time =
            (metrics.average_response_time * (n - 1.0) + latency_ms) / n;

        let outcome = if error.is_none() { 100.0 } else { 0.0 };
        metrics.api_calls_success_rate =
            (metrics.api_calls_success_rate * (n - 1.0) + outcome) / n;

        match error {
            Some(message) => {
                metrics.error_count += 1;
                metrics.last_error = Some(message);
            }
            None => metrics.last_sync_time = Some(Utc::now()),
        }
    }

    pub fn snapshot(&self) -> ProviderMetrics {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

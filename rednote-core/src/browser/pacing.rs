use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::debug;

use crate::config::{JitterRange, PacingSection};

use super::metrics::MetricsHandle;

/// Bounded random pauses between workflow phases.
///
/// Pauses only pace the workflow; phases that depend on page state still
/// gate on an explicit wait.
#[derive(Debug, Clone)]
pub struct DelayScheduler {
    enabled: bool,
    metrics: MetricsHandle,
}

impl DelayScheduler {
    pub fn new(config: &PacingSection, metrics: MetricsHandle) -> Self {
        Self {
            enabled: config.enabled,
            metrics,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            metrics: MetricsHandle::default(),
        }
    }

    /// Uniform sample inside `range`; a reversed range is read as `[max, min]`.
    pub fn sample(&self, range: JitterRange) -> Duration {
        let lower = range[0].min(range[1]);
        let upper = range[0].max(range[1]);
        let millis = rand::thread_rng().gen_range(lower..=upper);
        Duration::from_millis(millis)
    }

    pub async fn jitter(&self, range: JitterRange) -> Duration {
        if !self.enabled {
            return Duration::ZERO;
        }
        let delay = self.sample(range);
        debug!(delay_ms = delay.as_millis() as u64, "pacing delay");
        sleep(delay).await;
        self.metrics
            .with(|metrics| metrics.record_jitter(delay.as_millis() as u64));
        delay
    }
}

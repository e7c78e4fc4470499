use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AutomationMetrics {
    pub sessions_opened: u64,
    pub sessions_released: u64,
    pub pages_opened: u64,
    pub pages_closed: u64,
    pub release_failures: u64,
    pub notes_extracted: u64,
    pub comments_extracted: u64,
    pub extraction_failures: u64,
    pub publish_attempts: u64,
    pub publish_confirmed: u64,
    pub publish_unconfirmed: u64,
    pub publish_failures: u64,
    pub jitter_ms: u64,
}

impl AutomationMetrics {
    pub fn record_session_open(&mut self) {
        self.sessions_opened = self.sessions_opened.saturating_add(1);
    }

    pub fn record_session_release(&mut self) {
        self.sessions_released = self.sessions_released.saturating_add(1);
    }

    pub fn record_page_open(&mut self) {
        self.pages_opened = self.pages_opened.saturating_add(1);
    }

    pub fn record_page_close(&mut self) {
        self.pages_closed = self.pages_closed.saturating_add(1);
    }

    pub fn record_release_failure(&mut self) {
        self.release_failures = self.release_failures.saturating_add(1);
    }

    pub fn record_notes(&mut self, count: usize) {
        self.notes_extracted = self.notes_extracted.saturating_add(count as u64);
    }

    pub fn record_comments(&mut self, count: usize) {
        self.comments_extracted = self.comments_extracted.saturating_add(count as u64);
    }

    pub fn record_extraction_failure(&mut self) {
        self.extraction_failures = self.extraction_failures.saturating_add(1);
    }

    pub fn record_publish_attempt(&mut self) {
        self.publish_attempts = self.publish_attempts.saturating_add(1);
    }

    pub fn record_publish_confirmed(&mut self) {
        self.publish_confirmed = self.publish_confirmed.saturating_add(1);
    }

    pub fn record_publish_unconfirmed(&mut self) {
        self.publish_unconfirmed = self.publish_unconfirmed.saturating_add(1);
    }

    pub fn record_publish_failure(&mut self) {
        self.publish_failures = self.publish_failures.saturating_add(1);
    }

    pub fn record_jitter(&mut self, millis: u64) {
        self.jitter_ms = self.jitter_ms.saturating_add(millis);
    }

    /// Sessions acquired but not yet released.
    pub fn sessions_in_flight(&self) -> u64 {
        self.sessions_opened.saturating_sub(self.sessions_released)
    }
}

/// Shared, lock-protected metrics used by every component of one client.
#[derive(Debug, Clone, Default)]
pub struct MetricsHandle {
    inner: Arc<Mutex<AutomationMetrics>>,
}

impl MetricsHandle {
    pub fn snapshot(&self) -> AutomationMetrics {
        match self.inner.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut AutomationMetrics) -> R,
    {
        match self.inner.lock() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

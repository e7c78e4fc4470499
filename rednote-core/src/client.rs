use std::path::Path;
use std::sync::Arc;

use tracing::warn;

use crate::browser::{
    AutomationMetrics, BrowserResult, ChromiumLauncher, CookieScope, CredentialStore,
    DelayScheduler, FileCookieStore, MetricsHandle, SessionFactory, SessionLease, SessionManager,
};
use crate::config::RednoteConfig;
use crate::extract::{ExtractedComment, ExtractedNote, NoteExtractor};
use crate::publish::{PublishOrchestrator, PublishOutcome, PublishParams, PublishRequest};

/// Entry point for read and publish operations. Every call runs on its own
/// browser session, released before the call returns.
pub struct RednoteClient {
    config: RednoteConfig,
    sessions: SessionManager,
    extractor: NoteExtractor,
    orchestrator: PublishOrchestrator,
    metrics: MetricsHandle,
}

impl RednoteClient {
    pub fn new(
        config: RednoteConfig,
        factory: Arc<dyn SessionFactory>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        let metrics = MetricsHandle::default();
        let delays = DelayScheduler::new(&config.pacing, metrics.clone());
        Self::with_delays(config, factory, credentials, delays, metrics)
    }

    /// Like [`RednoteClient::new`] with an explicit pacing scheduler.
    pub fn with_delays(
        config: RednoteConfig,
        factory: Arc<dyn SessionFactory>,
        credentials: Arc<dyn CredentialStore>,
        delays: DelayScheduler,
        metrics: MetricsHandle,
    ) -> Self {
        let sessions = SessionManager::new(factory, credentials, metrics.clone());
        let extractor = NoteExtractor::new(&config, delays.clone(), metrics.clone());
        let orchestrator = PublishOrchestrator::new(&config, delays, metrics.clone());
        Self {
            config,
            sessions,
            extractor,
            orchestrator,
            metrics,
        }
    }

    /// Chromium sessions with cookies read from `session.cookie_file`,
    /// resolved against `base_dir`.
    pub fn chromium(config: RednoteConfig, base_dir: &Path) -> Self {
        let cookie_path = config.resolve_path(base_dir, &config.session.cookie_file);
        let factory = Arc::new(ChromiumLauncher::new(config.browser.clone()));
        let credentials = Arc::new(FileCookieStore::new(cookie_path));
        Self::new(config, factory, credentials)
    }

    pub fn config(&self) -> &RednoteConfig {
        &self.config
    }

    pub fn metrics(&self) -> AutomationMetrics {
        self.metrics.snapshot()
    }

    pub async fn search(&self, keywords: &str, limit: usize) -> BrowserResult<Vec<ExtractedNote>> {
        let lease = self.open_reader("search").await?;
        let result = self.extractor.search(lease.page(), keywords, limit).await;
        finish(lease, result).await
    }

    pub async fn get_detail(&self, url_or_share_text: &str) -> BrowserResult<ExtractedNote> {
        let lease = self.open_reader("detail").await?;
        let result = self
            .extractor
            .note_detail(lease.page(), url_or_share_text)
            .await;
        finish(lease, result).await
    }

    pub async fn get_comments(&self, url: &str) -> BrowserResult<Vec<ExtractedComment>> {
        let lease = self.open_reader("comments").await?;
        let result = self.extractor.comments(lease.page(), url).await;
        finish(lease, result).await
    }

    pub async fn publish(&self, request: PublishRequest) -> PublishOutcome {
        self.orchestrator.publish(&self.sessions, request).await
    }

    pub async fn publish_params(&self, params: PublishParams) -> PublishOutcome {
        self.orchestrator
            .publish_params(&self.sessions, params)
            .await
    }

    async fn open_reader(&self, operation: &'static str) -> BrowserResult<SessionLease> {
        let lease = self.sessions.acquire(operation, CookieScope::AsStored).await?;
        if let Err(err) = self.extractor.verify_login(lease.page()).await {
            warn!(operation, error = %err, "login check failed");
            lease.release().await;
            return Err(err);
        }
        Ok(lease)
    }
}

async fn finish<T>(lease: SessionLease, result: BrowserResult<T>) -> BrowserResult<T> {
    if let Err(err) = &result {
        warn!(operation = lease.operation(), error = %err, "read operation failed");
    }
    lease.release().await;
    result
}

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::cookies::widen_cookie_domain;
use super::driver::{BrowserSession, CredentialStore, PageDriver, SessionFactory};
use super::error::BrowserResult;
use super::metrics::MetricsHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieScope {
    /// Inject cookies exactly as stored.
    AsStored,
    /// Widen every cookie domain so it also covers sibling subdomains.
    Subdomains,
}

/// Acquires one browser session and page per top-level operation.
#[derive(Clone)]
pub struct SessionManager {
    factory: Arc<dyn SessionFactory>,
    credentials: Arc<dyn CredentialStore>,
    metrics: MetricsHandle,
}

impl SessionManager {
    pub fn new(
        factory: Arc<dyn SessionFactory>,
        credentials: Arc<dyn CredentialStore>,
        metrics: MetricsHandle,
    ) -> Self {
        Self {
            factory,
            credentials,
            metrics,
        }
    }

    pub fn metrics(&self) -> &MetricsHandle {
        &self.metrics
    }

    /// Opens a session and page with stored cookies applied. Anything
    /// acquired before a failure is released before the error is returned.
    pub async fn acquire(
        &self,
        operation: &'static str,
        scope: CookieScope,
    ) -> BrowserResult<SessionLease> {
        let session = self.factory.open().await?;
        self.metrics.with(|m| m.record_session_open());

        let page = match session.new_page().await {
            Ok(page) => page,
            Err(err) => {
                warn!(operation, error = %err, "failed to open page");
                if let Err(close_err) = session.close().await {
                    warn!(operation, error = %close_err, "failed to close session");
                    self.metrics.with(|m| m.record_release_failure());
                }
                self.metrics.with(|m| m.record_session_release());
                return Err(err);
            }
        };
        self.metrics.with(|m| m.record_page_open());
        debug!(operation, "browser session acquired");

        let lease = SessionLease {
            operation,
            session,
            page,
            metrics: self.metrics.clone(),
            released: false,
        };
        if let Err(err) = self.inject_cookies(lease.page(), scope).await {
            warn!(operation, error = %err, "cookie injection failed");
            lease.release().await;
            return Err(err);
        }
        Ok(lease)
    }

    async fn inject_cookies(&self, page: &dyn PageDriver, scope: CookieScope) -> BrowserResult<()> {
        let cookies = self.credentials.stored_cookies().await?;
        if cookies.is_empty() {
            warn!("no stored cookies, login may be required");
            return Ok(());
        }
        let cookies = match scope {
            CookieScope::AsStored => cookies,
            CookieScope::Subdomains => cookies.iter().map(widen_cookie_domain).collect(),
        };
        info!(count = cookies.len(), ?scope, "loading stored cookies");
        page.add_cookies(&cookies).await
    }
}

/// Exclusive session/page pair for one operation. Call [`SessionLease::release`]
/// on every exit path.
pub struct SessionLease {
    operation: &'static str,
    session: Box<dyn BrowserSession>,
    page: Box<dyn PageDriver>,
    metrics: MetricsHandle,
    released: bool,
}

impl SessionLease {
    pub fn page(&self) -> &dyn PageDriver {
        self.page.as_ref()
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Closes the page, then the session. Close failures are logged and
    /// never returned.
    pub async fn release(mut self) {
        match self.page.close().await {
            Ok(()) => self.metrics.with(|m| m.record_page_close()),
            Err(err) => {
                warn!(operation = self.operation, error = %err, "error closing page");
                self.metrics.with(|m| m.record_release_failure());
            }
        }
        if let Err(err) = self.session.close().await {
            warn!(operation = self.operation, error = %err, "error closing browser session");
            self.metrics.with(|m| m.record_release_failure());
        }
        self.metrics.with(|m| m.record_session_release());
        self.released = true;
        debug!(operation = self.operation, "browser session released");
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        if !self.released {
            warn!(
                operation = self.operation,
                "session lease dropped without explicit release"
            );
        }
    }
}

pub mod chromium;
pub mod cookies;
pub mod driver;
pub mod error;
pub mod metrics;
pub mod pacing;
pub mod selector;
pub mod session;

pub use chromium::{ChromiumLauncher, ChromiumPage, ChromiumSession};
pub use cookies::{widen_cookie_domain, FileCookieStore};
pub use driver::{
    marker_selector, BrowserSession, CookieRecord, CredentialStore, PageDriver, SessionFactory,
    WaitState, MARKER_ATTRIBUTE,
};
pub use error::{BrowserError, BrowserResult};
pub use metrics::{AutomationMetrics, MetricsHandle};
pub use pacing::DelayScheduler;
pub use selector::{LocateStrategy, Located, Resolution, SelectorCandidate, SelectorResolver};
pub use session::{CookieScope, SessionLease, SessionManager};

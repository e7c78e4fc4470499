use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use tokio::time::{sleep, Instant};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use super::driver::{marker_selector, PageDriver, WaitState};
use super::error::BrowserResult;

/// How a candidate finds its element.
///
/// Configuration uses a compact notation: `text=PHRASE` scans every element,
/// `SCOPE:has-text("PHRASE")` scans only elements matching `SCOPE`, anything
/// else is a CSS selector.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum LocateStrategy {
    Css(String),
    Text {
        scope: Option<String>,
        phrase: String,
    },
}

impl LocateStrategy {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Some(phrase) = raw.strip_prefix("text=") {
            return LocateStrategy::Text {
                scope: None,
                phrase: unquote(phrase),
            };
        }
        if let Some((scope, rest)) = raw.split_once(":has-text(") {
            if let Some(inner) = rest.strip_suffix(')') {
                return LocateStrategy::Text {
                    scope: Some(scope.trim().to_string()),
                    phrase: unquote(inner),
                };
            }
        }
        LocateStrategy::Css(raw.to_string())
    }

    pub fn css(selector: impl Into<String>) -> Self {
        LocateStrategy::Css(selector.into())
    }

    pub fn text(phrase: impl Into<String>) -> Self {
        LocateStrategy::Text {
            scope: None,
            phrase: phrase.into(),
        }
    }
}

impl TryFrom<String> for LocateStrategy {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.trim().is_empty() {
            Err("selector must not be empty".to_string())
        } else {
            Ok(LocateStrategy::parse(&value))
        }
    }
}

impl fmt::Display for LocateStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocateStrategy::Css(selector) => f.write_str(selector),
            LocateStrategy::Text { scope: None, phrase } => write!(f, "text={phrase}"),
            LocateStrategy::Text {
                scope: Some(scope),
                phrase,
            } => write!(f, "{scope}:has-text(\"{phrase}\")"),
        }
    }
}

fn unquote(value: &str) -> String {
    let value = value.trim();
    let stripped = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')));
    stripped.unwrap_or(value).to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorCandidate {
    pub priority: u32,
    pub strategy: LocateStrategy,
    pub timeout: Duration,
}

impl SelectorCandidate {
    pub fn new(priority: u32, strategy: LocateStrategy, timeout: Duration) -> Self {
        Self {
            priority,
            strategy,
            timeout,
        }
    }

    /// Ranks `strategies` by their position, all sharing one wait window.
    pub fn ranked(strategies: &[LocateStrategy], timeout: Duration) -> Vec<Self> {
        strategies
            .iter()
            .enumerate()
            .map(|(idx, strategy)| Self::new(idx as u32, strategy.clone(), timeout))
            .collect()
    }

    pub fn css(selector: impl Into<String>, timeout: Duration) -> Self {
        Self::new(0, LocateStrategy::css(selector), timeout)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub priority: u32,
    pub strategy: LocateStrategy,
    /// Selector addressing the located element for follow-up operations.
    pub selector: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Located(Located),
    NotFound,
}

impl Resolution {
    pub fn located(self) -> Option<Located> {
        match self {
            Resolution::Located(located) => Some(located),
            Resolution::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Resolution::Located(_))
    }
}

#[derive(Debug, Clone)]
pub struct SelectorResolver {
    poll_interval: Duration,
}

impl Default for SelectorResolver {
    fn default() -> Self {
        Self::new(Duration::from_millis(250))
    }
}

impl SelectorResolver {
    pub fn new(poll_interval: Duration) -> Self {
        let poll_interval = poll_interval.max(Duration::from_millis(10));
        Self { poll_interval }
    }

    /// First candidate, in priority order, to resolve inside its own window.
    /// Candidates after the winner are never probed.
    pub async fn resolve(
        &self,
        page: &dyn PageDriver,
        candidates: &[SelectorCandidate],
    ) -> Resolution {
        let mut ordered = candidates.iter().collect::<Vec<_>>();
        ordered.sort_by_key(|candidate| candidate.priority);

        for candidate in ordered {
            match self.probe(page, candidate).await {
                Ok(Some(selector)) => {
                    debug!(
                        priority = candidate.priority,
                        strategy = %candidate.strategy,
                        "selector candidate resolved"
                    );
                    return Resolution::Located(Located {
                        priority: candidate.priority,
                        strategy: candidate.strategy.clone(),
                        selector,
                    });
                }
                Ok(None) => {
                    trace!(strategy = %candidate.strategy, "selector candidate missed");
                }
                Err(err) => {
                    debug!(
                        strategy = %candidate.strategy,
                        error = %err,
                        "selector candidate probe failed"
                    );
                }
            }
        }
        Resolution::NotFound
    }

    /// Like [`SelectorResolver::resolve`], but the located element must also
    /// accept `action`. A candidate whose element rejects it counts as a miss
    /// and the next candidate is tried.
    pub async fn resolve_with<F, Fut>(
        &self,
        page: &dyn PageDriver,
        candidates: &[SelectorCandidate],
        action: F,
    ) -> Resolution
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = BrowserResult<()>>,
    {
        let mut ordered = candidates.to_vec();
        ordered.sort_by_key(|candidate| candidate.priority);

        for candidate in ordered {
            let Some(found) = self
                .resolve(page, std::slice::from_ref(&candidate))
                .await
                .located()
            else {
                continue;
            };
            match action(found.selector.clone()).await {
                Ok(()) => return Resolution::Located(found),
                Err(err) => {
                    warn!(
                        strategy = %found.strategy,
                        error = %err,
                        "located element rejected the action, trying next candidate"
                    );
                }
            }
        }
        Resolution::NotFound
    }

    pub async fn resolve_one(
        &self,
        page: &dyn PageDriver,
        strategy: LocateStrategy,
        timeout: Duration,
    ) -> Resolution {
        self.resolve(page, &[SelectorCandidate::new(0, strategy, timeout)])
            .await
    }

    async fn probe(
        &self,
        page: &dyn PageDriver,
        candidate: &SelectorCandidate,
    ) -> BrowserResult<Option<String>> {
        match &candidate.strategy {
            LocateStrategy::Css(selector) => {
                let found = page
                    .wait_for(selector, WaitState::Attached, candidate.timeout)
                    .await?;
                Ok(found.then(|| selector.clone()))
            }
            LocateStrategy::Text { scope, phrase } => {
                let marker = Uuid::new_v4().simple().to_string();
                let deadline = Instant::now() + candidate.timeout;
                loop {
                    if page.mark_text(scope.as_deref(), phrase, &marker).await? {
                        return Ok(Some(marker_selector(&marker)));
                    }
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    sleep(self.poll_interval.min(deadline - now)).await;
                }
            }
        }
    }
}

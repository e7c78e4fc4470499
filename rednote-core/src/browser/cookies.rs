use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs;
use tracing::{debug, warn};

use super::driver::{CookieRecord, CredentialStore};
use super::error::{BrowserError, BrowserResult};

/// Cookies exported by the interactive login, stored as a JSON array.
#[derive(Debug, Clone)]
pub struct FileCookieStore {
    path: PathBuf,
}

impl FileCookieStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait(?Send)]
impl CredentialStore for FileCookieStore {
    async fn stored_cookies(&self) -> BrowserResult<Vec<CookieRecord>> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                warn!(path = %self.path.display(), "cookie file not found");
                return Ok(Vec::new());
            }
            Err(err) => return Err(BrowserError::Io(err)),
        };
        let cookies: Vec<CookieRecord> = serde_json::from_str(&raw).map_err(|err| {
            BrowserError::Credentials(format!(
                "failed to parse cookie file {}: {err}",
                self.path.display()
            ))
        })?;
        let now = Utc::now().timestamp() as f64;
        let total = cookies.len();
        let live = cookies
            .into_iter()
            .filter(|cookie| !is_expired(cookie, now))
            .collect::<Vec<_>>();
        if live.len() < total {
            debug!(expired = total - live.len(), "dropped expired cookies");
        }
        Ok(live)
    }
}

/// Session cookies carry `expires <= 0`.
fn is_expired(cookie: &CookieRecord, now: f64) -> bool {
    matches!(cookie.expires, Some(expires) if expires > 0.0 && expires < now)
}

/// Rewrites the cookie domain to its leading-dot form so it also applies to
/// subdomains such as the creator site.
pub fn widen_cookie_domain(cookie: &CookieRecord) -> CookieRecord {
    let mut widened = cookie.clone();
    if !widened.domain.starts_with('.') {
        widened.domain = format!(".{}", widened.domain);
    }
    widened
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn cookie(domain: &str, expires: Option<f64>) -> CookieRecord {
        CookieRecord {
            name: "web_session".into(),
            value: "token".into(),
            domain: domain.into(),
            path: "/".into(),
            expires,
            http_only: true,
            secure: true,
            same_site: None,
        }
    }

    #[test]
    fn widening_adds_leading_dot_once() {
        assert_eq!(widen_cookie_domain(&cookie("xiaohongshu.com", None)).domain, ".xiaohongshu.com");
        assert_eq!(widen_cookie_domain(&cookie(".xiaohongshu.com", None)).domain, ".xiaohongshu.com");
    }

    #[tokio::test]
    async fn missing_file_yields_no_cookies() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCookieStore::new(dir.path().join("absent.json"));
        assert!(store.stored_cookies().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn expired_cookies_are_dropped() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let cookies = vec![
            cookie("xiaohongshu.com", Some(1.0)),
            cookie("xiaohongshu.com", Some(-1.0)),
            cookie("xiaohongshu.com", Some(4_102_444_800.0)),
        ];
        write!(file, "{}", serde_json::to_string(&cookies).unwrap()).unwrap();
        let store = FileCookieStore::new(file.path());
        assert_eq!(store.stored_cookies().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn malformed_file_is_a_credentials_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let store = FileCookieStore::new(file.path());
        let err = store.stored_cookies().await.unwrap_err();
        assert!(matches!(err, BrowserError::Credentials(_)));
    }
}

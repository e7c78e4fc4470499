use thiserror::Error;

pub type BrowserResult<T> = Result<T, BrowserError>;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("chromium launch failed: {0}")]
    Launch(String),
    #[error("cdp error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("timeout waiting for {0}")]
    Timeout(String),
    #[error("navigation to {url} did not finish in time")]
    NetworkTimeout { url: String },
    #[error("container {selector} never appeared")]
    ContainerNotFound { selector: String },
    #[error("element not found: {0}")]
    ElementNotFound(String),
    #[error("login required: {0}")]
    AuthRequired(String),
    #[error("credential store error: {0}")]
    Credentials(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}


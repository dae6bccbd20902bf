//! Error types for clipresolve
//!
//! Every pipeline stage has its own `thiserror` enum. They are wrapped by the
//! crate-level [`Error`], and [`Error::kind`] classifies any of them into the
//! closed [`ErrorKind`] taxonomy that callers are allowed to depend on.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The main error type for internal pipeline operations
#[derive(Error, Debug)]
pub enum Error {
    /// Link normalization errors
    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    /// Browser lifecycle and session pool errors
    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    /// Navigation errors
    #[error("Navigation error: {0}")]
    Navigation(#[from] NavigationError),

    /// Media URL extraction errors
    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Result finalization errors
    #[error("Finalize error: {0}")]
    Finalize(#[from] FinalizeError),

    /// ChromiumOxide errors
    #[error("CDP error: {0}")]
    Cdp(String),

    /// Generic error with message
    #[error("{0}")]
    Generic(String),
}

/// Link normalization errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// Input was empty after trimming and decoding
    #[error("Link is empty")]
    Empty,

    /// Input is not a URL on a supported host
    #[error("Unsupported host: {0}")]
    UnsupportedHost(String),

    /// Host is supported but the path matches no known video shape
    #[error("Unrecognized link format: {0}")]
    Unrecognized(String),

    /// A short link redirected somewhere that is not a video page
    #[error("Short link redirected to a non-video page: {0}")]
    RedirectTarget(String),
}

/// Browser lifecycle and session pool errors
#[derive(Error, Debug)]
pub enum BrowserError {
    /// Failed to launch browser
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    /// Browser configuration error
    #[error("Invalid browser configuration: {0}")]
    ConfigError(String),

    /// Failed to create an isolated browsing context
    #[error("Failed to create browsing context: {0}")]
    ContextCreationFailed(String),

    /// Session pool has been shut down
    #[error("Session pool is shut down")]
    PoolClosed,

    /// No context slot became free in time
    #[error("No browsing context available after {0}ms")]
    PoolExhausted(u64),

    /// Timeout waiting for browser
    #[error("Browser operation timed out after {0}ms")]
    Timeout(u64),
}

/// Navigation errors
#[derive(Error, Debug)]
pub enum NavigationError {
    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Navigation timeout
    #[error("Navigation timed out after {0}ms")]
    Timeout(u64),

    /// Page load failed
    #[error("Page load failed: {0}")]
    LoadFailed(String),
}

/// Media URL extraction errors
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// Every strategy in the chain missed
    #[error("No media URL found (tried: {0})")]
    Miss(String),

    /// An extracted value could not be turned into a media URL
    #[error("Extracted value is not a usable media URL: {0}")]
    UnusableValue(String),
}

/// Result finalization errors
#[derive(Error, Debug)]
pub enum FinalizeError {
    /// Media URL answered with a non-success status
    #[error("Media URL returned HTTP {status}: {url}")]
    BadStatus {
        /// HTTP status code
        status: u16,
        /// Checked URL
        url: String,
    },

    /// Reachability check failed at the transport level
    #[error("Media URL unreachable: {0}")]
    Unreachable(String),

    /// Reachability check timed out
    #[error("Reachability check timed out after {0}ms")]
    Timeout(u64),
}

/// Result type alias for clipresolve operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a generic error from a string
    pub fn generic<S: Into<String>>(msg: S) -> Self {
        Error::Generic(msg.into())
    }

    /// Create a CDP error from a string
    pub fn cdp<S: Into<String>>(msg: S) -> Self {
        Error::Cdp(msg.into())
    }

    /// Classify this error into the caller-facing taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Link(_) => ErrorKind::InvalidLink,
            Error::Browser(_) => ErrorKind::SessionUnavailable,
            Error::Navigation(NavigationError::Timeout(_)) => ErrorKind::NavigationTimeout,
            Error::Navigation(NavigationError::LoadFailed(_)) => ErrorKind::UpstreamUnavailable,
            Error::Navigation(NavigationError::InvalidUrl(_)) => ErrorKind::InvalidLink,
            Error::Extraction(_) => ErrorKind::ExtractionMiss,
            Error::Finalize(_) => ErrorKind::UpstreamUnavailable,
            Error::Cdp(_) | Error::Generic(_) => ErrorKind::Internal,
        }
    }

    /// Human-readable detail safe to hand to callers
    fn public_detail(&self) -> String {
        match self {
            Error::Link(e) => e.to_string(),
            Error::Browser(BrowserError::PoolClosed) => "resolver is shutting down".to_string(),
            Error::Browser(BrowserError::PoolExhausted(ms)) => {
                format!("all browser slots busy for {}ms", ms)
            }
            Error::Browser(_) => "browser engine could not be provisioned".to_string(),
            Error::Navigation(NavigationError::Timeout(ms)) => {
                format!("page did not settle within {}ms", ms)
            }
            Error::Navigation(NavigationError::LoadFailed(_)) => {
                "video page could not be loaded".to_string()
            }
            Error::Navigation(e) => e.to_string(),
            Error::Extraction(ExtractionError::Miss(tried)) => {
                format!("no media URL found on page (tried: {})", tried)
            }
            Error::Extraction(ExtractionError::UnusableValue(_)) => {
                "page exposed an unusable media reference".to_string()
            }
            Error::Finalize(FinalizeError::BadStatus { status, .. }) => {
                format!("media URL answered HTTP {}", status)
            }
            Error::Finalize(FinalizeError::Timeout(ms)) => {
                format!("media URL did not answer within {}ms", ms)
            }
            Error::Finalize(FinalizeError::Unreachable(_)) => "media URL is unreachable".to_string(),
            Error::Cdp(_) | Error::Generic(_) => "internal error".to_string(),
        }
    }
}

/// Convert chromiumoxide errors
impl From<chromiumoxide::error::CdpError> for Error {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        Error::Cdp(err.to_string())
    }
}

/// The closed set of failure kinds exposed to callers of `resolve`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Client-supplied link unrecognized
    InvalidLink,
    /// Browser engine could not be provisioned
    SessionUnavailable,
    /// Page did not settle within the navigation budget
    NavigationTimeout,
    /// Page settled but no strategy found a media reference
    ExtractionMiss,
    /// The platform or the extracted media URL did not respond
    UpstreamUnavailable,
    /// Unanticipated defect
    Internal,
}

impl ErrorKind {
    /// All kinds, in declaration order
    pub const ALL: [ErrorKind; 6] = [
        ErrorKind::InvalidLink,
        ErrorKind::SessionUnavailable,
        ErrorKind::NavigationTimeout,
        ErrorKind::ExtractionMiss,
        ErrorKind::UpstreamUnavailable,
        ErrorKind::Internal,
    ];

    /// Stable snake_case name
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidLink => "invalid_link",
            ErrorKind::SessionUnavailable => "session_unavailable",
            ErrorKind::NavigationTimeout => "navigation_timeout",
            ErrorKind::ExtractionMiss => "extraction_miss",
            ErrorKind::UpstreamUnavailable => "upstream_unavailable",
            ErrorKind::Internal => "internal",
        }
    }

    /// Whether a caller may reasonably retry the same request later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::SessionUnavailable | ErrorKind::NavigationTimeout
        )
    }

    /// HTTP status used by the request-serving layer
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::InvalidLink => 400,
            ErrorKind::ExtractionMiss => 404,
            ErrorKind::UpstreamUnavailable => 502,
            ErrorKind::SessionUnavailable => 503,
            ErrorKind::NavigationTimeout => 504,
            ErrorKind::Internal => 500,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified failure returned by `Resolver::resolve`
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {detail}")]
pub struct ResolutionError {
    /// Failure kind
    pub kind: ErrorKind,
    /// Human-readable detail (never raw engine diagnostics)
    pub detail: String,
}

impl ResolutionError {
    /// Build a resolution error directly
    pub fn new<S: Into<String>>(kind: ErrorKind, detail: S) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

impl From<Error> for ResolutionError {
    fn from(err: Error) -> Self {
        Self {
            kind: err.kind(),
            detail: err.public_detail(),
        }
    }
}

impl From<LinkError> for ResolutionError {
    fn from(err: LinkError) -> Self {
        Error::from(err).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Browser(BrowserError::LaunchFailed("no chrome".to_string()));
        assert!(err.to_string().contains("Failed to launch browser"));
        assert!(err.to_string().contains("no chrome"));
    }

    #[test]
    fn test_classification_covers_every_stage() {
        let cases = [
            (Error::from(LinkError::Empty), ErrorKind::InvalidLink),
            (
                Error::from(BrowserError::LaunchFailed("x".into())),
                ErrorKind::SessionUnavailable,
            ),
            (
                Error::from(BrowserError::PoolExhausted(100)),
                ErrorKind::SessionUnavailable,
            ),
            (
                Error::from(NavigationError::Timeout(10)),
                ErrorKind::NavigationTimeout,
            ),
            (
                Error::from(NavigationError::LoadFailed("net::ERR".into())),
                ErrorKind::UpstreamUnavailable,
            ),
            (
                Error::from(ExtractionError::Miss("a, b".into())),
                ErrorKind::ExtractionMiss,
            ),
            (
                Error::from(FinalizeError::BadStatus {
                    status: 403,
                    url: "https://cdn/x".into(),
                }),
                ErrorKind::UpstreamUnavailable,
            ),
            (Error::cdp("websocket closed"), ErrorKind::Internal),
            (Error::generic("boom"), ErrorKind::Internal),
        ];

        for (err, kind) in cases {
            assert_eq!(err.kind(), kind, "{}", err);
        }
    }

    #[test]
    fn test_resolution_error_hides_engine_diagnostics() {
        let err = Error::Browser(BrowserError::LaunchFailed(
            "Could not find chrome at /usr/bin/chromium".to_string(),
        ));
        let resolved = ResolutionError::from(err);
        assert_eq!(resolved.kind, ErrorKind::SessionUnavailable);
        assert!(!resolved.detail.contains("/usr/bin"));

        let err = Error::cdp("ws: connection reset by peer");
        let resolved = ResolutionError::from(err);
        assert_eq!(resolved.detail, "internal error");
    }

    #[test]
    fn test_error_kind_serialization() {
        let json = serde_json::to_string(&ErrorKind::NavigationTimeout).unwrap();
        assert_eq!(json, "\"navigation_timeout\"");
        for kind in ErrorKind::ALL {
            assert_eq!(
                serde_json::to_string(&kind).unwrap(),
                format!("\"{}\"", kind.as_str())
            );
        }
    }

    #[test]
    fn test_retry_guidance() {
        assert!(ErrorKind::NavigationTimeout.is_retryable());
        assert!(ErrorKind::SessionUnavailable.is_retryable());
        assert!(!ErrorKind::InvalidLink.is_retryable());
        assert!(!ErrorKind::ExtractionMiss.is_retryable());
        assert_eq!(ErrorKind::InvalidLink.http_status(), 400);
        assert_eq!(ErrorKind::NavigationTimeout.http_status(), 504);
    }
}

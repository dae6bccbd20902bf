//! Link shape recognition
//!
//! Recognized shapes:
//!
//! | shape          | example                                              |
//! |----------------|------------------------------------------------------|
//! | full desktop   | `https://www.tiktok.com/@alice/video/1234567890`     |
//! | legacy mobile  | `https://m.tiktok.com/v/1234567890.html`             |
//! | short redirect | `https://vm.tiktok.com/ZMabcdEFG/`, `vt.`, `www/t/`  |

use super::{CanonicalVideoRef, NormalizedLink, CANONICAL_HOST};
use crate::error::LinkError;
use percent_encoding::percent_decode_str;
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, instrument};
use url::Url;

/// Percent-decoding passes applied before matching
const MAX_DECODE_PASSES: usize = 3;

/// Hosts that only ever serve short redirect links
const SHORT_HOSTS: &[&str] = &["vm.tiktok.com", "vt.tiktok.com"];

fn url_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)(?:https?://)?[a-z0-9][a-z0-9.-]*\.[a-z]{2,}(?::\d+)?(?:/[^\s"'<>]*)?"#)
            .expect("url token regex")
    })
}

fn full_path() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^/@([^/]*)/video/(\d+)(?:/|$)").expect("full path regex"))
}

fn legacy_path() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^/v/(\d+)(?:\.html)?(?:/|$)").expect("legacy path regex"))
}

fn short_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^/(?:t/)?([A-Za-z0-9_-]+)/?$").expect("short token regex"))
}

/// Share link normalization
pub struct LinkNormalizer;

impl LinkNormalizer {
    /// Normalize a raw share link
    ///
    /// Short redirect links come back as [`NormalizedLink::ShortLink`] with
    /// tracking parameters removed; everything else is canonicalized.
    #[instrument]
    pub fn normalize(raw: &str) -> Result<NormalizedLink, LinkError> {
        let decoded = Self::decode(raw);
        let decoded = decoded.trim();
        if decoded.is_empty() {
            return Err(LinkError::Empty);
        }

        let url = Self::locate_url(decoded)?;
        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
        let path = url.path();

        let normalized = if SHORT_HOSTS.contains(&host.as_str()) {
            let caps = short_token()
                .captures(path)
                .filter(|_| !path.starts_with("/t/"))
                .ok_or_else(|| LinkError::Unrecognized(Self::excerpt(decoded)))?;
            NormalizedLink::ShortLink(format!("https://{}/{}/", host, &caps[1]))
        } else if let Some(caps) = full_path().captures(path) {
            let handle = caps[1].to_string();
            NormalizedLink::Canonical(CanonicalVideoRef::new(&caps[2], Some(handle)))
        } else if let Some(caps) = legacy_path().captures(path) {
            NormalizedLink::Canonical(CanonicalVideoRef::new(&caps[1], None))
        } else if path.starts_with("/t/") {
            let caps = short_token()
                .captures(path)
                .ok_or_else(|| LinkError::Unrecognized(Self::excerpt(decoded)))?;
            NormalizedLink::ShortLink(format!("https://{}/t/{}/", CANONICAL_HOST, &caps[1]))
        } else {
            return Err(LinkError::Unrecognized(Self::excerpt(decoded)));
        };

        debug!("Normalized {} -> {}", raw, normalized.url());
        Ok(normalized)
    }

    /// Re-run canonicalization on the URL a short link redirected to
    pub fn reparse(final_url: &str) -> Result<CanonicalVideoRef, LinkError> {
        match Self::normalize(final_url) {
            Ok(NormalizedLink::Canonical(video)) => Ok(video),
            Ok(NormalizedLink::ShortLink(_)) | Err(_) => {
                Err(LinkError::RedirectTarget(Self::excerpt(final_url)))
            }
        }
    }

    /// Whether a host belongs to the platform
    pub fn is_platform_host(host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        host == "tiktok.com" || host.ends_with(".tiktok.com")
    }

    fn decode(raw: &str) -> String {
        let mut current = raw.to_string();
        for _ in 0..MAX_DECODE_PASSES {
            let next = percent_decode_str(&current).decode_utf8_lossy().into_owned();
            if next == current {
                break;
            }
            current = next;
        }
        current
    }

    /// Pick the platform URL out of the input, tolerating share text
    fn locate_url(input: &str) -> Result<Url, LinkError> {
        let mut foreign_host = None;

        for token in url_token().find_iter(input) {
            let token = token.as_str().trim_end_matches(['.', ',', ')', '!']);
            let candidate = if token.contains("://") {
                token.to_string()
            } else {
                format!("https://{}", token)
            };
            let Ok(url) = Url::parse(&candidate) else {
                continue;
            };
            if !matches!(url.scheme(), "http" | "https") {
                continue;
            }
            match url.host_str() {
                Some(host) if Self::is_platform_host(host) => return Ok(url),
                Some(host) if foreign_host.is_none() => foreign_host = Some(host.to_string()),
                _ => {}
            }
        }

        Err(match foreign_host {
            Some(host) => LinkError::UnsupportedHost(host),
            None => LinkError::Unrecognized(Self::excerpt(input)),
        })
    }

    fn excerpt(input: &str) -> String {
        const MAX: usize = 120;
        if input.chars().count() <= MAX {
            input.to_string()
        } else {
            let cut: String = input.chars().take(MAX).collect();
            format!("{}...", cut)
        }
    }
}

//! Share link normalization
//!
//! This module turns whatever a user pasted (full desktop links, legacy
//! mobile links, short redirect links, percent-encoded or wrapped in share
//! text) into a [`CanonicalVideoRef`], or into an unresolved short link that
//! still needs a redirect to be followed.

pub mod normalize;
pub mod redirect;

pub use normalize::LinkNormalizer;
pub use redirect::{RedirectFollower, RedirectOptions};

use serde::{Deserialize, Serialize};

/// Canonical host every video reference is rewritten to
pub const CANONICAL_HOST: &str = "www.tiktok.com";

/// Normalized identity of one video
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanonicalVideoRef {
    /// Numeric video id (non-empty, digits only)
    pub video_id: String,
    /// Author handle without the leading `@`, when the link carried one
    pub author_handle: Option<String>,
    /// Absolute URL on the canonical host
    pub canonical_url: String,
}

impl CanonicalVideoRef {
    /// Build a reference, deriving the canonical URL from the parts
    pub fn new(video_id: impl Into<String>, author_handle: Option<String>) -> Self {
        let video_id = video_id.into();
        let author_handle = author_handle.filter(|h| !h.is_empty());
        let canonical_url = format!(
            "https://{}/@{}/video/{}",
            CANONICAL_HOST,
            author_handle.as_deref().unwrap_or(""),
            video_id
        );
        Self {
            video_id,
            author_handle,
            canonical_url,
        }
    }
}

/// Outcome of normalizing a share link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedLink {
    /// The link identified a video directly
    Canonical(CanonicalVideoRef),
    /// A short redirect link; the canonical form is only known after
    /// following it
    ShortLink(String),
}

impl NormalizedLink {
    /// URL to hand to the next stage
    pub fn url(&self) -> &str {
        match self {
            NormalizedLink::Canonical(r) => &r.canonical_url,
            NormalizedLink::ShortLink(url) => url,
        }
    }

    /// Whether a redirect still has to be followed
    pub fn is_short(&self) -> bool {
        matches!(self, NormalizedLink::ShortLink(_))
    }
}

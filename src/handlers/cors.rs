//! CORS policy for the HTTP adapter
//!
//! By default only localhost origins may call the API from a browser. The
//! permissive layer is for deployments that sit behind their own gateway.

use http::{header::HeaderValue, Method};
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

/// Methods the API answers
pub const ALLOWED_METHODS: [Method; 2] = [Method::GET, Method::OPTIONS];

/// Default max age for preflight cache (1 hour)
pub const DEFAULT_MAX_AGE_SECS: u64 = 3600;

/// Localhost-only CORS layer
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(|origin, _| {
            is_localhost_origin(origin)
        }))
        .allow_methods(ALLOWED_METHODS)
        .allow_headers([http::header::CONTENT_TYPE])
        .max_age(Duration::from_secs(DEFAULT_MAX_AGE_SECS))
}

/// CORS layer that allows any origin
pub fn cors_layer_permissive() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(ALLOWED_METHODS)
        .allow_headers(Any)
        .max_age(Duration::from_secs(DEFAULT_MAX_AGE_SECS))
}

/// Whether `origin` is `http(s)://localhost`, `127.0.0.1` or `[::1]` on any port
pub fn is_localhost_origin(origin: &HeaderValue) -> bool {
    let Ok(origin) = origin.to_str() else {
        return false;
    };
    let Ok(url) = url::Url::parse(origin) else {
        return false;
    };
    if !matches!(url.scheme(), "http" | "https") || url.path() != "/" {
        return false;
    }
    matches!(
        url.host_str(),
        Some("localhost") | Some("127.0.0.1") | Some("[::1]")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_localhost_origins() {
        for origin in [
            "http://localhost",
            "http://localhost:3000",
            "https://127.0.0.1:8443",
            "http://[::1]:9000",
        ] {
            assert!(
                is_localhost_origin(&HeaderValue::from_static(origin)),
                "{}",
                origin
            );
        }
    }

    #[test]
    fn test_external_origins() {
        for origin in [
            "http://example.com",
            "http://localhost.evil.com",
            "http://127.0.0.1.nip.io",
            "file://localhost",
            "null",
        ] {
            assert!(
                !is_localhost_origin(&HeaderValue::from_static(origin)),
                "{}",
                origin
            );
        }
    }
}

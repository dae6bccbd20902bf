//! End-to-end resolution tests over a scripted engine

mod common;

use clipresolve::{DeviceProfile, ErrorKind, Resolver, ResolverConfig};
use common::{BrokenLauncher, FakeLauncher, Script};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const FULL_LINK: &str = "https://www.tiktok.com/@alice/video/1234567890123456789?foo=bar";

fn config() -> ResolverConfig {
    ResolverConfig::builder()
        .navigation_timeout_ms(2000)
        .idle_timeout_ms(200)
        .selector_wait_ms(50)
        .follow_redirects(false)
        .build()
}

#[tokio::test]
async fn test_resolves_video_element() {
    let launcher = FakeLauncher::new(Script::video_src("//cdnhost/media.mp4"));
    let resolver = Resolver::with_launcher(config(), launcher.shared()).unwrap();

    let result = resolver.resolve(FULL_LINK, None).await.unwrap();

    assert_eq!(result.absolute_url, "https://cdnhost/media.mp4");
    assert_eq!(result.source_strategy, "video-element");
    assert_eq!(result.video.video_id, "1234567890123456789");
    assert_eq!(
        result.video.canonical_url,
        "https://www.tiktok.com/@alice/video/1234567890123456789"
    );
    assert_eq!(result.download_url(), "https://cdnhost/media.mp4?download=1");

    let stats = resolver.stats().await;
    assert_eq!(stats.contexts_in_use, 0);
    assert_eq!(launcher.counters.page_closes(), 1);
    resolver.shutdown().await;
}

#[tokio::test]
async fn test_falls_back_to_hydration_state() {
    let launcher = FakeLauncher::new(Script {
        video: json!("blob:https://www.tiktok.com/4f1d"),
        state: json!({
            "sigi": r#"{"ItemModule":{"1234567890123456789":{"video":{"downloadAddr":"https://v16.tiktokcdn.com/dl.mp4"}}}}"#,
            "universal": null
        }),
        ..Script::default()
    });
    let resolver = Resolver::with_launcher(config(), launcher.shared()).unwrap();

    let result = resolver
        .resolve(FULL_LINK, Some(DeviceProfile::Mobile))
        .await
        .unwrap();

    assert_eq!(result.absolute_url, "https://v16.tiktokcdn.com/dl.mp4");
    assert_eq!(result.source_strategy, "hydration-state");
    resolver.shutdown().await;
}

#[tokio::test]
async fn test_falls_back_to_og_meta() {
    let launcher = FakeLauncher::new(Script {
        og_video: json!("https://v19.tiktokcdn.com/og.mp4"),
        ..Script::default()
    });
    let resolver = Resolver::with_launcher(config(), launcher.shared()).unwrap();

    let result = resolver.resolve(FULL_LINK, None).await.unwrap();
    assert_eq!(result.source_strategy, "og-video-meta");
    resolver.shutdown().await;
}

#[tokio::test]
async fn test_every_strategy_missing_is_extraction_miss() {
    let launcher = FakeLauncher::new(Script::default());
    let resolver = Resolver::with_launcher(config(), launcher.shared()).unwrap();

    let err = resolver.resolve(FULL_LINK, None).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ExtractionMiss);
    assert!(err.detail.contains("video-element"));
    assert!(err.detail.contains("og-video-meta"));
    assert_eq!(resolver.stats().await.contexts_in_use, 0);
    resolver.shutdown().await;
}

#[tokio::test]
async fn test_navigation_timeout_releases_context() {
    let launcher = FakeLauncher::new(Script {
        goto_delay: Duration::from_secs(5),
        ..Script::video_src("https://cdn/x.mp4")
    });
    let config = ResolverConfig::builder()
        .navigation_timeout_ms(100)
        .idle_timeout_ms(50)
        .follow_redirects(false)
        .build();
    let resolver = Resolver::with_launcher(config, launcher.shared()).unwrap();

    let err = resolver.resolve(FULL_LINK, None).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::NavigationTimeout);
    assert!(err.kind.is_retryable());
    let stats = resolver.stats().await;
    assert_eq!(stats.contexts_in_use, 0);
    assert_eq!(stats.contexts_opened, stats.contexts_released);
    assert_eq!(launcher.counters.open_pages(), 0);
    resolver.shutdown().await;
}

#[tokio::test]
async fn test_load_failure_is_upstream_unavailable() {
    let launcher = FakeLauncher::new(Script {
        goto_error: Some("net::ERR_CONNECTION_RESET".to_string()),
        ..Script::default()
    });
    let resolver = Resolver::with_launcher(config(), launcher.shared()).unwrap();

    let err = resolver.resolve(FULL_LINK, None).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::UpstreamUnavailable);
    assert!(!err.detail.contains("ERR_CONNECTION_RESET"));
    assert_eq!(launcher.counters.open_pages(), 0);
    resolver.shutdown().await;
}

#[tokio::test]
async fn test_engine_deadline_on_load_is_navigation_timeout() {
    let launcher = FakeLauncher::new(Script {
        goto_timeout: true,
        ..Script::video_src("https://cdn/x.mp4")
    });
    let resolver = Resolver::with_launcher(config(), launcher.shared()).unwrap();

    let err = resolver.resolve(FULL_LINK, None).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::NavigationTimeout);
    assert!(err.kind.is_retryable());
    assert_eq!(resolver.stats().await.contexts_in_use, 0);
    assert_eq!(launcher.counters.open_pages(), 0);
    resolver.shutdown().await;
}

#[tokio::test]
async fn test_engine_command_failure_is_internal() {
    let launcher = FakeLauncher::new(Script {
        url_error: Some("websocket closed".to_string()),
        ..Script::video_src("https://cdn/x.mp4")
    });
    let resolver = Resolver::with_launcher(config(), launcher.shared()).unwrap();

    let err = resolver.resolve(FULL_LINK, None).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::Internal);
    assert_eq!(err.detail, "internal error");
    assert_eq!(launcher.counters.open_pages(), 0);
    resolver.shutdown().await;
}

#[tokio::test]
async fn test_short_link_navigated_in_browser_is_reparsed() {
    let launcher = FakeLauncher::new(Script {
        final_url: Some(
            "https://www.tiktok.com/@bob/video/7301234567890123456?_r=1&_t=8kZ".to_string(),
        ),
        ..Script::video_src("https://cdn/short.mp4")
    });
    let resolver = Resolver::with_launcher(config(), launcher.shared()).unwrap();

    let result = resolver
        .resolve("https://vm.tiktok.com/ZMabcdEFG/", None)
        .await
        .unwrap();

    assert_eq!(result.video.video_id, "7301234567890123456");
    assert_eq!(result.video.author_handle.as_deref(), Some("bob"));
    assert_eq!(
        result.video.canonical_url,
        "https://www.tiktok.com/@bob/video/7301234567890123456"
    );
    resolver.shutdown().await;
}

#[tokio::test]
async fn test_short_link_to_non_video_page_is_invalid() {
    let launcher = FakeLauncher::new(Script {
        final_url: Some("https://www.tiktok.com/foryou".to_string()),
        ..Script::video_src("https://cdn/short.mp4")
    });
    let resolver = Resolver::with_launcher(config(), launcher.shared()).unwrap();

    let err = resolver
        .resolve("https://vm.tiktok.com/ZMabcdEFG/", None)
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::InvalidLink);
    assert_eq!(launcher.counters.open_pages(), 0);
    resolver.shutdown().await;
}

#[tokio::test]
async fn test_invalid_link_never_touches_the_browser() {
    let launcher = FakeLauncher::new(Script::default());
    let resolver = Resolver::with_launcher(config(), launcher.shared()).unwrap();

    for link in ["", "hello world", "https://example.com/@alice/video/123"] {
        let err = resolver.resolve(link, None).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidLink, "{:?}", link);
    }
    assert_eq!(launcher.counters.launches(), 0);
    resolver.shutdown().await;
}

#[tokio::test]
async fn test_engine_launch_failure_is_session_unavailable() {
    let resolver = Resolver::with_launcher(config(), Arc::new(BrokenLauncher)).unwrap();

    let err = resolver.resolve(FULL_LINK, None).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::SessionUnavailable);
    assert!(!err.detail.contains("chrome not found"));
    resolver.shutdown().await;
}

#[tokio::test]
async fn test_resolve_after_shutdown_is_session_unavailable() {
    let launcher = FakeLauncher::new(Script::video_src("https://cdn/x.mp4"));
    let resolver = Resolver::with_launcher(config(), launcher.shared()).unwrap();
    resolver.shutdown().await;

    let err = resolver.resolve(FULL_LINK, None).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::SessionUnavailable);
}

#[tokio::test]
async fn test_dropped_resolution_still_releases_context() {
    let launcher = FakeLauncher::new(Script {
        goto_delay: Duration::from_millis(200),
        ..Script::video_src("https://cdn/x.mp4")
    });
    let resolver = Resolver::with_launcher(config(), launcher.shared()).unwrap();

    let pending = resolver.resolve(FULL_LINK, None);
    let _ = tokio::time::timeout(Duration::from_millis(50), pending).await;

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(launcher.counters.open_pages(), 0);
    assert_eq!(resolver.stats().await.contexts_in_use, 0);
    resolver.shutdown().await;
}

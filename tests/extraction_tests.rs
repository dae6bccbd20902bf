//! Extraction chain tests

mod common;

use async_trait::async_trait;
use clipresolve::browser::{DeviceProfile, EngineLauncher, PageDriver};
use clipresolve::extraction::{
    ExtractionChain, ExtractionOptions, ExtractionOutcome, ExtractionStrategy,
    HydrationStateStrategy, OgVideoStrategy, VideoElementStrategy,
};
use common::{FakeLauncher, Script};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const NAMES: [&str; 6] = ["s0", "s1", "s2", "s3", "s4", "s5"];

struct Fixed {
    name: &'static str,
    outcome: ExtractionOutcome,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ExtractionStrategy for Fixed {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn inspect(&self, _page: &dyn PageDriver) -> ExtractionOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}

struct Stalled;

#[async_trait]
impl ExtractionStrategy for Stalled {
    fn name(&self) -> &'static str {
        "stalled"
    }

    async fn inspect(&self, _page: &dyn PageDriver) -> ExtractionOutcome {
        tokio::time::sleep(Duration::from_secs(10)).await;
        ExtractionOutcome::Hit("https://never".to_string())
    }
}

async fn page(script: Script) -> Box<dyn PageDriver> {
    let launcher = FakeLauncher::new(script);
    let session = launcher.launch().await.unwrap();
    session.open_context(DeviceProfile::Desktop).await.unwrap()
}

#[tokio::test]
async fn test_single_hit_wins_regardless_of_position() {
    let page = page(Script::default()).await;

    for len in 1..=NAMES.len() {
        for hit_at in 0..len {
            let calls = Arc::new(AtomicUsize::new(0));
            let strategies: Vec<Box<dyn ExtractionStrategy>> = (0..len)
                .map(|i| {
                    let outcome = if i == hit_at {
                        ExtractionOutcome::Hit(format!("https://cdn/{}.mp4", i))
                    } else if i % 2 == 0 {
                        ExtractionOutcome::Miss
                    } else {
                        ExtractionOutcome::Error("script threw".to_string())
                    };
                    Box::new(Fixed {
                        name: NAMES[i],
                        outcome,
                        calls: Arc::clone(&calls),
                    }) as Box<dyn ExtractionStrategy>
                })
                .collect();

            let chain = ExtractionChain::new(strategies, &ExtractionOptions::default());
            let report = chain.extract(page.as_ref()).await;

            let expected = format!("https://cdn/{}.mp4", hit_at);
            assert_eq!(report.hit(), Some((NAMES[hit_at], expected.as_str())));
            assert_eq!(calls.load(Ordering::SeqCst), hit_at + 1);
            assert_eq!(report.tried(), NAMES[..=hit_at].to_vec());
        }
    }
}

#[tokio::test]
async fn test_all_misses_is_extraction_miss() {
    let page = page(Script::default()).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let strategies: Vec<Box<dyn ExtractionStrategy>> = vec![
        Box::new(Fixed {
            name: "s0",
            outcome: ExtractionOutcome::Miss,
            calls: Arc::clone(&calls),
        }),
        Box::new(Fixed {
            name: "s1",
            outcome: ExtractionOutcome::Error("boom".to_string()),
            calls: Arc::clone(&calls),
        }),
    ];

    let chain = ExtractionChain::new(strategies, &ExtractionOptions::default());
    let report = chain.extract(page.as_ref()).await;

    assert_eq!(report.hit(), None);
    assert_eq!(report.to_string(), "s0: miss; s1: error (boom)");
    assert!(report.into_hit().is_err());
}

#[tokio::test]
async fn test_stalled_strategy_is_cut_off() {
    let page = page(Script::default()).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let strategies: Vec<Box<dyn ExtractionStrategy>> = vec![
        Box::new(Stalled),
        Box::new(Fixed {
            name: "s1",
            outcome: ExtractionOutcome::Hit("https://cdn/ok.mp4".to_string()),
            calls,
        }),
    ];
    let opts = ExtractionOptions {
        strategy_timeout_ms: 50,
        ..ExtractionOptions::default()
    };

    let chain = ExtractionChain::new(strategies, &opts);
    let report = chain.extract(page.as_ref()).await;

    assert!(matches!(
        report.attempts[0].outcome,
        ExtractionOutcome::Error(_)
    ));
    assert_eq!(report.hit(), Some(("s1", "https://cdn/ok.mp4")));
}

#[tokio::test]
async fn test_video_element_ignores_blob_urls() {
    let page = page(Script::video_src("blob:https://www.tiktok.com/9a8b")).await;
    let outcome = VideoElementStrategy::new(10).inspect(page.as_ref()).await;
    assert_eq!(outcome, ExtractionOutcome::Miss);
}

#[tokio::test]
async fn test_hydration_state_reads_universal_blob() {
    let universal = json!({
        "__DEFAULT_SCOPE__": {
            "webapp.video-detail": {
                "itemInfo": {
                    "itemStruct": {
                        "video": { "playAddr": "https://v19.tiktokcdn.com/u.mp4" }
                    }
                }
            }
        }
    });
    let page = page(Script {
        state: json!({ "sigi": null, "universal": universal.to_string() }),
        ..Script::default()
    })
    .await;

    let outcome = HydrationStateStrategy.inspect(page.as_ref()).await;
    assert_eq!(
        outcome,
        ExtractionOutcome::Hit("https://v19.tiktokcdn.com/u.mp4".to_string())
    );
}

#[tokio::test]
async fn test_hydration_state_picks_the_item_of_the_page_url() {
    let sigi = r#"{"ItemModule":{
        "7000000000000000001":{"video":{"playAddr":"https://cdn/related.mp4"}},
        "7301234567890123456":{"video":{"playAddr":"https://cdn/watched.mp4"}}
    }}"#;
    let page = page(Script {
        state: json!({
            "href": "https://www.tiktok.com/@alice/video/7301234567890123456?lang=en",
            "sigi": sigi,
            "universal": null
        }),
        ..Script::default()
    })
    .await;

    let outcome = HydrationStateStrategy.inspect(page.as_ref()).await;
    assert_eq!(
        outcome,
        ExtractionOutcome::Hit("https://cdn/watched.mp4".to_string())
    );
}

#[tokio::test]
async fn test_hydration_state_without_url_match_takes_first_item() {
    let sigi = r#"{"ItemModule":{
        "7301234567890123456":{"video":{"playAddr":"https://cdn/first.mp4"}},
        "6999999999999999999":{"video":{"playAddr":"https://cdn/second.mp4"}}
    }}"#;
    let page = page(Script {
        state: json!({ "href": "https://www.tiktok.com/foryou", "sigi": sigi, "universal": null }),
        ..Script::default()
    })
    .await;

    let outcome = HydrationStateStrategy.inspect(page.as_ref()).await;
    assert_eq!(
        outcome,
        ExtractionOutcome::Hit("https://cdn/first.mp4".to_string())
    );
}

#[tokio::test]
async fn test_hydration_state_with_broken_json_is_an_error() {
    let page = page(Script {
        state: json!({ "sigi": "{not json", "universal": null }),
        ..Script::default()
    })
    .await;

    let outcome = HydrationStateStrategy.inspect(page.as_ref()).await;
    assert!(matches!(outcome, ExtractionOutcome::Error(_)));
}

#[tokio::test]
async fn test_hydration_state_absent_is_a_miss() {
    let page = page(Script {
        state: json!({ "sigi": null, "universal": null }),
        ..Script::default()
    })
    .await;

    let outcome = HydrationStateStrategy.inspect(page.as_ref()).await;
    assert_eq!(outcome, ExtractionOutcome::Miss);
}

#[tokio::test]
async fn test_og_video_meta() {
    let page = page(Script {
        og_video: json!("https://v16.tiktokcdn.com/og.mp4"),
        ..Script::default()
    })
    .await;

    let outcome = OgVideoStrategy.inspect(page.as_ref()).await;
    assert_eq!(
        outcome,
        ExtractionOutcome::Hit("https://v16.tiktokcdn.com/og.mp4".to_string())
    );
}

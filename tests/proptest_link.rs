//! Property-based tests for share link normalization

use clipresolve::error::ErrorKind;
use clipresolve::{LinkNormalizer, NormalizedLink, ResolutionError};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use proptest::prelude::*;

fn video_id() -> impl Strategy<Value = String> {
    "[1-9][0-9]{0,18}"
}

fn handle() -> impl Strategy<Value = String> {
    "[a-z0-9_]{1,20}"
}

fn query() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z]{1,8}=[a-z0-9]{0,8}", 0..4).prop_map(|pairs| {
        if pairs.is_empty() {
            String::new()
        } else {
            format!("?{}", pairs.join("&"))
        }
    })
}

fn canonical_id(raw: &str) -> Option<String> {
    match LinkNormalizer::normalize(raw) {
        Ok(NormalizedLink::Canonical(video)) => Some(video.video_id),
        _ => None,
    }
}

proptest! {
    #[test]
    fn full_links_keep_id_and_drop_query(
        id in video_id(),
        handle in handle(),
        query in query(),
    ) {
        let raw = format!("https://www.tiktok.com/@{}/video/{}{}", handle, id, query);
        match LinkNormalizer::normalize(&raw) {
            Ok(NormalizedLink::Canonical(video)) => {
                prop_assert_eq!(&video.video_id, &id);
                prop_assert_eq!(video.author_handle.as_deref(), Some(handle.as_str()));
                prop_assert_eq!(
                    video.canonical_url,
                    format!("https://www.tiktok.com/@{}/video/{}", handle, id)
                );
            }
            other => prop_assert!(false, "unexpected {:?}", other),
        }
    }

    #[test]
    fn id_survives_every_link_shape(
        id in video_id(),
        handle in handle(),
        query in query(),
    ) {
        let full = format!("https://www.tiktok.com/@{}/video/{}{}", handle, id, query);
        let shapes = vec![
            full.clone(),
            format!("https://m.tiktok.com/v/{}.html{}", id, query),
            format!("Check this out! {} #fyp", full),
            utf8_percent_encode(&full, NON_ALPHANUMERIC).to_string(),
        ];

        for shape in shapes {
            prop_assert_eq!(canonical_id(&shape), Some(id.clone()), "shape {}", shape);
        }
    }

    #[test]
    fn text_without_links_is_invalid(text in "[a-zA-Z !?#@]{0,60}") {
        let err = LinkNormalizer::normalize(&text).unwrap_err();
        prop_assert_eq!(ResolutionError::from(err).kind, ErrorKind::InvalidLink);
    }

    #[test]
    fn foreign_hosts_are_rejected(
        id in video_id(),
        host in "[a-z]{3,10}\\.(com|net|org)",
    ) {
        prop_assume!(host != "tiktok.com");
        let raw = format!("https://{}/@alice/video/{}", host, id);
        let err = LinkNormalizer::normalize(&raw).unwrap_err();
        prop_assert_eq!(ResolutionError::from(err).kind, ErrorKind::InvalidLink);
    }
}

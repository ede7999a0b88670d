//! Property-based tests for the filter engine and payload codec.
//!
//! Checks the forwarding rules that must hold for any event and settings
//! combination, and that encoding loses none of the event fields.

#![allow(clippy::unwrap_used)]

use std::collections::BTreeSet;

use proptest::{prelude::*, test_runner::Config as ProptestConfig};
use relay_core::{
    codec,
    filter::{FilterEngine, DEFAULT_TRIGGER},
    FilterConfig, RawEvent,
};

fn proptest_config() -> ProptestConfig {
    ProptestConfig {
        cases: 128,
        fork: false,
        failure_persistence: None,
        source_file: None,
        ..ProptestConfig::default()
    }
}

fn source_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z]{2,8}(\\.[a-z_]{2,10}){1,2}").unwrap()
}

fn optional_text_strategy() -> impl Strategy<Value = Option<String>> {
    prop::option::of(any::<String>())
}

fn raw_event_strategy() -> impl Strategy<Value = RawEvent> {
    (source_id_strategy(), optional_text_strategy(), optional_text_strategy(), any::<i64>())
        .prop_map(|(source_id, title, body, observed_at_millis)| RawEvent {
            source_id,
            title,
            body,
            observed_at_millis,
        })
}

fn filter_config_strategy() -> impl Strategy<Value = FilterConfig> {
    (
        any::<bool>(),
        prop::collection::btree_set(source_id_strategy(), 0..4),
        prop::sample::select(vec!["", "https://example.test/hook"]),
        "[a-zA-Z0-9]{0,16}",
    )
        .prop_map(|(enabled, allowed_source_ids, url, secret)| FilterConfig {
            enabled,
            allowed_source_ids,
            destination_url: url.to_string(),
            shared_secret: secret,
        })
}

/// Body that is guaranteed to contain the default trigger.
fn triggering_body_strategy() -> impl Strategy<Value = String> {
    (any::<String>(), any::<String>())
        .prop_map(|(prefix, suffix)| format!("{prefix}{DEFAULT_TRIGGER}{suffix}"))
}

proptest! {
    #![proptest_config(proptest_config())]

    #[test]
    fn disabled_config_never_forwards(
        event in raw_event_strategy(),
        config in filter_config_strategy(),
    ) {
        let config = FilterConfig { enabled: false, ..config };
        prop_assert!(!FilterEngine::default().should_forward(&event, &config));
    }

    #[test]
    fn sources_outside_allow_list_never_forward(
        event in raw_event_strategy(),
        config in filter_config_strategy(),
        other in source_id_strategy(),
    ) {
        let mut config = config;
        config.allowed_source_ids.remove(&event.source_id);
        if config.allowed_source_ids.is_empty() {
            prop_assume!(other != event.source_id);
            config.allowed_source_ids.insert(other);
        }

        prop_assert!(!FilterEngine::default().should_forward(&event, &config));
    }

    #[test]
    fn trigger_present_and_admitted_forwards(
        source_id in source_id_strategy(),
        title in optional_text_strategy(),
        body in triggering_body_strategy(),
        restrict in any::<bool>(),
    ) {
        let mut config = FilterConfig::default();
        if restrict {
            config.allowed_source_ids = BTreeSet::from([source_id.clone()]);
        }
        let event = RawEvent { source_id, title, body: Some(body), observed_at_millis: 0 };

        prop_assert!(FilterEngine::default().should_forward(&event, &config));
    }

    #[test]
    fn trigger_absent_drops(event in raw_event_strategy()) {
        prop_assume!(!event.body_or_empty().contains(DEFAULT_TRIGGER));
        prop_assert!(!FilterEngine::default().should_forward(&event, &FilterConfig::default()));
    }

    #[test]
    fn codec_preserves_event_fields(event in raw_event_strategy()) {
        let payload = codec::decode(&codec::encode(&event)).unwrap();

        prop_assert_eq!(payload.package, event.source_id.clone());
        prop_assert_eq!(payload.title.as_str(), event.title_or_empty());
        prop_assert_eq!(payload.text.as_str(), event.body_or_empty());
        prop_assert_eq!(payload.posted_at, event.observed_at_millis);
    }
}

//! Property-based tests for intent routing

use super::*;
use proptest::prelude::*;

fn arb_keyword() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("book"),
        Just("shoot"),
        Just("schedule"),
        Just("cancel"),
        Just("change"),
        Just("available"),
        Just("stats"),
        Just("client"),
        Just("invoice"),
        Just("hello"),
        Just("gallery"),
        Just("discount"),
        Just("start over"),
    ]
}

fn arb_message() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z #$%0-9,.!?]{0,60}",
        prop::collection::vec(arb_keyword(), 0..5).prop_map(|words| words.join(" ")),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    #[test]
    fn prop_classify_is_deterministic(message in arb_message()) {
        prop_assert_eq!(classify(&message), classify(&message));
        prop_assert_eq!(resolve(&message, None), resolve(&message, None));
    }

    #[test]
    fn prop_classify_ignores_case_and_padding(message in arb_message()) {
        let shouted = format!("  {}  ", message.to_uppercase());
        prop_assert_eq!(classify(&shouted), classify(&message));
    }

    #[test]
    fn prop_book_and_shoot_always_books(prefix in "[a-z ]{0,20}", suffix in "[a-z ]{0,20}") {
        let message = format!("{prefix} book {suffix} shoot");
        prop_assert_eq!(classify(&message), Intent::BookShoot);
    }

    #[test]
    fn prop_resolution_never_worse_than_classify(message in arb_message()) {
        // Only a chip or a `general` result can be overridden
        let primary = classify(&message);
        let resolved = resolve(&message, Some("book_shoot"));
        prop_assert!(
            resolved == primary || primary == Intent::General || route_chip(&message).is_some()
        );
    }
}

//! Property-based tests for the flow engine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::*;
use crate::flows::{
    fallback_reply, AccountingData, AccountingStep, BookShootData, BookShootStep, FlowRegistry,
    Period, SupportFaqData, SupportFaqStep,
};
use crate::intent::Intent;
use crate::studio::testing::demo_studio;
use chrono::NaiveDate;
use proptest::prelude::*;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_flow_intent() -> impl Strategy<Value = Intent> {
    prop::sample::select(
        Intent::ALL
            .into_iter()
            .filter(|i| !matches!(i, Intent::Greeting | Intent::General))
            .collect::<Vec<_>>(),
    )
}

fn arb_user() -> impl Strategy<Value = i64> {
    prop::sample::select(vec![1_i64, 2, 3, 4, 10, 11])
}

fn arb_phrase() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec![
        "yes",
        "no",
        "start over",
        "#101",
        "#102",
        "#103",
        "#999",
        "tomorrow",
        "next week",
        "2025-07-01",
        "morning",
        "golden hour",
        "photos and drone",
        "cancel",
        "reschedule",
        "change the date",
        "this quarter",
        "my stats",
        "Maria",
        "Jordan Lee",
        "15% off",
        "$40",
        "share gallery",
        "download",
        "block",
        "help",
        "speak to a human",
        "123 Main St",
        "another",
        "",
    ])
}

/// Chip-like phrases mixed with free text
fn arb_message() -> impl Strategy<Value = String> {
    prop_oneof![
        prop::collection::vec(arb_phrase(), 1..4).prop_map(|parts| parts.join(" ")),
        "[a-zA-Z0-9 #$%,.!?-]{0,40}",
    ]
}

fn arb_date() -> impl Strategy<Value = Option<NaiveDate>> {
    prop::option::of((0u32..365).prop_map(|offset| {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap() + chrono::Duration::days(i64::from(offset))
    }))
}

fn arb_book_shoot_state() -> impl Strategy<Value = FlowState> {
    (
        prop::sample::select(vec![
            BookShootStep::AskProperty,
            BookShootStep::AskDate,
            BookShootStep::AskTime,
            BookShootStep::AskServices,
            BookShootStep::Confirm,
        ]),
        prop::option::of("[a-zA-Z0-9 ,]{1,30}"),
        arb_date(),
        prop::option::of("[a-zA-Z ]{1,20}"),
        prop::collection::vec(1i64..5, 0..4),
    )
        .prop_map(|(step, property_label, date, date_label, service_ids)| {
            FlowState::BookShoot(Progress {
                step,
                data: BookShootData {
                    property_label,
                    date,
                    date_label,
                    service_ids,
                    ..BookShootData::default()
                },
            })
        })
}

fn arb_period() -> impl Strategy<Value = Period> {
    prop_oneof![
        Just(Period::ThisMonth),
        Just(Period::LastMonth),
        Just(Period::ThisQuarter),
        Just(Period::ThisYear),
        Just(Period::AllTime),
    ]
}

fn arb_accounting_state() -> impl Strategy<Value = FlowState> {
    (any::<bool>(), prop::option::of(arb_period())).prop_map(|(summary, period)| {
        let step = if summary {
            AccountingStep::ShowSummary
        } else {
            AccountingStep::AskPeriod
        };
        let mut data = AccountingData::default();
        if let Some(period) = period {
            data.select(period, crate::studio::testing::fixed_now());
        }
        FlowState::Accounting(Progress { step, data })
    })
}

fn arb_support_state() -> impl Strategy<Value = FlowState> {
    (
        prop::sample::select(vec![
            SupportFaqStep::AskQuestion,
            SupportFaqStep::Escalate,
            SupportFaqStep::CreateTicket,
        ]),
        prop::option::of("[a-zA-Z \"'{}]{0,30}"),
        prop::option::of("[a-zA-Z \n]{0,60}"),
    )
        .prop_map(|(step, subject, description)| {
            FlowState::SupportFaq(Progress {
                step,
                data: SupportFaqData {
                    reason: None,
                    subject,
                    description,
                },
            })
        })
}

fn arb_flow_state() -> impl Strategy<Value = FlowState> {
    prop_oneof![arb_book_shoot_state(), arb_accounting_state(), arb_support_state()]
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// Any conversation stays inside its flow and always says something
    #[test]
    fn prop_flows_always_reply(
        intent in arb_flow_intent(),
        user_id in arb_user(),
        messages in prop::collection::vec(arb_message(), 1..6),
    ) {
        let (studio, _) = demo_studio();
        let registry = FlowRegistry::standard();
        let handler = registry.get(intent).expect("registered");
        let context = ChatContext::default();
        let mut state = None;

        for message in &messages {
            let mut turn = Turn::new("prop-session", user_id, message, &context, &studio);
            let result = handler.handle(state.take(), &mut turn);
            prop_assert!(
                matches!(result, Ok(_) | Err(FlowError::Collaborator(_))),
                "unexpected error for {intent} on {message:?}: {result:?}"
            );
            if let Ok(outcome) = result {
                prop_assert!(outcome.reply.is_well_formed(), "{intent} on {message:?}");
                if let Some(next) = &outcome.state {
                    prop_assert_eq!(next.intent(), intent);
                }
                state = outcome.state;
            }
        }
    }

    #[test]
    fn prop_flow_state_serde_roundtrip(state in arb_flow_state()) {
        let json = serde_json::to_string(&state).unwrap();
        let back: FlowState = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(back, state);
    }

    /// Foreign state is ignored rather than misread
    #[test]
    fn prop_foreign_state_restarts_flow(state in arb_flow_state(), message in arb_message()) {
        let (studio, _) = demo_studio();
        let registry = FlowRegistry::standard();
        let handler = registry.get(Intent::ClientStats).expect("registered");
        let context = ChatContext::default();

        let mut with_foreign = Turn::new("prop-session", 1, &message, &context, &studio);
        let mut fresh = Turn::new("prop-session", 1, &message, &context, &studio);
        let a = handler.handle(Some(state), &mut with_foreign).unwrap();
        let b = handler.handle(None, &mut fresh).unwrap();
        prop_assert_eq!(a.state, b.state);
        prop_assert_eq!(a.reply, b.reply);
    }

    /// Property, date, time and services in one message land on confirm
    #[test]
    fn prop_one_shot_booking_reaches_confirm(
        slots in (
            prop::sample::select(vec!["tomorrow", "next week", "2025-07-01", "today"]),
            prop::sample::select(vec!["morning", "afternoon", "golden hour", "evening"]),
            prop::sample::select(vec!["photos", "video", "drone", "photos and drone", "full package"]),
        )
            .prop_flat_map(|(date, time, services)| Just(vec![date, time, services]).prop_shuffle()),
    ) {
        let (studio, _) = demo_studio();
        let registry = FlowRegistry::standard();
        let handler = registry.get(Intent::BookShoot).expect("registered");
        let context = ChatContext::default();
        let message = format!("book a shoot at 500 Congress Ave {}", slots.join(" "));

        let mut turn = Turn::new("prop-session", 1, &message, &context, &studio);
        let outcome = handler.handle(None, &mut turn).unwrap();
        prop_assert_eq!(outcome.state.as_ref().map(FlowState::step_name), Some("confirm"));
    }

    /// One slot per turn reaches confirm after exactly four answers
    #[test]
    fn prop_one_slot_per_turn_takes_four_turns(
        date in prop::sample::select(vec!["Tomorrow", "Next week", "sometime soon"]),
        time in prop::sample::select(vec!["Morning", "Golden hour", "2pm", "whenever"]),
        services in prop::sample::select(vec!["Photos", "Photos + video", "Drone"]),
    ) {
        let (studio, _) = demo_studio();
        let registry = FlowRegistry::standard();
        let handler = registry.get(Intent::BookShoot).expect("registered");
        let context = ChatContext::default();
        let mut state = None;

        let answers = ["Book a shoot", "77 Lake Dr, Dallas, TX", date, time, services];
        let mut steps = Vec::new();
        for answer in answers {
            let mut turn = Turn::new("prop-session", 1, answer, &context, &studio);
            let outcome = handler.handle(state.take(), &mut turn).unwrap();
            steps.push(outcome.state.as_ref().map(FlowState::step_name));
            state = outcome.state;
        }
        prop_assert_eq!(
            steps,
            vec![
                Some("ask_property"),
                Some("ask_date"),
                Some("ask_time"),
                Some("ask_services"),
                Some("confirm"),
            ]
        );
    }

    #[test]
    fn prop_fallback_is_well_formed(page in prop::option::of("[a-z_]{0,15}")) {
        let reply = fallback_reply(page.as_deref());
        prop_assert!(reply.is_well_formed());
        prop_assert!(!reply.suggestions.is_empty());
    }
}

//! Property-based tests for the harness primitives.
//!
//! Uses proptest to check that polling never reports early, the diagnostic
//! collector never drops entries, and the sort-agreement helpers agree.

use demoscope::{
    is_non_decreasing, poll_until, ConsoleSeverity, ElementState, HarnessError, MockDriver,
    MockEffect, MockElement, PageObject, Session, UiSnapshot, WaitOptions,
};
use proptest::prelude::*;
use std::cell::Cell;
use std::sync::Arc;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn bars(labels: &[i32], marked: bool) -> UiSnapshot {
    UiSnapshot {
        role: "bars".to_string(),
        elements: labels
            .iter()
            .map(|label| ElementState {
                tag_name: "div".to_string(),
                text: label.to_string(),
                classes: if marked {
                    vec!["bar".to_string(), "sorted".to_string()]
                } else {
                    vec!["bar".to_string()]
                },
                visible: true,
                ..ElementState::default()
            })
            .collect(),
    }
}

// === Polling ===

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// The wait returns on the first probe where the predicate holds.
    #[test]
    fn prop_poll_returns_at_first_truth(threshold in 0_u32..20) {
        let rt = runtime();
        let probes = Cell::new(0_u32);
        let options = WaitOptions::new().with_timeout(5_000).with_poll_interval(1);
        let (value, result) = rt
            .block_on(poll_until(
                "counter to reach threshold",
                &options,
                || {
                    let n = probes.get();
                    probes.set(n + 1);
                    async move { Ok::<_, HarnessError>(n) }
                },
                |n| *n >= threshold,
            ))
            .unwrap();
        prop_assert_eq!(value, threshold);
        prop_assert_eq!(result.attempts, threshold + 1);
        prop_assert_eq!(probes.get(), threshold + 1);
    }

    /// A predicate that never holds always times out with the last value.
    #[test]
    fn prop_poll_never_false_positive(timeout_ms in 1_u64..25) {
        let rt = runtime();
        let options = WaitOptions::new()
            .with_timeout(timeout_ms)
            .with_poll_interval(2);
        let err = rt
            .block_on(poll_until(
                "never",
                &options,
                || async { Ok::<_, HarnessError>(false) },
                |b: &bool| *b,
            ))
            .unwrap_err();
        prop_assert!(err.is_timeout());
        prop_assert!(err.to_string().contains("last observed: false"));
    }
}

// === Diagnostic collection ===

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Every console error and uncaught exception reaches the record in order.
    #[test]
    fn prop_collector_drops_nothing(kinds in prop::collection::vec(0_u8..4, 0..120)) {
        let rt = runtime();
        let driver = MockDriver::new();
        driver.add_element(MockElement::new("button").matching("#go"));
        let effects: Vec<MockEffect> = kinds
            .iter()
            .enumerate()
            .map(|(i, kind)| match kind {
                0 => MockEffect::console(ConsoleSeverity::Error, format!("e{i}")),
                1 => MockEffect::exception(format!("x{i}")),
                2 => MockEffect::console(ConsoleSeverity::Warn, format!("w{i}")),
                _ => MockEffect::console(ConsoleSeverity::Log, format!("l{i}")),
            })
            .collect();
        driver.on_click("#go", effects);
        let page = PageObject::builder("about:blank").css("go", "#go").build();

        let (entries, errors) = rt.block_on(async {
            let session = Session::start(Arc::new(driver), page).await.unwrap();
            session.goto().await.unwrap();
            session.actions().click("go").await.unwrap();
            let record = session.diagnostics().clone();
            // Errors fail the session; the record survives finish either way
            let _ = session.finish().await;
            (record.entries(), record.errors().len())
        });

        prop_assert_eq!(entries.len(), kinds.len());
        prop_assert_eq!(errors, kinds.iter().filter(|k| **k < 2).count());
        for (i, entry) in entries.iter().enumerate() {
            prop_assert!(entry.text.ends_with(&i.to_string()));
        }
    }
}

// === Sort agreement ===

proptest! {
    /// Sorting any labels yields a non-decreasing sequence.
    #[test]
    fn prop_sorted_labels_non_decreasing(mut labels in prop::collection::vec(-1000_i32..1000, 0..40)) {
        labels.sort_unstable();
        let snapshot = bars(&labels, true);
        let parsed = snapshot.numeric_labels().unwrap();
        prop_assert!(is_non_decreasing(&parsed));
    }

    /// A single inversion is always detected.
    #[test]
    fn prop_inversion_detected(
        mut labels in prop::collection::vec(-1000_i32..1000, 2..40),
        idx in any::<prop::sample::Index>(),
    ) {
        labels.sort_unstable();
        labels.dedup();
        prop_assume!(labels.len() >= 2);
        let i = idx.index(labels.len() - 1);
        labels.swap(i, i + 1);
        let parsed = bars(&labels, true).numeric_labels().unwrap();
        prop_assert!(!is_non_decreasing(&parsed));
    }

    /// The marker check needs every bar marked and at least one bar.
    #[test]
    fn prop_all_marked_requires_every_bar(labels in prop::collection::vec(0_i32..100, 0..20)) {
        prop_assert_eq!(bars(&labels, true).all_have_class("sorted"), !labels.is_empty());
        prop_assert!(!bars(&labels, false).all_have_class("sorted"));
    }
}

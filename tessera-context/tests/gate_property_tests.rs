//! Property-Based Tests for value localization and change detection
//!
//! - Localizing an entry keeps every field key and never yields a locale map
//!   for a field with a non-empty requested or default translation
//! - Observing the same reference list twice reports at most one change
//! - Observing a list after its reversal reports a change exactly when the
//!   reversal changes the id order

use std::sync::Arc;

use proptest::prelude::*;
use serde_json::Value;
use tessera_context::{ContentContext, ContextConfig, ValueChangeGate};
use tessera_core::{Locales, MockContentApi};
use tessera_storage::InMemoryStore;
use tessera_test_utils::generators::{arb_entry, arb_link_list, arb_locale};

fn context() -> ContentContext<MockContentApi, InMemoryStore> {
    let config = ContextConfig::default().with_locales(Locales::new("en"));
    ContentContext::new(Arc::new(MockContentApi::new()), Arc::new(InMemoryStore::new()), config).unwrap()
}

fn ids(list: &Value) -> Vec<Option<String>> {
    list.as_array()
        .map(|items| {
            items
                .iter()
                .map(|item| item["sys"]["id"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

proptest! {
    #[test]
    fn prop_localization_keeps_field_keys(entry in arb_entry(), locale in arb_locale()) {
        let context = context();
        let raw = entry.clone().into_value();
        let values = context.get_value(&raw, Some(&locale));
        let values = values.as_object().unwrap();

        prop_assert_eq!(values.len(), entry.fields.len());
        for (key, field) in &entry.fields {
            let by_locale = field.as_object().unwrap();
            let filled = |l: &str| by_locale.get(l).and_then(Value::as_str).is_some_and(|s| !s.is_empty());
            if filled(&locale) || filled("en") {
                prop_assert!(values[key].is_string());
            } else {
                prop_assert_eq!(&values[key], field);
            }
        }
    }

    #[test]
    fn prop_same_list_changes_at_most_once(list in arb_link_list()) {
        let mut gate = ValueChangeGate::new();
        let first = gate.observe(&list);
        prop_assert_eq!(first, !ids(&list).is_empty());
        prop_assert!(!gate.observe(&list));
    }

    #[test]
    fn prop_reversal_changes_iff_order_differs(list in arb_link_list()) {
        let mut gate = ValueChangeGate::new();
        gate.observe(&list);

        let mut reversed = list.as_array().cloned().unwrap_or_default();
        reversed.reverse();
        let reversed = Value::Array(reversed);

        let expected = ids(&list) != ids(&reversed);
        prop_assert_eq!(gate.observe(&reversed), expected);
    }
}

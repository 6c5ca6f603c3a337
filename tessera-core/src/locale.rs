//! Locale projection of localized field maps.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::entity::{Entity, Sys};

/// Locale settings of the space being edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locales {
    /// Locale whose value is used when the requested one is missing.
    pub default: String,
    #[serde(default)]
    pub available: Vec<String>,
}

impl Locales {
    pub fn new(default: impl Into<String>) -> Self {
        let default = default.into();
        Self {
            available: vec![default.clone()],
            default,
        }
    }

    pub fn with_available(mut self, available: Vec<String>) -> Self {
        self.available = available;
        self
    }
}

impl Default for Locales {
    fn default() -> Self {
        Self::new("en")
    }
}

/// `null` and the empty string count as missing; `0` and `false` are values.
fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| match v {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    })
}

/// Project a single field value.
///
/// Requested locale first, then the default locale, then the raw value.
pub fn project_field(field: &Value, locales: &Locales, locale: Option<&str>) -> Value {
    let Value::Object(by_locale) = field else {
        return field.clone();
    };
    locale
        .and_then(|l| present(by_locale.get(l)))
        .or_else(|| present(by_locale.get(&locales.default)))
        .cloned()
        .unwrap_or_else(|| field.clone())
}

/// Project every field of a field map.
pub fn project_fields(fields: &Map<String, Value>, locales: &Locales, locale: Option<&str>) -> Map<String, Value> {
    fields
        .iter()
        .map(|(key, value)| (key.clone(), project_field(value, locales, locale)))
        .collect()
}

/// Localized view of the `fields` of a raw entity value.
///
/// A `fields` sequence is treated as a list of field maps, each projected
/// on its own; a missing `fields` yields an empty map.
pub fn localized_values(entity: &Value, locales: &Locales, locale: Option<&str>) -> Value {
    match entity.get("fields") {
        Some(Value::Array(items)) => Value::Array(
            items
                .iter()
                .map(|item| match item {
                    Value::Object(fields) => Value::Object(project_fields(fields, locales, locale)),
                    other => other.clone(),
                })
                .collect(),
        ),
        Some(Value::Object(fields)) => Value::Object(project_fields(fields, locales, locale)),
        _ => Value::Object(Map::new()),
    }
}

/// Fully localized copy of an entity, including the free-form sys metadata.
pub fn localize(entity: &Entity, locales: &Locales, locale: Option<&str>) -> Entity {
    let sys = Sys {
        extra: project_fields(&entity.sys.extra, locales, locale),
        ..entity.sys.clone()
    };
    Entity::new(sys, project_fields(&entity.fields, locales, locale))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn locales() -> Locales {
        Locales::new("en").with_available(vec!["en".into(), "de".into()])
    }

    #[test]
    fn test_requested_locale_wins() {
        let field = json!({"en": "A", "de": "B"});
        assert_eq!(project_field(&field, &locales(), Some("de")), json!("B"));
    }

    #[test]
    fn test_empty_translation_falls_back() {
        let field = json!({"en": "A", "de": ""});
        assert_eq!(project_field(&field, &locales(), Some("de")), json!("A"));

        let flags = json!({"en": true, "de": false});
        assert_eq!(project_field(&flags, &locales(), Some("de")), json!(false));
        let counts = json!({"en": 5, "de": 0});
        assert_eq!(project_field(&counts, &locales(), Some("de")), json!(0));
    }

    #[test]
    fn test_falls_back_to_default_locale() {
        let field = json!({"en": "A", "de": "B"});
        assert_eq!(project_field(&field, &locales(), Some("fr")), json!("A"));
        assert_eq!(project_field(&field, &locales(), None), json!("A"));
    }

    #[test]
    fn test_null_translation_falls_back() {
        let field = json!({"en": "A", "de": null});
        assert_eq!(project_field(&field, &locales(), Some("de")), json!("A"));
    }

    #[test]
    fn test_flattened_field_returned_raw() {
        assert_eq!(project_field(&json!("plain"), &locales(), Some("de")), json!("plain"));
        let link = json!({"sys": {"type": "Link", "linkType": "Entry", "id": "e1"}});
        assert_eq!(project_field(&link, &locales(), Some("de")), link);
    }

    #[test]
    fn test_localized_values_projects_sequence_fields() {
        let entity = json!({"fields": [{"a": {"en": 1, "de": 2}}, {"a": {"en": 3}, "b": 4}]});
        assert_eq!(
            localized_values(&entity, &locales(), Some("de")),
            json!([{"a": 2}, {"a": 3, "b": 4}])
        );
        assert_eq!(localized_values(&json!({"sys": {}}), &locales(), None), json!({}));
    }

    #[test]
    fn test_localize_projects_sys_metadata() {
        let entity: Entity = serde_json::from_value(json!({
            "sys": {"type": "Entry", "id": "e1", "label": {"en": "Home", "de": "Start"}},
            "fields": {"title": {"en": "Hello", "de": "Hallo"}}
        }))
        .unwrap();

        let localized = localize(&entity, &locales(), Some("de"));
        assert_eq!(localized.sys.extra["label"], json!("Start"));
        assert_eq!(localized.fields["title"], json!("Hallo"));
        assert_eq!(localized.sys.id, "e1");
    }

    proptest! {
        #[test]
        fn prop_default_value_used_for_unknown_locale(default in "[a-z]{1,8}", other in "[a-z]{1,8}") {
            let field = json!({"en": default.clone(), "de": other});
            let projected = project_field(&field, &locales(), Some("xx"));
            prop_assert_eq!(projected, json!(default));
        }

        #[test]
        fn prop_requested_locale_present_wins(value in "[a-z]{1,8}", fallback in "[a-z]{1,8}") {
            let field = json!({"en": fallback, "de": value.clone()});
            prop_assert_eq!(project_field(&field, &locales(), Some("de")), json!(value));
        }
    }
}

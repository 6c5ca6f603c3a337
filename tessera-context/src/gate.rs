//! Change detection for reference-list field values.

use serde_json::Value;
use tessera_core::id_sequence_eq;

/// Remembers the last value of a field and reports whether a new value
/// references a different sequence of entities.
///
/// Only the `sys.id` of each element is compared, so re-fetched or resolved
/// copies of the same references do not count as a change. `null` counts as
/// an empty list and a single non-array value as a one-element list.
#[derive(Debug, Clone, Default)]
pub struct ValueChangeGate {
    last: Vec<Value>,
}

impl ValueChangeGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `value`, returning true when its id sequence differs from the
    /// previously recorded one.
    pub fn observe(&mut self, value: &Value) -> bool {
        let next = sequence_of(value);
        let changed = !id_sequence_eq(&self.last, &next);
        self.last = next;
        changed
    }

    pub fn last(&self) -> &[Value] {
        &self.last
    }

    pub fn reset(&mut self) {
        self.last.clear();
    }
}

fn sequence_of(value: &Value) -> Vec<Value> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn link(id: &str) -> Value {
        json!({"sys": {"type": "Link", "linkType": "Entry", "id": id}})
    }

    #[test]
    fn test_empty_start_is_not_a_change() {
        let mut gate = ValueChangeGate::new();
        assert!(!gate.observe(&Value::Null));
        assert!(!gate.observe(&json!([])));
    }

    #[test]
    fn test_reports_reordering_and_growth() {
        let mut gate = ValueChangeGate::new();
        assert!(gate.observe(&json!([link("a"), link("b")])));
        assert!(!gate.observe(&json!([link("a"), link("b")])));
        assert!(gate.observe(&json!([link("b"), link("a")])));
        assert!(gate.observe(&json!([link("b"), link("a"), link("c")])));
        assert_eq!(gate.last().len(), 3);
    }

    #[test]
    fn test_resolved_copy_is_not_a_change() {
        let mut gate = ValueChangeGate::new();
        gate.observe(&json!([link("a")]));
        let resolved = json!([{"sys": {"type": "Entry", "id": "a"}, "fields": {"title": "A"}}]);
        assert!(!gate.observe(&resolved));
    }

    #[test]
    fn test_reset_forgets_value() {
        let mut gate = ValueChangeGate::new();
        gate.observe(&link("a"));
        gate.reset();
        assert!(gate.observe(&link("a")));
    }
}

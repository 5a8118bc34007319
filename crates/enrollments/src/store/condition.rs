use serde_json::Value;

use super::{FieldPath, Item};

/// Predicate over an item, used both as a write guard and as a scan filter.
///
/// A missing item behaves like an empty one: `Exists` is false, `NotExists` is true.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Exists(FieldPath),
    NotExists(FieldPath),
    /// The attribute is absent or explicitly `null`.
    MissingOrNull(FieldPath),
    Equals(FieldPath, Value),
    /// The attribute is a list containing the value.
    Contains(FieldPath, Value),
    Not(Box<Condition>),
    All(Vec<Condition>),
}

impl Condition {
    pub fn not(condition: Condition) -> Self {
        Condition::Not(Box::new(condition))
    }

    pub fn evaluate(&self, item: Option<&Item>) -> bool {
        let lookup = |path: &FieldPath| item.and_then(|item| path.lookup(item));
        match self {
            Condition::Exists(path) => lookup(path).is_some(),
            Condition::NotExists(path) => lookup(path).is_none(),
            Condition::MissingOrNull(path) => matches!(lookup(path), None | Some(Value::Null)),
            Condition::Equals(path, expected) => lookup(path) == Some(expected),
            Condition::Contains(path, needle) => lookup(path)
                .and_then(Value::as_array)
                .is_some_and(|values| values.contains(needle)),
            Condition::Not(inner) => !inner.evaluate(item),
            Condition::All(conditions) => conditions.iter().all(|c| c.evaluate(item)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(value: Value) -> Item {
        value.as_object().expect("object").clone()
    }

    #[test]
    fn missing_or_null_matches_absent_and_null() {
        let path = FieldPath::new(["rounds", "1", "qualification_status"]);
        let condition = Condition::MissingOrNull(path);

        assert!(condition.evaluate(None));
        assert!(condition.evaluate(Some(&item(json!({ "rounds": {} })))));
        assert!(condition.evaluate(Some(&item(
            json!({ "rounds": { "1": { "qualification_status": null } } })
        ))));
        assert!(!condition.evaluate(Some(&item(
            json!({ "rounds": { "1": { "qualification_status": "pending" } } })
        ))));
    }

    #[test]
    fn contains_requires_a_list() {
        let path = FieldPath::new(["submitted"]);
        let condition = Condition::Contains(path, json!("WEB"));

        assert!(condition.evaluate(Some(&item(json!({ "submitted": ["WEB"] })))));
        assert!(!condition.evaluate(Some(&item(json!({ "submitted": "WEB" })))));
        assert!(!condition.evaluate(None));
        assert!(Condition::not(condition).evaluate(None));
    }

    #[test]
    fn all_short_circuits_on_first_failure() {
        let condition = Condition::All(vec![
            Condition::Exists(FieldPath::new(["email"])),
            Condition::Equals(FieldPath::new(["status"]), json!("qualified")),
        ]);

        assert!(condition.evaluate(Some(&item(
            json!({ "email": "a@x.com", "status": "qualified" })
        ))));
        assert!(!condition.evaluate(Some(&item(json!({ "status": "qualified" })))));
        assert!(Condition::All(Vec::new()).evaluate(None));
    }
}

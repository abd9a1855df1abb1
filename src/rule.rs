//! Formatting rules and the per-entity rule registry.
//!
//! A rule tells the format engine how to compute one property:
//! a literal value, a path lookup into the source, or a callback.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use crate::entity::Entity;
use crate::path::{FieldPath, PathSegment};
use crate::value::FieldValue;

/// Trait for callback rules
///
/// The callback receives the entity's source record, the entity as it
/// stands when the rule runs (earlier keys of the same pass already
/// written), and the rule set being applied. Its return value becomes the
/// property's new value.
pub trait RuleFn {
    fn call(&self, source: &FieldValue, entity: &Entity, rules: &RuleSet) -> FieldValue;
}

/// Simple function-based implementation of RuleFn
impl<F> RuleFn for F
where
    F: Fn(&FieldValue, &Entity, &RuleSet) -> FieldValue,
{
    fn call(&self, source: &FieldValue, entity: &Entity, rules: &RuleSet) -> FieldValue {
        self(source, entity, rules)
    }
}

/// One formatting instruction for a single property.
#[derive(Clone)]
pub enum Rule {
    /// Assigned verbatim.
    Literal(FieldValue),
    /// Looked up in the source record.
    Path(FieldPath),
    /// Computed by a function.
    Callback(Rc<dyn RuleFn>),
}

impl Rule {
    pub fn literal(value: impl Into<FieldValue>) -> Self {
        Rule::Literal(value.into())
    }

    pub fn path<I, S>(steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<PathSegment>,
    {
        Rule::Path(FieldPath::new(steps))
    }

    pub fn callback<F>(func: F) -> Self
    where
        F: Fn(&FieldValue, &Entity, &RuleSet) -> FieldValue + 'static,
    {
        Rule::Callback(Rc::new(func))
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Rule::Path(path) => f.debug_tuple("Path").field(&path.to_string()).finish(),
            Rule::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

impl From<FieldPath> for Rule {
    fn from(path: FieldPath) -> Self {
        Rule::Path(path)
    }
}

impl From<FieldValue> for Rule {
    fn from(value: FieldValue) -> Self {
        Rule::Literal(value)
    }
}

/// Ordered mapping of property name to rule.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: IndexMap<String, Rule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a rule set from a JSON object.
    ///
    /// Non-empty arrays made only of strings and non-negative integers are
    /// path rules; every other value is a literal. Returns `None` (and logs)
    /// when `value` is not an object.
    pub fn from_json(value: &JsonValue) -> Option<Self> {
        let object = match value.as_object() {
            Some(object) => object,
            None => {
                tracing::warn!("rule set is not an object, ignoring it");
                return None;
            }
        };

        let rules = object
            .iter()
            .map(|(key, value)| (key.clone(), json_rule(value)))
            .collect();
        Some(Self { rules })
    }

    pub fn insert(&mut self, key: impl Into<String>, rule: Rule) -> Option<Rule> {
        self.rules.insert(key.into(), rule)
    }

    pub fn with_rule(mut self, key: impl Into<String>, rule: Rule) -> Self {
        self.insert(key, rule);
        self
    }

    pub fn with_literal(self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.with_rule(key, Rule::literal(value))
    }

    pub fn with_path<I, S>(self, key: impl Into<String>, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<PathSegment>,
    {
        self.with_rule(key, Rule::path(steps))
    }

    pub fn with_callback<F>(self, key: impl Into<String>, func: F) -> Self
    where
        F: Fn(&FieldValue, &Entity, &RuleSet) -> FieldValue + 'static,
    {
        self.with_rule(key, Rule::callback(func))
    }

    /// Additive merge: keys of `other` overwrite, everything else is kept.
    pub fn merge(&mut self, other: &RuleSet) {
        for (key, rule) in &other.rules {
            self.rules.insert(key.clone(), rule.clone());
        }
    }

    pub fn merged(mut self, other: &RuleSet) -> Self {
        self.merge(other);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Rule> {
        self.rules.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.rules.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Rule> {
        self.rules.shift_remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Rule)> {
        self.rules.iter().map(|(key, rule)| (key.as_str(), rule))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn json_rule(value: &JsonValue) -> Rule {
    if let Some(steps) = value.as_array() {
        let segments: Option<Vec<PathSegment>> = steps
            .iter()
            .map(|step| match step {
                JsonValue::String(name) => Some(PathSegment::Field(name.clone())),
                JsonValue::Number(n) => n.as_u64().map(|i| PathSegment::Index(i as usize)),
                _ => None,
            })
            .collect();
        if let Some(segments) = segments.filter(|s| !s.is_empty()) {
            return Rule::Path(FieldPath::new(segments));
        }
    }
    Rule::Literal(FieldValue::from(value))
}

impl<K: Into<String>> FromIterator<(K, Rule)> for RuleSet {
    fn from_iter<T: IntoIterator<Item = (K, Rule)>>(iter: T) -> Self {
        Self {
            rules: iter.into_iter().map(|(key, rule)| (key.into(), rule)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_is_additive() {
        let mut base = RuleSet::new().with_literal("a", 1).with_literal("b", 2);
        let extra = RuleSet::new().with_literal("b", 20).with_literal("c", 3);

        base.merge(&extra);

        let keys: Vec<&str> = base.keys().collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert!(matches!(base.get("b"), Some(Rule::Literal(v)) if *v == FieldValue::from(20)));
    }

    #[test]
    fn test_from_json_detects_paths() {
        let rules = RuleSet::from_json(&json!({
            "category": ["categoryId"],
            "updateTime": ["titles", 1, "updateTime"],
            "author": "Thomas",
            "empty": [],
            "mixed": [1, {"a": 1}]
        }))
        .unwrap();

        assert!(matches!(rules.get("category"), Some(Rule::Path(_))));
        assert!(matches!(rules.get("updateTime"), Some(Rule::Path(p)) if p.len() == 3));
        assert!(matches!(rules.get("author"), Some(Rule::Literal(_))));
        assert!(matches!(rules.get("empty"), Some(Rule::Literal(_))));
        assert!(matches!(rules.get("mixed"), Some(Rule::Literal(_))));
    }

    #[test]
    fn test_from_json_rejects_non_object() {
        assert!(RuleSet::from_json(&json!([1, 2])).is_none());
        assert!(RuleSet::from_json(&json!("rules")).is_none());
    }
}

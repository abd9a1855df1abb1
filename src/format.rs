//! The format engine: resolves a rule set against an entity's source.

use crate::entity::Entity;
use crate::rule::{Rule, RuleSet};
use crate::value::FieldValue;

/// Resolves every rule in order and writes the result through
/// [`Entity::set`], then runs the type's `formatted` hook.
///
/// - literal rules are assigned as they are;
/// - path rules walk the source and keep the property's current value when
///   the walk hits something that is not a map or list;
/// - callback rules see the entity with all earlier keys of this pass
///   already written.
pub fn apply(entity: &mut Entity, rules: &RuleSet) {
    tracing::debug!(entity = entity.kind().name(), rules = rules.len(), "applying rules");

    for (key, rule) in rules.iter() {
        let value = match rule {
            Rule::Literal(value) => value.clone(),
            // A zero-step path is not a lookup; it lands as an empty list.
            Rule::Path(path) if path.is_empty() => FieldValue::List(Vec::new()),
            Rule::Path(path) => {
                let current = entity.get(key).cloned().unwrap_or_default();
                path.resolve(entity.source(), &current)
            }
            Rule::Callback(func) => func.call(entity.source(), entity, rules),
        };
        entity.set(key, value);
    }

    entity.run_formatted(rules);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityType;
    use serde_json::json;

    #[test]
    fn test_callback_sees_earlier_writes() {
        let kind = EntityType::new("Pair")
            .with_field("a", 0)
            .with_field("b", 0)
            .into_shared();
        let mut entity = kind.create(json!({"a": 1}));

        let rules = RuleSet::new()
            .with_literal("a", 10)
            .with_callback("b", |_source, entity, _rules| {
                let a = entity.get("a").and_then(FieldValue::as_i64).unwrap_or(0);
                FieldValue::from(a * 2)
            });
        apply(&mut entity, &rules);

        assert_eq!(entity.to_json(), json!({"a": 10, "b": 20}));
    }

    #[test]
    fn test_path_rule_keeps_previous_value_on_scalar() {
        let kind = EntityType::new("K").with_field("k", "before").into_shared();
        let mut entity = kind.create(json!({"a": {"b": 5}}));

        apply(&mut entity, &RuleSet::new().with_path("k", ["a", "b", "c"]));

        assert_eq!(entity.get("k"), Some(&FieldValue::from("before")));
    }

    #[test]
    fn test_path_rule_can_add_new_key() {
        let mut entity = EntityType::new("K").into_shared().create(json!({"child": {"name": "x"}}));

        apply(&mut entity, &RuleSet::new().with_path("childName", ["child", "name"]));

        assert_eq!(entity.get("childName"), Some(&FieldValue::from("x")));
    }

    #[test]
    fn test_empty_path_assigns_empty_list() {
        let mut entity = Entity::default();
        let steps: Vec<&str> = Vec::new();

        apply(&mut entity, &RuleSet::new().with_path("tags", steps));

        assert_eq!(entity.get("tags"), Some(&FieldValue::List(Vec::new())));
    }
}

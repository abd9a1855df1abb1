//! Entities: shaped, formattable records built from raw source objects.
//!
//! An [`EntityType`] is the runtime schema of a family of entities (its
//! property skeleton, default rules, and lifecycle hooks). An [`Entity`] is
//! one record of that type, with a read-only source snapshot, a mutable rule
//! registry, and its own properties.
//!
//! Construction follows a fixed order: define the skeleton, merge rules,
//! run `preprocess`, copy same-named source fields, run the format pass,
//! then call `formatted`.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;

use crate::format;
use crate::observe::{ChangeEvent, Observers, UpdateListener};
use crate::rule::{Rule, RuleSet};
use crate::value::{serialize_defined, FieldValue};

/// Lifecycle hooks of an entity type.
///
/// Every method has a default, so implementors override only what they need.
pub trait EntityHooks {
    /// Runs before source fields are copied. May rewrite `source` in place;
    /// returning `false` skips the format pass of this `init` call.
    fn preprocess(&self, source: &mut FieldValue, rules: &RuleSet) -> bool {
        let _ = (source, rules);
        true
    }

    /// Runs after every format pass with the rule set that was applied.
    fn formatted(&self, entity: &mut Entity, rules: &RuleSet) {
        tracing::trace!(entity = entity.kind().name(), rules = rules.len(), "entity formatted");
    }

    /// Runs for every property write, before instance listeners.
    fn on_update(&self, event: &ChangeEvent) {
        let _ = event;
    }
}

struct DefaultHooks;

impl EntityHooks for DefaultHooks {}

/// Runtime schema descriptor shared by all entities of one kind.
pub struct EntityType {
    name: String,
    skeleton: IndexMap<String, FieldValue>,
    rules: RuleSet,
    hooks: Rc<dyn EntityHooks>,
}

impl EntityType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            skeleton: IndexMap::new(),
            rules: RuleSet::new(),
            hooks: Rc::new(DefaultHooks),
        }
    }

    /// Synthesizes an anonymous type whose skeleton is exactly the key set of
    /// `sample`, every key defaulting to `null`. `None` when the sample is not
    /// object-shaped.
    pub fn anonymous(sample: &FieldValue) -> Option<Self> {
        let keys: Vec<String> = match sample {
            FieldValue::Map(map) => map.keys().cloned().collect(),
            FieldValue::Entity(entity) => entity.keys().map(str::to_string).collect(),
            _ => return None,
        };
        let skeleton = keys.into_iter().map(|key| (key, FieldValue::Null)).collect();
        Some(Self {
            skeleton,
            ..Self::new("AnonymousEntity")
        })
    }

    pub fn with_field(mut self, key: impl Into<String>, default: impl Into<FieldValue>) -> Self {
        self.skeleton.insert(key.into(), default.into());
        self
    }

    /// Adds every key of an object-shaped value to the skeleton, keeping its
    /// value as the default.
    pub fn with_fields(mut self, defaults: impl Into<FieldValue>) -> Self {
        match defaults.into() {
            FieldValue::Map(map) => self.skeleton.extend(map),
            FieldValue::Entity(entity) => self
                .skeleton
                .extend(entity.entries().map(|(k, v)| (k.to_string(), v.clone()))),
            other => {
                tracing::warn!(entity = %self.name, "skeleton defaults are not an object: {}", other);
            }
        }
        self
    }

    pub fn with_rule(mut self, key: impl Into<String>, rule: Rule) -> Self {
        self.rules.insert(key, rule);
        self
    }

    pub fn with_rules(mut self, rules: &RuleSet) -> Self {
        self.rules.merge(rules);
        self
    }

    pub fn with_hooks(mut self, hooks: impl EntityHooks + 'static) -> Self {
        self.hooks = Rc::new(hooks);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn skeleton(&self) -> &IndexMap<String, FieldValue> {
        &self.skeleton
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn into_shared(self) -> Rc<Self> {
        Rc::new(self)
    }

    /// Constructs an entity of this type from `source` with the type's rules.
    pub fn create(self: &Rc<Self>, source: impl Into<FieldValue>) -> Entity {
        self.create_with(source, &RuleSet::new())
    }

    /// Constructs an entity with the type's rules merged with `formula`
    /// (`formula` wins per key).
    pub fn create_with(self: &Rc<Self>, source: impl Into<FieldValue>, formula: &RuleSet) -> Entity {
        let mut entity = Entity::new(Rc::clone(self));
        entity.define(self.skeleton.clone());
        let rules = self.rules.clone().merged(formula);
        entity.init(source, &rules);
        entity
    }
}

impl fmt::Debug for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityType")
            .field("name", &self.name)
            .field("skeleton", &self.skeleton.keys().collect::<Vec<_>>())
            .field("rules", &self.rules.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Where an entity is in its construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Constructed,
    /// Property skeleton set.
    Defined,
    /// Source absorbed and first format pass applied.
    Initialized,
}

/// A shaped record. See the module docs for the construction order.
pub struct Entity {
    kind: Rc<EntityType>,
    properties: IndexMap<String, FieldValue>,
    source: FieldValue,
    rules: RuleSet,
    listeners: Observers<UpdateListener>,
    state: Lifecycle,
}

impl Entity {
    pub fn new(kind: Rc<EntityType>) -> Self {
        Self {
            kind,
            properties: IndexMap::new(),
            source: FieldValue::Undefined,
            rules: RuleSet::new(),
            listeners: Observers::default(),
            state: Lifecycle::Constructed,
        }
    }

    pub fn kind(&self) -> &Rc<EntityType> {
        &self.kind
    }

    pub fn is_instance_of(&self, kind: &Rc<EntityType>) -> bool {
        Rc::ptr_eq(&self.kind, kind)
    }

    pub fn state(&self) -> Lifecycle {
        self.state
    }

    /// Sets the property skeleton. Skeleton writes are not notified.
    pub fn define(&mut self, skeleton: IndexMap<String, FieldValue>) -> &mut Self {
        self.properties.extend(skeleton);
        self.state = Lifecycle::Defined;
        self
    }

    /// Absorbs `source` and runs the first format pass.
    ///
    /// `rules` are merged into the registry. Only keys already present on the
    /// entity are copied from the source, and only when the source value is
    /// defined. A source that is not object-shaped is logged and ignored.
    pub fn init(&mut self, source: impl Into<FieldValue>, rules: &RuleSet) -> &mut Self {
        let mut source = source.into();
        if !source.is_object() {
            tracing::warn!(entity = %self.kind.name, "the source is not an object, skipping init");
            return self;
        }

        self.rules.merge(rules);
        let kind = Rc::clone(&self.kind);
        let proceed = kind.hooks.preprocess(&mut source, rules);
        self.source = source;

        let keys: Vec<String> = self.properties.keys().cloned().collect();
        for key in keys {
            let value = match self.source.get_key(&key) {
                Some(value) if !value.is_undefined() => value.clone(),
                _ => continue,
            };
            self.set(key, value);
        }
        self.state = Lifecycle::Initialized;

        if proceed {
            self.format(None, true);
        } else {
            tracing::debug!(entity = %self.kind.name, "preprocess skipped formatting");
        }
        self
    }

    /// The source snapshot captured by `init`.
    pub fn source(&self) -> &FieldValue {
        &self.source
    }

    /// The persistent rule registry.
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn add_rules(&mut self, rules: &RuleSet) -> &mut Self {
        self.rules.merge(rules);
        self
    }

    /// Replaces the registry when `replace` is true, merges otherwise.
    pub fn set_rules(&mut self, rules: RuleSet, replace: bool) -> &mut Self {
        if replace {
            self.rules = rules;
        } else {
            self.rules.merge(&rules);
        }
        self
    }

    /// Runs a format pass.
    ///
    /// With `merge` the given rules join the registry and the whole registry
    /// is applied. Without it only `rules` are applied, once, and the registry
    /// is left alone. A one-off pass without rules writes nothing but still
    /// runs the `formatted` hook.
    pub fn format(&mut self, rules: Option<&RuleSet>, merge: bool) -> &mut Self {
        if merge {
            if let Some(rules) = rules {
                self.rules.merge(rules);
            }
            let registry = self.rules.clone();
            format::apply(self, &registry);
        } else if let Some(rules) = rules {
            format::apply(self, rules);
        } else {
            tracing::warn!(entity = %self.kind.name, "no rule set given for a one-off format");
            self.run_formatted(&RuleSet::new());
        }
        self
    }

    /// Runs a format pass from a JSON rule object; non-objects are ignored.
    pub fn format_json(&mut self, rules: &JsonValue, merge: bool) -> &mut Self {
        if let Some(rules) = RuleSet::from_json(rules) {
            self.format(Some(&rules), merge);
        }
        self
    }

    pub(crate) fn run_formatted(&mut self, rules: &RuleSet) {
        let kind = Rc::clone(&self.kind);
        kind.hooks.formatted(self, rules);
    }

    /// Writes a property, notifying listeners.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> &mut Self {
        let key = key.into();
        let value = value.into();
        let old = self
            .properties
            .insert(key.clone(), value.clone())
            .unwrap_or_default();
        self.notify(ChangeEvent::new(key, old, value));
        self
    }

    /// Writes into nested maps along a dotted path (`"address.city"`).
    ///
    /// Every intermediate step must already hold a map; otherwise nothing is
    /// written.
    pub fn set_path(&mut self, path: &str, value: impl Into<FieldValue>) -> &mut Self {
        let mut steps: Vec<&str> = path.split('.').collect();
        let leaf = match steps.pop() {
            Some(leaf) if !steps.is_empty() => leaf,
            _ => return self.set(path, value),
        };

        let value = value.into();
        let mut target = match self.properties.get_mut(steps[0]) {
            Some(FieldValue::Map(map)) => map,
            _ => {
                tracing::warn!(path, "cannot write below a non-object property");
                return self;
            }
        };
        for step in &steps[1..] {
            target = match target.get_mut(*step) {
                Some(FieldValue::Map(map)) => map,
                _ => {
                    tracing::warn!(path, "cannot write below a non-object value");
                    return self;
                }
            };
        }
        let old = target
            .insert(leaf.to_string(), value.clone())
            .unwrap_or_default();
        self.notify(ChangeEvent::new(path, old, value));
        self
    }

    /// Sets `key` only when the entity does not own it yet.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> &mut Self {
        let key = key.into();
        if !self.properties.contains_key(&key) {
            self.set(key, value);
        }
        self
    }

    pub fn add_all<I, K, V>(&mut self, entries: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        for (key, value) in entries {
            self.add(key, value);
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.properties.get(key)
    }

    /// Values of the given keys, skipping keys the entity does not own.
    pub fn get_many(&self, keys: &[&str]) -> Vec<FieldValue> {
        keys.iter()
            .filter_map(|key| self.properties.get(*key))
            .cloned()
            .collect()
    }

    /// Values whose `(key, value)` pair satisfies `predicate`.
    pub fn get_by<F>(&self, mut predicate: F) -> Vec<FieldValue>
    where
        F: FnMut(&str, &FieldValue) -> bool,
    {
        self.properties
            .iter()
            .filter(|(key, value)| predicate(key, value))
            .map(|(_, value)| value.clone())
            .collect()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Own keys in first-defined order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &FieldValue> {
        self.properties.values()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.properties.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn properties(&self) -> &IndexMap<String, FieldValue> {
        &self.properties
    }

    /// True when the entity owns every key.
    pub fn has_key(&self, keys: &[&str]) -> bool {
        keys.iter().all(|key| self.properties.contains_key(*key))
    }

    /// True when every value is held by some property.
    pub fn has_value(&self, values: &[FieldValue]) -> bool {
        values
            .iter()
            .all(|value| self.properties.values().any(|held| held == value))
    }

    /// A missing key compares as `Undefined`.
    pub fn has_key_value(&self, key: &str, value: &FieldValue) -> bool {
        self.get(key).unwrap_or(&FieldValue::Undefined) == value
    }

    pub fn remove_by<F>(&mut self, mut predicate: F) -> &mut Self
    where
        F: FnMut(&str, &FieldValue) -> bool,
    {
        let doomed: Vec<String> = self
            .properties
            .iter()
            .filter(|(key, value)| predicate(key, value))
            .map(|(key, _)| key.clone())
            .collect();
        for key in doomed {
            self.remove_entry(&key);
        }
        self
    }

    pub fn remove_key(&mut self, keys: &[&str]) -> &mut Self {
        for key in keys {
            self.remove_entry(key);
        }
        self
    }

    pub fn remove_value(&mut self, values: &[FieldValue]) -> &mut Self {
        self.remove_by(|_, value| values.contains(value))
    }

    /// Removes every property.
    pub fn empty(&mut self) -> &mut Self {
        self.remove_by(|_, _| true)
    }

    fn remove_entry(&mut self, key: &str) {
        if let Some(old) = self.properties.shift_remove(key) {
            self.notify(ChangeEvent::new(key, old, FieldValue::Undefined));
        }
    }

    /// Visits properties in order until `func` returns `false`.
    pub fn each<F>(&self, mut func: F) -> &Self
    where
        F: FnMut(&str, &FieldValue) -> bool,
    {
        for (key, value) in &self.properties {
            if !func(key, value) {
                break;
            }
        }
        self
    }

    /// Properties whose `(key, value)` pair satisfies `predicate`.
    pub fn filter<F>(&self, mut predicate: F) -> IndexMap<String, FieldValue>
    where
        F: FnMut(&str, &FieldValue) -> bool,
    {
        self.properties
            .iter()
            .filter(|(key, value)| predicate(key, value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Structural equality by canonical string.
    ///
    /// Key counts must match, then both sides must serialize to the same
    /// JSON string. Key order therefore matters.
    pub fn equals(&self, other: &FieldValue) -> bool {
        if let FieldValue::Entity(entity) = other {
            return self.equals_entity(entity);
        }
        if other.is_nullish() || other.key_count() != self.len() {
            return false;
        }
        match (self.to_json_string(), other.to_json_string()) {
            (Some(mine), Some(theirs)) => mine == theirs,
            _ => false,
        }
    }

    pub fn equals_entity(&self, other: &Entity) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        if other.len() != self.len() {
            return false;
        }
        match (self.to_json_string(), other.to_json_string()) {
            (Some(mine), Some(theirs)) => mine == theirs,
            _ => false,
        }
    }

    /// Plain map of the properties, nested entities and collections included.
    pub fn to_plain(&self) -> FieldValue {
        FieldValue::Map(
            self.properties
                .iter()
                .map(|(key, value)| (key.clone(), value.to_plain()))
                .collect(),
        )
    }

    pub fn to_json(&self) -> JsonValue {
        match serde_json::to_value(self) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(entity = %self.kind.name, "toJSON error: {}", e);
                JsonValue::Null
            }
        }
    }

    /// JSON string of the properties; `None` (logged) if serialization fails.
    pub fn to_json_string(&self) -> Option<String> {
        match serde_json::to_string(self) {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::error!(entity = %self.kind.name, "toString error: {}", e);
                None
            }
        }
    }

    pub fn add_update_listener<F>(&mut self, listener: F) -> &mut Self
    where
        F: Fn(&ChangeEvent) + 'static,
    {
        self.listeners.push(Rc::new(listener));
        self
    }

    fn notify(&self, event: ChangeEvent) {
        self.kind.hooks.on_update(&event);
        for listener in self.listeners.iter() {
            listener(&event);
        }
    }
}

impl Default for Entity {
    fn default() -> Self {
        Entity::new(EntityType::new("Entity").into_shared())
    }
}

/// Copies type, properties, source and rules. Listeners are not carried over.
impl Clone for Entity {
    fn clone(&self) -> Self {
        Self {
            kind: Rc::clone(&self.kind),
            properties: self.properties.clone(),
            source: self.source.clone(),
            rules: self.rules.clone(),
            listeners: Observers::default(),
            state: self.state,
        }
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.properties == other.properties
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("kind", &self.kind.name)
            .field("state", &self.state)
            .field("properties", &self.properties)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Serialize for Entity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_defined(&self.properties, serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;

    fn person() -> Rc<EntityType> {
        EntityType::new("Person")
            .with_field("name", FieldValue::Null)
            .with_field("age", 0)
            .into_shared()
    }

    #[test]
    fn test_lifecycle_states() {
        let mut entity = Entity::new(person());
        assert_eq!(entity.state(), Lifecycle::Constructed);

        entity.define(person().skeleton().clone());
        assert_eq!(entity.state(), Lifecycle::Defined);

        entity.init(json!("not an object"), &RuleSet::new());
        assert_eq!(entity.state(), Lifecycle::Defined);
        assert!(entity.source().is_undefined());

        entity.init(json!({"name": "Tom"}), &RuleSet::new());
        assert_eq!(entity.state(), Lifecycle::Initialized);
        assert_eq!(entity.get("name"), Some(&FieldValue::from("Tom")));
    }

    #[test]
    fn test_skeleton_gates_source_fields() {
        let entity = person().create(json!({"name": "Tom", "weight": 50, "age": null}));

        let keys: Vec<&str> = entity.keys().collect();
        assert_eq!(keys, vec!["name", "age"]);
        assert_eq!(entity.get("age"), Some(&FieldValue::Null));
    }

    #[test]
    fn test_set_path_writes_nested_map() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&events);

        let mut entity = Entity::default();
        entity.set("address", json!({"city": "BJ", "geo": {"lat": 1}}));
        entity.add_update_listener(move |event| seen.borrow_mut().push(event.clone()));
        entity.set_path("address.geo.lat", 2);
        entity.set_path("address.city.zip", 3);

        let events = events.borrow();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].path, "address.geo.lat");
        assert_eq!(events[0].old, FieldValue::from(1));
        assert_eq!(entity.to_json(), json!({"address": {"city": "BJ", "geo": {"lat": 2}}}));
    }

    #[test]
    fn test_removal_emits_event() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&events);

        let mut entity = person().create(json!({"name": "Tom", "age": 3}));
        entity.add_update_listener(move |event| seen.borrow_mut().push(event.clone()));
        entity.remove_key(&["age", "missing"]);

        let events = events.borrow();
        assert_eq!(events.len(), 1);
        assert!(events[0].is_removal());
        assert_eq!(events[0].path, "age");
    }

    #[test]
    fn test_clone_is_independent() {
        let original = person().create(json!({"name": "Tom", "age": 3}));
        let mut copy = original.clone();
        copy.set("age", 4);

        assert!(copy.is_instance_of(original.kind()));
        assert_eq!(original.get("age"), Some(&FieldValue::from(3)));
        assert_eq!(copy.get("age"), Some(&FieldValue::from(4)));
    }
}

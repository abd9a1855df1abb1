//! Dynamic values held by entities and collections.
//!
//! [`FieldValue`] is the closed set of things a property can hold: JSON-like
//! scalars and containers, plus nested [`Entity`] and [`Collection`] values.
//! `Undefined` is distinct from `Null`: it survives [`FieldValue::to_plain`]
//! but is dropped from object keys when serialized.

use std::cmp::Ordering;
use std::fmt;

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::{Number, Value as JsonValue};

use crate::collection::Collection;
use crate::entity::Entity;

/// A property value inside an entity, a rule literal, or a source record.
#[derive(Debug, Clone, Default)]
pub enum FieldValue {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    List(Vec<FieldValue>),
    Map(IndexMap<String, FieldValue>),
    Entity(Box<Entity>),
    Collection(Box<Collection>),
}

impl FieldValue {
    pub fn is_undefined(&self) -> bool {
        matches!(self, FieldValue::Undefined)
    }

    /// `null` or `undefined`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, FieldValue::Undefined | FieldValue::Null)
    }

    /// Object-shaped values can be used as an entity source.
    pub fn is_object(&self) -> bool {
        matches!(self, FieldValue::Map(_) | FieldValue::Entity(_))
    }

    /// Values a path rule may step into.
    pub fn is_traversable(&self) -> bool {
        matches!(
            self,
            FieldValue::Map(_)
                | FieldValue::Entity(_)
                | FieldValue::List(_)
                | FieldValue::Collection(_)
        )
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, FieldValue>> {
        match self {
            FieldValue::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            FieldValue::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&Collection> {
        match self {
            FieldValue::Collection(collection) => Some(collection),
            _ => None,
        }
    }

    /// Looks up an own key of an object-shaped value.
    pub fn get_key(&self, key: &str) -> Option<&FieldValue> {
        match self {
            FieldValue::Map(map) => map.get(key),
            FieldValue::Entity(entity) => entity.get(key),
            _ => None,
        }
    }

    pub fn has_own_key(&self, key: &str) -> bool {
        match self {
            FieldValue::Map(map) => map.contains_key(key),
            FieldValue::Entity(entity) => entity.contains_key(key),
            _ => false,
        }
    }

    /// Number of own enumerable keys, the way `Object.keys(v).length` counts them.
    pub fn key_count(&self) -> usize {
        match self {
            FieldValue::Map(map) => map.len(),
            FieldValue::Entity(entity) => entity.len(),
            FieldValue::List(items) => items.len(),
            FieldValue::Collection(collection) => collection.len(),
            FieldValue::String(s) => s.chars().count(),
            _ => 0,
        }
    }

    /// Replaces nested entities and collections with plain maps and lists.
    /// `Undefined` values are retained.
    pub fn to_plain(&self) -> FieldValue {
        match self {
            FieldValue::List(items) => FieldValue::List(items.iter().map(FieldValue::to_plain).collect()),
            FieldValue::Map(map) => FieldValue::Map(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_plain()))
                    .collect(),
            ),
            FieldValue::Entity(entity) => entity.to_plain(),
            FieldValue::Collection(collection) => collection.to_plain(),
            other => other.clone(),
        }
    }

    /// JSON-safe form: undefined object keys are dropped, undefined list
    /// members become `null`.
    pub fn to_json(&self) -> JsonValue {
        match serde_json::to_value(self) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("toJSON error: {}", e);
                JsonValue::Null
            }
        }
    }

    /// Canonical string form used for structural equality.
    pub fn to_json_string(&self) -> Option<String> {
        match serde_json::to_string(self) {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::error!("toString error: {}", e);
                None
            }
        }
    }

    /// Stringified form used as a group key, following `String(value)`.
    pub fn group_key(&self) -> String {
        match self {
            FieldValue::Undefined => "undefined".to_string(),
            FieldValue::Null => "null".to_string(),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Number(n) => number_key(n),
            FieldValue::String(s) => s.clone(),
            FieldValue::List(items) => join_members(items.iter()),
            FieldValue::Collection(collection) => collection
                .iter()
                .map(|_| OBJECT_KEY)
                .collect::<Vec<_>>()
                .join(","),
            FieldValue::Map(_) | FieldValue::Entity(_) => OBJECT_KEY.to_string(),
        }
    }

    /// Relational comparison between two non-nullish values.
    ///
    /// Numbers and booleans compare numerically, strings lexicographically.
    /// Values of different kinds are ordered by kind so the result is always
    /// a total order.
    pub fn relational_cmp(&self, other: &FieldValue) -> Ordering {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a.total_cmp(&b),
            _ => match (self, other) {
                (FieldValue::String(a), FieldValue::String(b)) => a.cmp(b),
                _ => self.kind_rank().cmp(&other.kind_rank()),
            },
        }
    }

    fn numeric(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => n.as_f64(),
            FieldValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            FieldValue::Undefined | FieldValue::Null => 0,
            FieldValue::Bool(_) | FieldValue::Number(_) => 1,
            FieldValue::String(_) => 2,
            _ => 3,
        }
    }
}

const OBJECT_KEY: &str = "[object Object]";

fn join_members<'a>(items: impl Iterator<Item = &'a FieldValue>) -> String {
    items
        .map(|item| {
            if item.is_nullish() {
                String::new()
            } else {
                item.group_key()
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn number_key(n: &Number) -> String {
    if n.is_f64() {
        if let Some(f) = n.as_f64() {
            if f == 0.0 {
                return "0".to_string();
            }
            if f.fract() == 0.0 && f.abs() < 1e21 {
                return format!("{:.0}", f);
            }
            return f.to_string();
        }
    }
    n.to_string()
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldValue::Undefined, FieldValue::Undefined) => true,
            (FieldValue::Null, FieldValue::Null) => true,
            (FieldValue::Bool(a), FieldValue::Bool(b)) => a == b,
            (FieldValue::Number(a), FieldValue::Number(b)) => a.as_f64() == b.as_f64(),
            (FieldValue::String(a), FieldValue::String(b)) => a == b,
            (FieldValue::List(a), FieldValue::List(b)) => a == b,
            (FieldValue::Map(a), FieldValue::Map(b)) => a == b,
            (FieldValue::Entity(a), FieldValue::Entity(b)) => a == b,
            (FieldValue::Collection(a), FieldValue::Collection(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Undefined => write!(f, "undefined"),
            FieldValue::String(s) => write!(f, "{}", s),
            other => match serde_json::to_string(other) {
                Ok(s) => write!(f, "{}", s),
                Err(_) => write!(f, "{}", other.group_key()),
            },
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Undefined | FieldValue::Null => serializer.serialize_unit(),
            FieldValue::Bool(b) => serializer.serialize_bool(*b),
            FieldValue::Number(n) => n.serialize(serializer),
            FieldValue::String(s) => serializer.serialize_str(s),
            FieldValue::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            FieldValue::Map(map) => serialize_defined(map, serializer),
            FieldValue::Entity(entity) => entity.serialize(serializer),
            FieldValue::Collection(collection) => collection.serialize(serializer),
        }
    }
}

/// Serializes a property map, skipping keys whose value is `Undefined`.
pub(crate) fn serialize_defined<S: Serializer>(
    map: &IndexMap<String, FieldValue>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let defined = map.values().filter(|v| !v.is_undefined()).count();
    let mut out = serializer.serialize_map(Some(defined))?;
    for (key, value) in map.iter().filter(|(_, v)| !v.is_undefined()) {
        out.serialize_entry(key, value)?;
    }
    out.end()
}

impl From<JsonValue> for FieldValue {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => FieldValue::Null,
            JsonValue::Bool(b) => FieldValue::Bool(b),
            JsonValue::Number(n) => FieldValue::Number(n),
            JsonValue::String(s) => FieldValue::String(s),
            JsonValue::Array(items) => FieldValue::List(items.into_iter().map(FieldValue::from).collect()),
            JsonValue::Object(map) => FieldValue::Map(
                map.into_iter()
                    .map(|(key, value)| (key, FieldValue::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<&JsonValue> for FieldValue {
    fn from(value: &JsonValue) -> Self {
        FieldValue::from(value.clone())
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<i32> for FieldValue {
    fn from(n: i32) -> Self {
        FieldValue::Number(Number::from(n))
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Number(Number::from(n))
    }
}

impl From<u64> for FieldValue {
    fn from(n: u64) -> Self {
        FieldValue::Number(Number::from(n))
    }
}

impl From<usize> for FieldValue {
    fn from(n: usize) -> Self {
        FieldValue::Number(Number::from(n))
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        Number::from_f64(n).map_or(FieldValue::Null, FieldValue::Number)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<Vec<FieldValue>> for FieldValue {
    fn from(items: Vec<FieldValue>) -> Self {
        FieldValue::List(items)
    }
}

impl From<IndexMap<String, FieldValue>> for FieldValue {
    fn from(map: IndexMap<String, FieldValue>) -> Self {
        FieldValue::Map(map)
    }
}

impl From<Entity> for FieldValue {
    fn from(entity: Entity) -> Self {
        FieldValue::Entity(Box::new(entity))
    }
}

impl From<Collection> for FieldValue {
    fn from(collection: Collection) -> Self {
        FieldValue::Collection(Box::new(collection))
    }
}

/// Groups produced by [`Collection::group_by`] become a map of entity lists.
impl From<IndexMap<String, Vec<Entity>>> for FieldValue {
    fn from(groups: IndexMap<String, Vec<Entity>>) -> Self {
        FieldValue::Map(
            groups
                .into_iter()
                .map(|(key, members)| {
                    (key, FieldValue::List(members.into_iter().map(FieldValue::from).collect()))
                })
                .collect(),
        )
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(FieldValue::Undefined, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_keeps_key_order() {
        let value = FieldValue::from(json!({"b": 1, "a": 2, "c": [1, "x"]}));
        let keys: Vec<&String> = value.as_map().unwrap().keys().collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_undefined_dropped_from_json_but_kept_in_plain() {
        let mut map = IndexMap::new();
        map.insert("a".to_string(), FieldValue::from(1));
        map.insert("b".to_string(), FieldValue::Undefined);
        map.insert("c".to_string(), FieldValue::List(vec![FieldValue::Undefined, FieldValue::from(2)]));
        let value = FieldValue::Map(map);

        assert_eq!(value.to_json(), json!({"a": 1, "c": [null, 2]}));
        assert_eq!(value.to_plain().as_map().unwrap().len(), 3);
        assert_eq!(value.to_json_string().unwrap(), r#"{"a":1,"c":[null,2]}"#);
    }

    #[test]
    fn test_group_key_stringifies_like_js() {
        assert_eq!(FieldValue::Undefined.group_key(), "undefined");
        assert_eq!(FieldValue::Null.group_key(), "null");
        assert_eq!(FieldValue::from(2.0).group_key(), "2");
        assert_eq!(FieldValue::from(1.5).group_key(), "1.5");
        assert_eq!(FieldValue::from("red").group_key(), "red");
        assert_eq!(FieldValue::from(json!([1, null, "a"])).group_key(), "1,,a");
        assert_eq!(FieldValue::from(json!({"a": 1})).group_key(), "[object Object]");
    }

    #[test]
    fn test_relational_cmp() {
        assert_eq!(FieldValue::from(1).relational_cmp(&FieldValue::from(2.5)), Ordering::Less);
        assert_eq!(FieldValue::from("b").relational_cmp(&FieldValue::from("a")), Ordering::Greater);
        assert_eq!(FieldValue::from(true).relational_cmp(&FieldValue::from(1)), Ordering::Equal);
        assert_eq!(FieldValue::from(9).relational_cmp(&FieldValue::from("a")), Ordering::Less);
    }

    #[test]
    fn test_numbers_compare_by_value() {
        assert_eq!(FieldValue::from(1), FieldValue::from(1.0));
        assert_ne!(FieldValue::Null, FieldValue::Undefined);
    }
}

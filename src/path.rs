//! Path lookups into loosely-structured source records.
//!
//! A [`FieldPath`] is the step list of a path rule: each step indexes the
//! current traversal target, either by field name or by list index.

use std::borrow::Cow;
use std::fmt;

use crate::entity::Entity;
use crate::value::FieldValue;

/// Ordered steps of a path rule.
///
/// # Examples
///
/// - `["child", "subChild", 1]` - second member of `child.subChild`
/// - `["titles", 1, "updateTime"]` - a field of the second title
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    segments: Vec<PathSegment>,
}

/// A step in a field path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// A named field (e.g., "user", "name")
    Field(String),
    /// A list index (e.g., 0, 5)
    Index(usize),
}

impl PathSegment {
    /// Key used when the step indexes a map.
    fn as_key(&self) -> Cow<'_, str> {
        match self {
            PathSegment::Field(name) => Cow::Borrowed(name),
            PathSegment::Index(index) => Cow::Owned(index.to_string()),
        }
    }

    /// Index used when the step indexes a list; numeric field names count.
    fn as_index(&self) -> Option<usize> {
        match self {
            PathSegment::Field(name) => name.parse().ok(),
            PathSegment::Index(index) => Some(*index),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(name: &str) -> Self {
        PathSegment::Field(name.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(name: String) -> Self {
        PathSegment::Field(name)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Field(name) => write!(f, "{}", name),
            PathSegment::Index(index) => write!(f, "[{}]", index),
        }
    }
}

enum Cursor<'a> {
    Value(&'a FieldValue),
    Member(&'a Entity),
    Missing,
}

impl FieldPath {
    pub fn new<I, S>(steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<PathSegment>,
    {
        Self {
            segments: steps.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a field path with a given delimiter
    ///
    /// Segments written as `[n]` are list indexes.
    ///
    /// ```
    /// use modelist::path::{FieldPath, PathSegment};
    ///
    /// let path = FieldPath::parse("child/subChild/[1]", "/");
    /// assert_eq!(path.segments()[2], PathSegment::Index(1));
    /// ```
    pub fn parse(path: &str, delimiter: &str) -> Self {
        let segments = path
            .split(delimiter)
            .filter(|s| !s.is_empty())
            .map(|s| {
                if s.starts_with('[') && s.ends_with(']') {
                    if let Ok(index) = s[1..s.len() - 1].parse::<usize>() {
                        return PathSegment::Index(index);
                    }
                }
                PathSegment::Field(s.to_string())
            })
            .collect();

        Self { segments }
    }

    /// Create a field path from a dotted string (common format)
    pub fn from_dotted(path: &str) -> Self {
        Self::parse(path, ".")
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Walks `source` step by step.
    ///
    /// When the current target cannot be stepped into (not a map, entity,
    /// list or collection) the walk stops and `fallback` (the property's value
    /// before formatting) is returned. A missing key on the final step yields `Undefined`.
    pub fn resolve(&self, source: &FieldValue, fallback: &FieldValue) -> FieldValue {
        let mut cursor = Cursor::Value(source);
        for segment in &self.segments {
            cursor = match cursor {
                Cursor::Value(FieldValue::Map(map)) => {
                    map.get(&*segment.as_key()).map_or(Cursor::Missing, Cursor::Value)
                }
                Cursor::Value(FieldValue::Entity(entity)) => entity
                    .get(&segment.as_key())
                    .map_or(Cursor::Missing, Cursor::Value),
                Cursor::Member(entity) => entity
                    .get(&segment.as_key())
                    .map_or(Cursor::Missing, Cursor::Value),
                Cursor::Value(FieldValue::List(items)) => segment
                    .as_index()
                    .and_then(|index| items.get(index))
                    .map_or(Cursor::Missing, Cursor::Value),
                Cursor::Value(FieldValue::Collection(collection)) => segment
                    .as_index()
                    .and_then(|index| collection.get(index))
                    .map_or(Cursor::Missing, Cursor::Member),
                _ => {
                    tracing::debug!(path = %self, "path target is not traversable, keeping current value");
                    return fallback.clone();
                }
            };
        }

        match cursor {
            Cursor::Value(value) => value.clone(),
            Cursor::Member(entity) => FieldValue::from(entity.clone()),
            Cursor::Missing => FieldValue::Undefined,
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.segments.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_path_parse() {
        let path = FieldPath::parse("user.address.city", ".");

        assert_eq!(path.len(), 3);
        assert_eq!(path.segments()[0], PathSegment::Field("user".to_string()));
        assert_eq!(path.segments()[1], PathSegment::Field("address".to_string()));
        assert_eq!(path.segments()[2], PathSegment::Field("city".to_string()));
    }

    #[test]
    fn test_field_path_with_index() {
        let path = FieldPath::from_dotted("items.[0].name");

        assert_eq!(path.segments()[1], PathSegment::Index(0));
        assert_eq!(path.to_string(), "items.[0].name");
    }

    #[test]
    fn test_resolve_nested_list() {
        let source = FieldValue::from(json!({"child": {"subChild": ["lion", "hippo", "monkey"]}}));
        let path = FieldPath::new(vec![
            PathSegment::from("child"),
            PathSegment::from("subChild"),
            PathSegment::Index(1),
        ]);

        assert_eq!(path.resolve(&source, &FieldValue::Undefined), FieldValue::from("hippo"));
    }

    #[test]
    fn test_resolve_falls_back_when_target_is_scalar() {
        let source = FieldValue::from(json!({"a": {"b": 7}}));
        let path = FieldPath::new(["a", "b", "c"]);
        let previous = FieldValue::from("kept");

        assert_eq!(path.resolve(&source, &previous), previous);
    }

    #[test]
    fn test_resolve_missing_last_step_is_undefined() {
        let source = FieldValue::from(json!({"a": {"b": 7}}));
        let path = FieldPath::new(["a", "x"]);

        assert!(path.resolve(&source, &FieldValue::from(1)).is_undefined());
    }

    #[test]
    fn test_resolve_steps_through_collection_members() {
        let items = crate::collection::Collection::from_json(json!([{"n": "x"}, {"n": "y"}]), None).unwrap();
        let mut source = indexmap::IndexMap::new();
        source.insert("items".to_string(), FieldValue::from(items));
        let source = FieldValue::Map(source);

        let path = FieldPath::from_dotted("items.[1].n");
        assert_eq!(path.resolve(&source, &FieldValue::Undefined), FieldValue::from("y"));

        let member = FieldPath::from_dotted("items.[0]");
        assert_eq!(
            member.resolve(&source, &FieldValue::Undefined).to_json(),
            json!({"n": "x"})
        );

        let past_end = FieldPath::from_dotted("items.[5]");
        assert!(past_end.resolve(&source, &FieldValue::from(1)).is_undefined());

        // A missing member cannot be stepped into.
        let below_missing = FieldPath::from_dotted("items.[5].n");
        assert_eq!(below_missing.resolve(&source, &FieldValue::from(1)), FieldValue::from(1));
    }

    #[test]
    fn test_resolve_steps_into_nested_entity() {
        let child = crate::entity::EntityType::new("Child")
            .with_field("name", "")
            .into_shared()
            .create(json!({"name": "leaf"}));
        let mut source = indexmap::IndexMap::new();
        source.insert("child".to_string(), FieldValue::from(child));
        let source = FieldValue::Map(source);

        let path = FieldPath::new(["child", "name"]);
        assert_eq!(path.resolve(&source, &FieldValue::Undefined), FieldValue::from("leaf"));

        let too_deep = FieldPath::new(["child", "name", "first"]);
        let previous = FieldValue::from("kept");
        assert_eq!(too_deep.resolve(&source, &previous), previous);
    }

    #[test]
    fn test_numeric_field_name_indexes_list() {
        let source = FieldValue::from(json!({"titles": [{"t": "a"}, {"t": "b"}]}));
        let path = FieldPath::new(["titles", "1", "t"]);

        assert_eq!(path.resolve(&source, &FieldValue::Undefined), FieldValue::from("b"));
    }
}

//! Collections: ordered, homogeneous sequences of entities.
//!
//! Every element is an instance of the collection's element type. Plain
//! records are promoted by constructing the element type with them as the
//! source. When no element type is given, it is taken from the first
//! admitted item: that item's own type if it is an entity, otherwise an
//! anonymous type built from its keys.

use std::cmp::Ordering;
use std::fmt;
use std::ops::Index;
use std::rc::Rc;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeSeq, Serializer};
use serde_json::Value as JsonValue;

use crate::entity::{Entity, EntityType};
use crate::observe::{ListChange, ListListener, Observers};
use crate::rule::RuleSet;
use crate::value::FieldValue;

/// Error type for collection construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionError {
    /// The first record is neither a plain object nor an entity, so no
    /// element type can be established.
    FirstElementNotObject { found: String },
}

impl fmt::Display for CollectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectionError::FirstElementNotObject { found } => write!(
                f,
                "The first item of the data list is not an object or entity: {}",
                found
            ),
        }
    }
}

impl std::error::Error for CollectionError {}

/// Direction for [`Collection::sort_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortOrder {
    type Err = std::convert::Infallible;

    /// Anything but `desc` sorts ascending.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(if s.eq_ignore_ascii_case("desc") {
            SortOrder::Desc
        } else {
            SortOrder::Asc
        })
    }
}

/// Ordered sequence of entities of one type.
pub struct Collection {
    elements: Vec<Entity>,
    element_type: Option<Rc<EntityType>>,
    strict: bool,
    listeners: Observers<ListListener>,
}

impl Collection {
    /// An empty collection whose element type is fixed by the first item added.
    pub fn new() -> Self {
        Self {
            elements: Vec::new(),
            element_type: None,
            strict: false,
            listeners: Observers::default(),
        }
    }

    pub fn with_type(element_type: Rc<EntityType>) -> Self {
        Self {
            element_type: Some(element_type),
            ..Self::new()
        }
    }

    /// Builds a collection from records.
    ///
    /// # Errors
    /// Returns [`CollectionError::FirstElementNotObject`] when the first
    /// record is not object-shaped.
    pub fn from_values<I, V>(data: I, element_type: Option<Rc<EntityType>>) -> Result<Self, CollectionError>
    where
        I: IntoIterator<Item = V>,
        V: Into<FieldValue>,
    {
        Self::build(data.into_iter().map(Into::into).collect(), element_type, false)
    }

    /// Like [`Collection::from_values`], with the structural superset check on.
    pub fn from_values_strict<I, V>(
        data: I,
        element_type: Option<Rc<EntityType>>,
    ) -> Result<Self, CollectionError>
    where
        I: IntoIterator<Item = V>,
        V: Into<FieldValue>,
    {
        Self::build(data.into_iter().map(Into::into).collect(), element_type, true)
    }

    /// Builds a collection from a JSON array; any other value is one record.
    pub fn from_json(data: JsonValue, element_type: Option<Rc<EntityType>>) -> Result<Self, CollectionError> {
        match data {
            JsonValue::Array(items) => Self::from_values(items, element_type),
            other => Self::from_values(vec![other], element_type),
        }
    }

    fn build(
        items: Vec<FieldValue>,
        element_type: Option<Rc<EntityType>>,
        strict: bool,
    ) -> Result<Self, CollectionError> {
        if let Some(first) = items.first() {
            if !first.is_object() {
                return Err(CollectionError::FirstElementNotObject {
                    found: first.to_string(),
                });
            }
        }

        let mut collection = Self::new();
        collection.strict = strict;
        collection.element_type = element_type.or_else(|| items.first().and_then(infer_type));
        collection.add(FieldValue::List(items));
        Ok(collection)
    }

    pub fn element_type(&self) -> Option<&Rc<EntityType>> {
        self.element_type.as_ref()
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Enables the structural superset check against element 0.
    pub fn set_strict(&mut self, strict: bool) -> &mut Self {
        self.strict = strict;
        self
    }

    pub fn add_update_listener<F>(&mut self, listener: F) -> &mut Self
    where
        F: Fn(&ListChange<'_>) + 'static,
    {
        self.listeners.push(Rc::new(listener));
        self
    }

    fn notify(&self, change: ListChange<'_>) {
        for listener in self.listeners.iter() {
            listener(&change);
        }
    }

    /// Appends one record, a list of records, or every element of another
    /// collection. Non-object items are skipped; in strict mode items missing
    /// a key of element 0 are skipped with a warning.
    pub fn add(&mut self, data: impl Into<FieldValue>) -> &mut Self {
        let items = match data.into() {
            FieldValue::Undefined | FieldValue::Null => return self,
            FieldValue::List(items) => items,
            FieldValue::Collection(collection) => {
                collection.elements.into_iter().map(FieldValue::from).collect()
            }
            other => vec![other],
        };

        for item in items {
            if !item.is_object() {
                tracing::debug!("skipping non-object item: {}", item);
                continue;
            }
            if self.strict && !self.matches_shape(&item) {
                tracing::warn!("the item does not have every property of the first element: {}", item);
                continue;
            }
            if let Some(entity) = self.coerce(item) {
                self.elements.push(entity);
                let index = self.elements.len() - 1;
                self.notify(ListChange::Inserted {
                    index,
                    entity: &self.elements[index],
                });
            }
        }
        self
    }

    pub fn add_all(&mut self, data: impl Into<FieldValue>) -> &mut Self {
        self.add(data)
    }

    /// Structural superset check: the candidate owns every key element 0 owns.
    fn matches_shape(&self, item: &FieldValue) -> bool {
        match self.elements.first() {
            Some(first) => first.keys().all(|key| item.has_own_key(key)),
            None => true,
        }
    }

    /// Turns an item into an element-type instance, fixing the element type
    /// from the item when none is set yet.
    fn coerce(&mut self, item: FieldValue) -> Option<Entity> {
        if self.element_type.is_none() {
            self.element_type = infer_type(&item);
        }
        let kind = match &self.element_type {
            Some(kind) => kind,
            None => {
                tracing::warn!("no element type could be established for: {}", item);
                return None;
            }
        };
        match item {
            FieldValue::Entity(entity) if entity.is_instance_of(kind) => Some(*entity),
            other => Some(kind.create(other)),
        }
    }

    /// Inserts before `index`; indexes past the end append.
    pub fn insert(&mut self, index: usize, item: impl Into<FieldValue>) -> &mut Self {
        if let Some(entity) = self.coerce(item.into()) {
            let index = index.min(self.elements.len());
            self.elements.insert(index, entity);
            self.notify(ListChange::Inserted {
                index,
                entity: &self.elements[index],
            });
        }
        self
    }

    /// Replaces the element at `index`; out-of-range indexes and nullish
    /// items are ignored.
    pub fn set(&mut self, index: usize, item: impl Into<FieldValue>) -> &mut Self {
        let item = item.into();
        if index >= self.elements.len() || item.is_nullish() {
            return self;
        }
        if let Some(entity) = self.coerce(item) {
            self.elements[index] = entity;
            self.notify(ListChange::Replaced {
                index,
                entity: &self.elements[index],
            });
        }
        self
    }

    pub fn get(&self, index: usize) -> Option<&Entity> {
        self.elements.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Entity> {
        self.elements.get_mut(index)
    }

    pub fn pop(&mut self) -> Option<Entity> {
        let entity = self.elements.pop()?;
        self.notify(ListChange::Removed {
            index: self.elements.len(),
        });
        Some(entity)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entity> {
        self.elements.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Entity> {
        self.elements.iter_mut()
    }

    pub fn each<F>(&self, mut func: F) -> &Self
    where
        F: FnMut(&Entity, usize),
    {
        for (index, entity) in self.elements.iter().enumerate() {
            func(entity, index);
        }
        self
    }

    /// Runs a format pass on every element.
    pub fn format(&mut self, rules: Option<&RuleSet>, merge: bool) -> &mut Self {
        for entity in &mut self.elements {
            entity.format(rules, merge);
        }
        self
    }

    /// Removes `[start, end)`. A missing or zero `end` means `start + 1`.
    /// Out-of-range starts remove nothing.
    pub fn remove(&mut self, start: usize, end: Option<usize>) -> &mut Self {
        let end = match end {
            Some(end) if end > 0 => end,
            _ => start.saturating_add(1),
        };
        let end = end.min(self.elements.len());
        if start >= end {
            return self;
        }
        self.elements.drain(start..end);
        for index in start..end {
            self.notify(ListChange::Removed { index });
        }
        self
    }

    /// Removes elements equal to any of `items`.
    pub fn remove_item(&mut self, items: &[Entity]) -> &mut Self {
        self.remove_by(|entity, _| items.contains(entity))
    }

    /// Removes every element matching `predicate`. The index passed is the
    /// element's current position.
    pub fn remove_by<F>(&mut self, mut predicate: F) -> &mut Self
    where
        F: FnMut(&Entity, usize) -> bool,
    {
        let mut index = 0;
        while index < self.elements.len() {
            if predicate(&self.elements[index], index) {
                self.elements.remove(index);
                self.notify(ListChange::Removed { index });
            } else {
                index += 1;
            }
        }
        self
    }

    pub fn remove_by_key_value(&mut self, key: &str, value: &FieldValue) -> &mut Self {
        self.remove_by(|entity, _| entity.has_key_value(key, value))
    }

    /// Replaces every element matching `predicate` with `item`.
    pub fn replace_by<F>(&mut self, item: impl Into<FieldValue>, mut predicate: F) -> &mut Self
    where
        F: FnMut(&Entity, usize) -> bool,
    {
        let matches: Vec<usize> = self
            .elements
            .iter()
            .enumerate()
            .filter(|(index, entity)| predicate(entity, *index))
            .map(|(index, _)| index)
            .collect();
        if matches.is_empty() {
            return self;
        }

        let replacement = match self.coerce(item.into()) {
            Some(entity) => entity,
            None => return self,
        };
        for index in matches {
            self.elements[index] = replacement.clone();
            self.notify(ListChange::Replaced {
                index,
                entity: &self.elements[index],
            });
        }
        self
    }

    /// New collection of the same type holding copies of matching elements.
    pub fn get_by<F>(&self, mut predicate: F) -> Collection
    where
        F: FnMut(&Entity, usize) -> bool,
    {
        let mut result = self.empty_like();
        for (index, entity) in self.elements.iter().enumerate() {
            if predicate(entity, index) {
                result.add(entity.clone());
            }
        }
        result
    }

    /// Elements owning at least one of `keys`.
    pub fn get_by_key(&self, keys: &[&str]) -> Collection {
        self.get_by(|entity, _| keys.iter().any(|key| entity.contains_key(key)))
    }

    /// Elements holding at least one of `values` in any property.
    pub fn get_by_value(&self, values: &[FieldValue]) -> Collection {
        self.get_by(|entity, _| entity.values().any(|value| values.contains(value)))
    }

    pub fn get_by_key_value(&self, key: &str, value: &FieldValue) -> Collection {
        self.get_by(|entity, _| entity.has_key_value(key, value))
    }

    /// Per element, the values of `keys` (or all values when `keys` is empty).
    pub fn get_values(&self, keys: &[&str]) -> Vec<Vec<FieldValue>> {
        self.elements
            .iter()
            .map(|entity| {
                if keys.is_empty() {
                    entity.values().cloned().collect()
                } else {
                    entity.get_many(keys)
                }
            })
            .collect()
    }

    /// Complement of [`Collection::get_by`].
    pub fn inverse<F>(&self, mut predicate: F) -> Collection
    where
        F: FnMut(&Entity, usize) -> bool,
    {
        self.get_by(|entity, index| !predicate(entity, index))
    }

    /// True when some element structurally equals `item`.
    pub fn contains(&self, item: &FieldValue) -> bool {
        self.elements.iter().any(|entity| entity.equals(item))
    }

    pub fn contains_with<F>(&self, item: &FieldValue, mut compare: F) -> bool
    where
        F: FnMut(&Entity, usize, &FieldValue) -> bool,
    {
        self.elements
            .iter()
            .enumerate()
            .any(|(index, entity)| compare(entity, index, item))
    }

    /// True when every item is contained.
    pub fn has_item(&self, items: &[FieldValue]) -> bool {
        items.iter().all(|item| self.contains(item))
    }

    pub fn index_of_by<F>(&self, mut predicate: F) -> Option<usize>
    where
        F: FnMut(&Entity, usize) -> bool,
    {
        self.elements
            .iter()
            .enumerate()
            .position(|(index, entity)| predicate(entity, index))
    }

    pub fn index_of_by_key(&self, key: &str, value: &FieldValue) -> Option<usize> {
        self.index_of_by(|entity, _| entity.has_key_value(key, value))
    }

    /// Removes every element. The element type is kept.
    pub fn empty(&mut self) -> &mut Self {
        let len = self.elements.len();
        self.remove(0, Some(len))
    }

    /// Same as [`Collection::empty`].
    pub fn clear(&mut self) -> &mut Self {
        self.empty()
    }

    /// Same length and pairwise structural equality with a list or collection.
    pub fn equals(&self, other: &FieldValue) -> bool {
        match other {
            FieldValue::List(items) => {
                items.len() == self.len()
                    && self
                        .elements
                        .iter()
                        .zip(items)
                        .all(|(entity, item)| entity.equals(item))
            }
            FieldValue::Collection(collection) => self.equals_collection(collection),
            _ => false,
        }
    }

    pub fn equals_collection(&self, other: &Collection) -> bool {
        other.len() == self.len()
            && self
                .elements
                .iter()
                .zip(&other.elements)
                .all(|(mine, theirs)| mine.equals_entity(theirs))
    }

    /// Drops elements that structurally equal an earlier element.
    pub fn unique(&mut self) -> &mut Self {
        self.unique_by(|one, two| one.equals_entity(two))
    }

    /// Walks indexes from the end; element `i` is removed at the first
    /// `j < i` for which `predicate(elements[i], elements[j])` holds. Only the
    /// later element of a pair is ever removed.
    pub fn unique_by<F>(&mut self, mut predicate: F) -> &mut Self
    where
        F: FnMut(&Entity, &Entity) -> bool,
    {
        let mut last = self.elements.len();
        while last > 0 {
            last -= 1;
            for index in 0..last {
                if predicate(&self.elements[last], &self.elements[index]) {
                    self.elements.remove(last);
                    self.notify(ListChange::Removed { index: last });
                    break;
                }
            }
        }
        self
    }

    /// Duplicates are elements agreeing on every one of `keys`.
    pub fn unique_by_key(&mut self, keys: &[&str]) -> &mut Self {
        self.unique_by(|one, two| {
            keys.iter().all(|key| {
                one.get(key).unwrap_or(&FieldValue::Undefined)
                    == two.get(key).unwrap_or(&FieldValue::Undefined)
            })
        })
    }

    /// Partitions all elements by the stringified value of `key`.
    pub fn group_by(&self, key: &str) -> IndexMap<String, Vec<Entity>> {
        self.group_by_with(key, |_, _| true)
    }

    /// Partitions the elements admitted by `predicate`, preserving order
    /// within each group.
    pub fn group_by_with<F>(&self, key: &str, mut predicate: F) -> IndexMap<String, Vec<Entity>>
    where
        F: FnMut(&Entity, usize) -> bool,
    {
        let mut groups: IndexMap<String, Vec<Entity>> = IndexMap::new();
        for (index, entity) in self.elements.iter().enumerate() {
            if !predicate(entity, index) {
                continue;
            }
            let group = entity.get(key).unwrap_or(&FieldValue::Undefined).group_key();
            groups.entry(group).or_default().push(entity.clone());
        }
        groups
    }

    pub fn count_by<F>(&self, mut predicate: F) -> usize
    where
        F: FnMut(&Entity, usize) -> bool,
    {
        self.elements
            .iter()
            .enumerate()
            .filter(|(index, entity)| predicate(entity, *index))
            .count()
    }

    /// Stable sort on the value of `key`.
    ///
    /// Missing, `null` and `undefined` values come first ascending and last
    /// descending.
    pub fn sort_by(&mut self, key: &str, order: SortOrder) -> &mut Self {
        self.elements.sort_by(|a, b| {
            let left = a.get(key).filter(|v| !v.is_nullish());
            let right = b.get(key).filter(|v| !v.is_nullish());
            let ordering = match (left, right) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(left), Some(right)) => left.relational_cmp(right),
            };
            match order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });
        self
    }

    /// Exchanges two elements; both indexes are clamped into range.
    pub fn swap(&mut self, from: usize, to: usize) -> &mut Self {
        if self.elements.is_empty() {
            return self;
        }
        let last = self.elements.len() - 1;
        let (from, to) = (from.min(last), to.min(last));
        if from == to {
            return self;
        }
        self.elements.swap(from, to);
        self.notify(ListChange::Replaced {
            index: to,
            entity: &self.elements[to],
        });
        self.notify(ListChange::Replaced {
            index: from,
            entity: &self.elements[from],
        });
        self
    }

    /// Plain list of plain element maps.
    pub fn to_plain(&self) -> FieldValue {
        FieldValue::List(self.elements.iter().map(Entity::to_plain).collect())
    }

    pub fn to_json(&self) -> JsonValue {
        JsonValue::Array(self.elements.iter().map(Entity::to_json).collect())
    }

    /// JSON string of the elements; `None` (logged) if serialization fails.
    pub fn to_json_string(&self) -> Option<String> {
        match serde_json::to_string(self) {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::error!("toString error: {}", e);
                None
            }
        }
    }

    pub fn to_array(&self) -> Vec<Entity> {
        self.elements.clone()
    }

    fn empty_like(&self) -> Collection {
        Collection {
            element_type: self.element_type.clone(),
            ..Collection::new()
        }
    }
}

fn infer_type(item: &FieldValue) -> Option<Rc<EntityType>> {
    match item {
        FieldValue::Entity(entity) => Some(Rc::clone(entity.kind())),
        other => EntityType::anonymous(other).map(Rc::new),
    }
}

impl Default for Collection {
    fn default() -> Self {
        Self::new()
    }
}

/// Copies every element. Listeners are not carried over.
impl Clone for Collection {
    fn clone(&self) -> Self {
        Self {
            elements: self.elements.clone(),
            element_type: self.element_type.clone(),
            strict: self.strict,
            listeners: Observers::default(),
        }
    }
}

impl PartialEq for Collection {
    fn eq(&self, other: &Self) -> bool {
        self.elements == other.elements
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("element_type", &self.element_type.as_ref().map(|kind| kind.name()))
            .field("strict", &self.strict)
            .field("elements", &self.elements)
            .finish()
    }
}

impl Serialize for Collection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.elements.len()))?;
        for entity in &self.elements {
            seq.serialize_element(entity)?;
        }
        seq.end()
    }
}

impl Index<usize> for Collection {
    type Output = Entity;

    fn index(&self, index: usize) -> &Entity {
        &self.elements[index]
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Entity;
    type IntoIter = std::slice::Iter<'a, Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

impl IntoIterator for Collection {
    type Item = Entity;
    type IntoIter = std::vec::IntoIter<Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;

    fn numbers(values: &[Option<i64>]) -> Collection {
        let records: Vec<JsonValue> = values
            .iter()
            .map(|v| match v {
                Some(n) => json!({ "x": n }),
                None => json!({}),
            })
            .collect();
        let kind = EntityType::new("X").with_field("x", FieldValue::Null).into_shared();
        let mut collection = Collection::with_type(kind);
        collection.add(json!(records));
        collection
    }

    fn xs(collection: &Collection) -> Vec<Option<i64>> {
        collection
            .iter()
            .map(|e| e.get("x").and_then(FieldValue::as_i64))
            .collect()
    }

    #[test]
    fn test_sort_nullish_first_ascending_last_descending() {
        let mut collection = numbers(&[Some(3), None, Some(1)]);
        collection.sort_by("x", SortOrder::Asc);
        assert_eq!(xs(&collection), vec![None, Some(1), Some(3)]);

        collection.sort_by("x", SortOrder::Desc);
        assert_eq!(xs(&collection), vec![Some(3), Some(1), None]);
    }

    #[test]
    fn test_sort_order_from_str() {
        assert_eq!("desc".parse::<SortOrder>().unwrap(), SortOrder::Desc);
        assert_eq!("anything".parse::<SortOrder>().unwrap(), SortOrder::Asc);
    }

    #[test]
    fn test_swap_clamps_indexes() {
        let mut collection = numbers(&[Some(1), Some(2), Some(3)]);
        collection.swap(0, 99);
        assert_eq!(xs(&collection), vec![Some(3), Some(2), Some(1)]);
    }

    #[test]
    fn test_remove_half_open_range() {
        let mut collection = numbers(&[Some(1), Some(2), Some(3), Some(4)]);
        collection.remove(1, Some(3));
        assert_eq!(xs(&collection), vec![Some(1), Some(4)]);
        collection.remove(7, None);
        assert_eq!(collection.len(), 2);
        collection.remove(0, None);
        assert_eq!(xs(&collection), vec![Some(4)]);
    }

    #[test]
    fn test_remove_extreme_and_zero_end() {
        let mut collection = numbers(&[Some(1), Some(2), Some(3)]);
        collection.remove(usize::MAX, None);
        collection.remove(usize::MAX, Some(usize::MAX));
        assert_eq!(collection.len(), 3);

        // A zero end counts as omitted.
        collection.remove(0, Some(0));
        assert_eq!(xs(&collection), vec![Some(2), Some(3)]);
    }

    #[test]
    fn test_list_changes_are_reported() {
        let changes = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&changes);

        let mut collection = numbers(&[Some(1)]);
        collection.add_update_listener(move |change| {
            let tag = match change {
                ListChange::Inserted { .. } => "inserted",
                ListChange::Replaced { .. } => "replaced",
                ListChange::Removed { .. } => "removed",
            };
            seen.borrow_mut().push((tag, change.index()));
        });
        collection.add(json!({"x": 2}));
        collection.set(0, json!({"x": 5}));
        collection.pop();

        assert_eq!(
            *changes.borrow(),
            vec![("inserted", 1), ("replaced", 0), ("removed", 1)]
        );
    }

    #[test]
    fn test_non_object_first_element_is_fatal() {
        let result = Collection::from_json(json!([1, {"a": 1}]), None);
        assert!(matches!(result, Err(CollectionError::FirstElementNotObject { .. })));
    }
}

//! Ordered entity collections with a field-driven algebra.
//!
//! Every operation resolves a field name against each element through
//! [`Entity::resolve`] (typed accessor first, raw field fallback, `@` prefix
//! for the attributes side-channel) and returns a new list; receivers are
//! never mutated. Per-element failures follow a skip-don't-abort policy:
//! an unparsable number drops out of an aggregate, an incomparable value
//! drops out of a comparison filter, and the rest of the list is unaffected.
//! The data comes from a live, schema-evolving source, so tolerating
//! heterogeneous and partial records is part of the contract.

use crate::entity::Entity;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::fmt;
use std::ops::Index;

/// A field value as seen by the collection algebra.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Null,
    Text(String),
    Int(i64),
    Bool(bool),
    Date(DateTime<Utc>),
    Entity(Entity),
    List(EntityList),
}

impl Resolved {
    pub fn is_null(&self) -> bool {
        matches!(self, Resolved::Null)
    }

    /// The string form used by the filter predicates. Null has none.
    pub fn string_form(&self) -> Option<String> {
        match self {
            Resolved::Null => None,
            Resolved::Text(s) => Some(s.clone()),
            Resolved::Int(i) => Some(i.to_string()),
            Resolved::Bool(b) => Some(b.to_string()),
            Resolved::Date(dt) => Some(dt.to_rfc3339()),
            Resolved::Entity(e) => Some(e.to_string()),
            Resolved::List(list) => {
                let labels: Vec<String> = list.iter().map(|e| e.to_string()).collect();
                Some(format!("[{}]", labels.join(", ")))
            }
        }
    }

    /// Numeric form for aggregates: an integer, or any other value whose
    /// string form parses as one.
    pub fn as_number(&self) -> Option<i64> {
        match self {
            Resolved::Int(i) => Some(*i),
            other => other.string_form()?.trim().parse().ok(),
        }
    }
}

/// Ordering rule shared by `sort`, `min`/`max` and the comparison filters:
/// same-variant scalars compare naturally, entities compare by numeric id,
/// everything else falls back to lexicographic comparison of string forms.
/// Nulls are incomparable.
fn compare(a: &Resolved, b: &Resolved) -> Option<Ordering> {
    match (a, b) {
        (Resolved::Int(x), Resolved::Int(y)) => Some(x.cmp(y)),
        (Resolved::Date(x), Resolved::Date(y)) => Some(x.cmp(y)),
        (Resolved::Bool(x), Resolved::Bool(y)) => Some(x.cmp(y)),
        (Resolved::Entity(x), Resolved::Entity(y)) => x
            .cmp_by_id(y)
            .or_else(|| Some(x.to_string().cmp(&y.to_string()))),
        _ => Some(a.string_form()?.cmp(&b.string_form()?)),
    }
}

/// Result of [`EntityList::collect`]: an entity list when every collected
/// value was an entity, a plain scalar sequence otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum Collected {
    Entities(EntityList),
    Scalars(Vec<Resolved>),
}

impl Collected {
    pub fn len(&self) -> usize {
        match self {
            Collected::Entities(list) => list.len(),
            Collected::Scalars(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_entities(self) -> Option<EntityList> {
        match self {
            Collected::Entities(list) => Some(list),
            Collected::Scalars(_) => None,
        }
    }

    pub fn into_scalars(self) -> Vec<Resolved> {
        match self {
            Collected::Entities(list) => {
                list.items.into_iter().map(Resolved::Entity).collect()
            }
            Collected::Scalars(values) => values,
        }
    }
}

/// An ordered sequence of entities supporting field-driven filter, sort,
/// aggregate and set operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityList {
    items: Vec<Entity>,
}

impl EntityList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Entity> {
        self.items.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Entity> {
        self.items.get_mut(index)
    }

    pub fn first(&self) -> Option<&Entity> {
        self.items.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entity> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Entity> {
        self.items.iter_mut()
    }

    pub fn push(&mut self, entity: Entity) {
        self.items.push(entity);
    }

    /// Remove the first element equal to `entity`. Returns whether one was
    /// found.
    pub fn remove(&mut self, entity: &Entity) -> bool {
        match self.items.iter().position(|e| e == entity) {
            Some(index) => {
                self.items.remove(index);
                true
            }
            None => false,
        }
    }

    /// Membership by entity equality, not identity.
    pub fn contains_entity(&self, entity: &Entity) -> bool {
        self.items.iter().any(|e| e == entity)
    }

    /// Resolve `field` on every element, flattening list-valued resolutions
    /// one level.
    pub fn collect(&self, field: &str) -> Collected {
        let mut values = Vec::new();
        let mut all_entities = true;
        for entity in &self.items {
            match entity.resolve(field) {
                Resolved::List(list) => {
                    values.extend(list.items.into_iter().map(Resolved::Entity));
                }
                other => {
                    all_entities = all_entities && matches!(other, Resolved::Entity(_));
                    values.push(other);
                }
            }
        }
        if all_entities {
            let entities = values
                .into_iter()
                .filter_map(|v| match v {
                    Resolved::Entity(e) => Some(e),
                    _ => None,
                })
                .collect();
            Collected::Entities(entities)
        } else {
            Collected::Scalars(values)
        }
    }

    /// Keep the first element for each distinct resolved value of `field`,
    /// preserving first-seen order.
    pub fn unique(&self, field: &str) -> EntityList {
        let mut seen: Vec<Resolved> = Vec::new();
        let mut subset = EntityList::new();
        for entity in &self.items {
            let value = entity.resolve(field);
            if !seen.contains(&value) {
                seen.push(value);
                subset.push(entity.clone());
            }
        }
        subset
    }

    /// This list plus every element of `other` not already present here.
    pub fn union(&self, other: &EntityList) -> EntityList {
        let mut result = self.clone();
        for entity in &other.items {
            if !self.contains_entity(entity) {
                result.push(entity.clone());
            }
        }
        result
    }

    /// Elements present in both lists, in this list's order.
    pub fn intersection(&self, other: &EntityList) -> EntityList {
        let mut result = EntityList::new();
        for entity in &self.items {
            if other.contains_entity(entity) {
                result.push(entity.clone());
            }
        }
        result
    }

    /// Synonym for [`EntityList::intersection`].
    pub fn common(&self, other: &EntityList) -> EntityList {
        self.intersection(other)
    }

    /// Elements of this list with every occurrence of each element found in
    /// `other` removed.
    pub fn subtract(&self, other: &EntityList) -> EntityList {
        let items = self
            .items
            .iter()
            .filter(|e| !other.contains_entity(e))
            .cloned()
            .collect();
        EntityList { items }
    }

    /// Symmetric difference, as a single pass over `other`: elements of
    /// `other` already present here are removed from the result (every
    /// matching occurrence, duplicates included), elements not present are
    /// appended. Deliberately not `union − intersection`.
    pub fn difference(&self, other: &EntityList) -> EntityList {
        let mut result = self.clone();
        for entity in &other.items {
            if self.contains_entity(entity) {
                result.items.retain(|e| e != entity);
            } else {
                result.push(entity.clone());
            }
        }
        result
    }

    /// Sum of the numeric resolutions of `field`, skipping elements that do
    /// not parse as a number.
    pub fn sum(&self, field: &str) -> i64 {
        self.numeric_values(field).into_iter().sum()
    }

    /// Integer average of the numeric resolutions of `field`. Elements that
    /// do not parse are excluded from both numerator and denominator; an
    /// empty or all-failing list averages to 0.
    pub fn average(&self, field: &str) -> i64 {
        let values = self.numeric_values(field);
        if values.is_empty() {
            return 0;
        }
        let count = values.len() as i64;
        values.into_iter().sum::<i64>() / count
    }

    fn numeric_values(&self, field: &str) -> Vec<i64> {
        let mut values = Vec::new();
        for entity in &self.items {
            let resolved = entity.resolve(field);
            match resolved.as_number() {
                Some(n) => values.push(n),
                None => {
                    if !resolved.is_null() {
                        tracing::debug!("Skipping non-numeric '{}' value in aggregate", field);
                    }
                }
            }
        }
        values
    }

    /// Elements whose resolved string form contains `substring`.
    pub fn contains(&self, field: &str, substring: &str) -> EntityList {
        self.filter_by_string(field, |s| s.contains(substring))
    }

    /// Elements whose resolved string form fully matches `pattern`. An
    /// invalid pattern matches nothing.
    pub fn matches(&self, field: &str, pattern: &str) -> EntityList {
        let anchored = format!("^(?:{})$", pattern);
        let re = match regex::Regex::new(&anchored) {
            Ok(re) => re,
            Err(err) => {
                tracing::warn!("Invalid pattern '{}' for field '{}': {}", pattern, field, err);
                return EntityList::new();
            }
        };
        self.filter_by_string(field, |s| re.is_match(s))
    }

    /// Elements whose resolved string form equals `value`.
    pub fn equals(&self, field: &str, value: &str) -> EntityList {
        self.filter_by_string(field, |s| s == value)
    }

    fn filter_by_string(&self, field: &str, keep: impl Fn(&str) -> bool) -> EntityList {
        let mut subset = EntityList::new();
        for entity in &self.items {
            // Null resolutions never match.
            if let Some(s) = entity.resolve(field).string_form() {
                if keep(&s) {
                    subset.push(entity.clone());
                }
            }
        }
        subset
    }

    /// Elements ordering strictly above `value` under the sort rule.
    /// Incomparable elements are excluded, not an error.
    pub fn greater(&self, field: &str, value: &str) -> EntityList {
        self.compare_filter(field, value, Ordering::Greater)
    }

    /// Elements ordering strictly below `value` under the sort rule.
    pub fn less(&self, field: &str, value: &str) -> EntityList {
        self.compare_filter(field, value, Ordering::Less)
    }

    fn compare_filter(&self, field: &str, value: &str, want: Ordering) -> EntityList {
        let first = match self.items.first() {
            Some(first) => first,
            None => return self.clone(),
        };
        // Build a synthetic single-field target of the same type, so the
        // comparison value resolves through the same accessor as the
        // elements do.
        let mut base = Entity::new(first.entity_type());
        if let Some(attr) = field.strip_prefix('@') {
            base.attributes_mut()
                .insert(attr.to_string(), value.to_string());
        } else {
            base.set_string(field, value);
        }
        let target = base.resolve(field);

        let mut subset = EntityList::new();
        for entity in &self.items {
            if compare(&entity.resolve(field), &target) == Some(want) {
                subset.push(entity.clone());
            }
        }
        subset
    }

    /// Stable sort by the resolved field: same-variant scalars compare
    /// naturally, entities by numeric id, anything else by string form;
    /// pairs involving a null keep their input order.
    pub fn sort(&self, field: &str, reverse: bool) -> EntityList {
        let mut items = self.items.clone();
        items.sort_by(|a, b| {
            let ord = compare(&a.resolve(field), &b.resolve(field)).unwrap_or(Ordering::Equal);
            if reverse {
                ord.reverse()
            } else {
                ord
            }
        });
        EntityList { items }
    }

    /// Synonym for `sort(field, false)`.
    pub fn ascending(&self, field: &str) -> EntityList {
        self.sort(field, false)
    }

    /// Synonym for `sort(field, true)`.
    pub fn descending(&self, field: &str) -> EntityList {
        self.sort(field, true)
    }

    /// Minimum element under the sort rule. `None` on an empty list.
    pub fn min(&self, field: &str) -> Option<&Entity> {
        self.items.iter().min_by(|a, b| {
            compare(&a.resolve(field), &b.resolve(field)).unwrap_or(Ordering::Equal)
        })
    }

    /// Maximum element under the sort rule. `None` on an empty list.
    pub fn max(&self, field: &str) -> Option<&Entity> {
        self.items.iter().max_by(|a, b| {
            compare(&a.resolve(field), &b.resolve(field)).unwrap_or(Ordering::Equal)
        })
    }
}

impl From<Vec<Entity>> for EntityList {
    fn from(items: Vec<Entity>) -> Self {
        Self { items }
    }
}

impl FromIterator<Entity> for EntityList {
    fn from_iter<I: IntoIterator<Item = Entity>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for EntityList {
    type Item = Entity;
    type IntoIter = std::vec::IntoIter<Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a EntityList {
    type Item = &'a Entity;
    type IntoIter = std::slice::Iter<'a, Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl Index<usize> for EntityList {
    type Output = Entity;

    fn index(&self, index: usize) -> &Entity {
        &self.items[index]
    }
}

impl fmt::Display for EntityList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<String> = self.items.iter().map(|e| e.to_string()).collect();
        write!(f, "[{}]", labels.join(", "))
    }
}

//! Generic entity over an untyped wire record.
//!
//! An [`Entity`] wraps a record of named wire values and exposes typed
//! accessors over it. Nested records and arrays stay in wire form until the
//! first typed read, at which point they are promoted to nested entities or
//! entity lists and memoized in place. Encoding back to wire form is driven
//! by the entity's static [`EntityType`] descriptor: per-type reference
//! policy (collapse a nested entity to a single scalar field), suppressed
//! fields, identity fields, and the field-accessor table used by the
//! collection algebra in [`crate::list`].

use crate::list::{EntityList, Resolved};
use crate::raw::RawValue;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use indexmap::IndexMap;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// Error type for entity field access and promotion.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityError {
    /// A typed accessor could not parse a raw string into the requested type.
    Format {
        field: String,
        value: String,
        expected: &'static str,
    },
    /// None of the known wire date formats matched.
    DateFormat { field: String, value: String },
    /// A raw field's shape is incompatible with the requested promotion or
    /// with the entity type's reference policy.
    TypeMismatch {
        field: String,
        entity_type: &'static str,
        found: &'static str,
    },
}

impl fmt::Display for EntityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityError::Format {
                field,
                value,
                expected,
            } => write!(f, "Field '{}': cannot parse '{}' as {}", field, value, expected),
            EntityError::DateFormat { field, value } => {
                write!(f, "Field '{}': '{}' matches no known date format", field, value)
            }
            EntityError::TypeMismatch {
                field,
                entity_type,
                found,
            } => write!(
                f,
                "Field '{}': cannot build a {} from a {} value",
                field, entity_type, found
            ),
        }
    }
}

impl std::error::Error for EntityError {}

/// A typed accessor in an [`EntityType`]'s field descriptor table.
pub type AccessorFn = fn(&Entity) -> Resolved;

/// Static per-type descriptor. One instance per entity type, assembled at
/// type-registration time and read-only thereafter.
#[derive(Debug)]
pub struct EntityType {
    /// Type tag, unique across the registry.
    pub name: &'static str,

    /// Reference policy: nested type name -> field sent as a scalar
    /// reference instead of an embedded record.
    pub refs: &'static [(&'static str, &'static str)],

    /// Fields never included in wire encoding.
    pub no_send: &'static [&'static str],

    /// Fields compared for entity equality.
    pub identity: &'static [&'static str],

    /// Field descriptor table: field name -> typed accessor. Consulted by
    /// [`Entity::resolve`] before falling back to a raw field lookup.
    pub accessors: &'static [(&'static str, AccessorFn)],
}

impl EntityType {
    /// The reference field used when a nested entity of `type_name` is
    /// collapsed to a scalar, if this type declares one.
    pub fn reference_field(&self, type_name: &str) -> Option<&'static str> {
        self.refs
            .iter()
            .find(|(name, _)| *name == type_name)
            .map(|(_, field)| *field)
    }

    /// Look up a typed accessor by field name.
    pub fn accessor(&self, field: &str) -> Option<AccessorFn> {
        self.accessors
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, f)| *f)
    }
}

/// A stored field value: wire form until first typed read, then promoted.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Null,
    Text(String),
    /// Un-promoted nested record or array, exactly as received.
    Raw(RawValue),
    Entity(Entity),
    List(EntityList),
}

impl Field {
    fn from_raw(value: RawValue) -> Self {
        match value {
            RawValue::Null => Field::Null,
            RawValue::Text(s) => Field::Text(s),
            other => Field::Raw(other),
        }
    }

    fn shape(&self) -> &'static str {
        match self {
            Field::Null => "null",
            Field::Text(_) => "string",
            Field::Raw(raw) => raw.shape(),
            Field::Entity(_) => "entity",
            Field::List(_) => "entity list",
        }
    }
}

/// Outcome of a date field read.
///
/// The wire occasionally carries dates in formats this crate does not know.
/// For compatibility with the upstream behavior the read degrades to the
/// current time, but the degradation is observable: callers that must not
/// accept a fabricated date check for [`DateField::Fallback`] (or use
/// [`Entity::get_date_strict`]).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DateField {
    Parsed(DateTime<Utc>),
    Fallback(DateTime<Utc>),
}

impl DateField {
    pub fn value(&self) -> DateTime<Utc> {
        match self {
            DateField::Parsed(dt) | DateField::Fallback(dt) => *dt,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, DateField::Fallback(_))
    }
}

/// A typed, schema-flexible record with typed accessors over an underlying
/// raw field mapping.
#[derive(Debug, Clone)]
pub struct Entity {
    ty: &'static EntityType,
    fields: IndexMap<String, Field>,
    /// Metadata that travels with the entity but is never wire-encoded.
    /// Structurally separate from the fields, so no suppression entry is
    /// needed.
    attributes: IndexMap<String, String>,
}

impl Entity {
    /// Default-construct an empty entity of the given type.
    pub fn new(ty: &'static EntityType) -> Self {
        Self {
            ty,
            fields: IndexMap::new(),
            attributes: IndexMap::new(),
        }
    }

    /// Construct from a wire record's field map.
    pub fn from_record(ty: &'static EntityType, record: IndexMap<String, RawValue>) -> Self {
        let fields = record
            .into_iter()
            .map(|(k, v)| (k, Field::from_raw(v)))
            .collect();
        Self {
            ty,
            fields,
            attributes: IndexMap::new(),
        }
    }

    /// Construct from a wire value, which must be a record.
    pub fn from_raw(ty: &'static EntityType, value: RawValue) -> Result<Self, EntityError> {
        match value {
            RawValue::Record(record) => Ok(Self::from_record(ty, record)),
            other => Err(EntityError::TypeMismatch {
                field: String::new(),
                entity_type: ty.name,
                found: other.shape(),
            }),
        }
    }

    pub fn entity_type(&self) -> &'static EntityType {
        self.ty
    }

    pub fn has_field(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn attributes(&self) -> &IndexMap<String, String> {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut IndexMap<String, String> {
        &mut self.attributes
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.fields.get(key) {
            Some(Field::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn set_string(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), Field::Text(value.into()));
    }

    /// Parse an integer field. Absent (or non-text) fields read as `None`;
    /// an unparsable string is a [`EntityError::Format`].
    pub fn get_int(&self, key: &str) -> Result<Option<i64>, EntityError> {
        match self.get_string(key) {
            None => Ok(None),
            Some(s) => s
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|_| EntityError::Format {
                    field: key.to_string(),
                    value: s.to_string(),
                    expected: "integer",
                }),
        }
    }

    pub fn set_int(&mut self, key: impl Into<String>, value: i64) {
        self.fields.insert(key.into(), Field::Text(value.to_string()));
    }

    /// Lenient boolean read: `"true"`, `"1"` and `"yes"` (case-insensitive)
    /// are truthy; everything else, including an absent field, is false.
    pub fn get_boolean(&self, key: &str) -> bool {
        match self.get_string(key) {
            Some(s) => s.eq_ignore_ascii_case("true") || s == "1" || s.eq_ignore_ascii_case("yes"),
            None => false,
        }
    }

    pub fn set_boolean(&mut self, key: impl Into<String>, value: bool) {
        self.fields.insert(key.into(), Field::Text(value.to_string()));
    }

    /// Read a URL field, validating that the string carries a scheme.
    pub fn get_url(&self, key: &str) -> Result<Option<String>, EntityError> {
        static URL_RE: OnceLock<Regex> = OnceLock::new();
        let re = URL_RE
            .get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*://\S+$").expect("url pattern"));
        match self.get_string(key) {
            None => Ok(None),
            Some(s) if re.is_match(s) => Ok(Some(s.to_string())),
            Some(s) => Err(EntityError::Format {
                field: key.to_string(),
                value: s.to_string(),
                expected: "URL",
            }),
        }
    }

    pub fn set_url(&mut self, key: impl Into<String>, url: impl Into<String>) {
        self.fields.insert(key.into(), Field::Text(url.into()));
    }

    /// Read a date field, trying the known wire formats in order.
    ///
    /// Absent or empty fields read as `None`. A non-empty value that matches
    /// no format degrades to the current time via [`DateField::Fallback`]
    /// and logs a warning.
    pub fn get_date(&self, key: &str) -> Option<DateField> {
        let value = self.get_string(key)?;
        if value.is_empty() {
            return None;
        }
        match parse_wire_date(value) {
            Some(dt) => Some(DateField::Parsed(dt)),
            None => {
                tracing::warn!(
                    "Field '{}': '{}' matches no known date format, falling back to now",
                    key,
                    value
                );
                Some(DateField::Fallback(Utc::now()))
            }
        }
    }

    /// Like [`Entity::get_date`] but a format miss is a hard error instead
    /// of a fallback.
    pub fn get_date_strict(&self, key: &str) -> Result<Option<DateTime<Utc>>, EntityError> {
        let value = match self.get_string(key) {
            None => return Ok(None),
            Some(s) if s.is_empty() => return Ok(None),
            Some(s) => s,
        };
        parse_wire_date(value)
            .map(Some)
            .ok_or_else(|| EntityError::DateFormat {
                field: key.to_string(),
                value: value.to_string(),
            })
    }

    pub fn set_date(&mut self, key: impl Into<String>, value: DateTime<Utc>) {
        let formatted = value.format("%a %b %e %H:%M:%S UTC %Y").to_string();
        self.fields.insert(key.into(), Field::Text(formatted));
    }

    /// Raw array access, for fields that have not been promoted.
    pub fn get_list(&self, key: &str) -> Option<&[RawValue]> {
        match self.fields.get(key) {
            Some(Field::Raw(RawValue::Array(items))) => Some(items),
            _ => None,
        }
    }

    pub fn set_list(&mut self, key: impl Into<String>, items: Vec<RawValue>) {
        self.fields
            .insert(key.into(), Field::Raw(RawValue::Array(items)));
    }

    /// Read a nested entity, promoting the stored wire value on first
    /// access and memoizing the result in place.
    ///
    /// An absent or null field reads as `None`. An already-promoted entity
    /// of any type is returned as-is. A scalar promotes through the
    /// reference policy registered for `ty`; a nested record promotes
    /// directly; anything else is a [`EntityError::TypeMismatch`].
    pub fn get_entity(
        &mut self,
        key: &str,
        ty: &'static EntityType,
    ) -> Result<Option<&Entity>, EntityError> {
        Ok(self.get_entity_mut(key, ty)?.map(|e| &*e))
    }

    /// Mutable variant of [`Entity::get_entity`], used to splice fetched
    /// data into an embedded stub via [`Entity::merge`].
    pub fn get_entity_mut(
        &mut self,
        key: &str,
        ty: &'static EntityType,
    ) -> Result<Option<&mut Entity>, EntityError> {
        let promoted = match self.fields.get(key) {
            None | Some(Field::Null) => return Ok(None),
            Some(Field::Entity(_)) => None,
            Some(Field::Text(s)) => Some(coerce(self.ty, ty, key, &RawValue::Text(s.clone()))?),
            Some(Field::Raw(raw)) => Some(coerce(self.ty, ty, key, raw)?),
            Some(Field::List(_)) => {
                return Err(EntityError::TypeMismatch {
                    field: key.to_string(),
                    entity_type: ty.name,
                    found: "entity list",
                })
            }
        };
        if let Some(entity) = promoted {
            self.fields.insert(key.to_string(), Field::Entity(entity));
        }
        match self.fields.get_mut(key) {
            Some(Field::Entity(e)) => Ok(Some(e)),
            _ => Ok(None),
        }
    }

    pub fn set_entity(&mut self, key: impl Into<String>, entity: Entity) {
        self.fields.insert(key.into(), Field::Entity(entity));
    }

    /// Read a nested entity list, promoting a stored wire array element-wise
    /// on first access and memoizing the result.
    ///
    /// An absent or null field lazily becomes an empty stored list, so
    /// repeated calls are idempotent and the returned list may be mutated to
    /// populate the field.
    pub fn get_entity_list(
        &mut self,
        key: &str,
        ty: &'static EntityType,
    ) -> Result<&mut EntityList, EntityError> {
        let promoted = match self.fields.get(key) {
            None | Some(Field::Null) => Some(EntityList::new()),
            Some(Field::List(_)) => None,
            Some(Field::Raw(RawValue::Array(items))) => {
                let mut list = EntityList::new();
                for item in items {
                    list.push(coerce(self.ty, ty, key, item)?);
                }
                Some(list)
            }
            Some(other) => {
                return Err(EntityError::TypeMismatch {
                    field: key.to_string(),
                    entity_type: ty.name,
                    found: other.shape(),
                })
            }
        };
        if let Some(list) = promoted {
            self.fields.insert(key.to_string(), Field::List(list));
        }
        match self.fields.get_mut(key) {
            Some(Field::List(list)) => Ok(list),
            _ => unreachable!("field was just promoted to a list"),
        }
    }

    pub fn set_entity_list(&mut self, key: impl Into<String>, list: EntityList) {
        self.fields.insert(key.into(), Field::List(list));
    }

    /// Append to a nested list field, promoting it first if needed.
    pub fn add_to_list(
        &mut self,
        key: &str,
        ty: &'static EntityType,
        entity: Entity,
    ) -> Result<(), EntityError> {
        self.get_entity_list(key, ty)?.push(entity);
        Ok(())
    }

    /// Remove the first matching element from a nested list field. Returns
    /// whether an element was removed.
    pub fn remove_from_list(
        &mut self,
        key: &str,
        ty: &'static EntityType,
        entity: &Entity,
    ) -> Result<bool, EntityError> {
        Ok(self.get_entity_list(key, ty)?.remove(entity))
    }

    /// Non-memoizing read of a nested entity, for `&self` contexts such as
    /// the field accessor table. Promotion failures read as `None`.
    pub fn peek_entity(&self, key: &str, ty: &'static EntityType) -> Option<Entity> {
        match self.fields.get(key)? {
            Field::Entity(e) => Some(e.clone()),
            Field::Text(s) => coerce(self.ty, ty, key, &RawValue::Text(s.clone())).ok(),
            Field::Raw(raw @ RawValue::Record(_)) => coerce(self.ty, ty, key, raw).ok(),
            _ => None,
        }
    }

    /// Non-memoizing read of a nested entity list. An absent field reads as
    /// an empty list, matching [`Entity::get_entity_list`]; a wrong-shaped
    /// field reads as `None`.
    pub fn peek_entity_list(&self, key: &str, ty: &'static EntityType) -> Option<EntityList> {
        match self.fields.get(key) {
            None | Some(Field::Null) => Some(EntityList::new()),
            Some(Field::List(list)) => Some(list.clone()),
            Some(Field::Raw(RawValue::Array(items))) => {
                let mut list = EntityList::new();
                for item in items {
                    list.push(coerce(self.ty, ty, key, item).ok()?);
                }
                Some(list)
            }
            _ => None,
        }
    }

    /// Resolve a field name the way the collection algebra does: an
    /// `@`-prefixed name reads the attributes side-channel; otherwise the
    /// type's accessor table is consulted first, then a raw field lookup.
    pub fn resolve(&self, field: &str) -> Resolved {
        if let Some(name) = field.strip_prefix('@') {
            return match self.attributes.get(name) {
                Some(value) => Resolved::Text(value.clone()),
                None => Resolved::Null,
            };
        }
        if let Some(accessor) = self.ty.accessor(field) {
            return accessor(self);
        }
        match self.fields.get(field) {
            None | Some(Field::Null) => Resolved::Null,
            Some(Field::Text(s)) => Resolved::Text(s.clone()),
            Some(Field::Entity(e)) => Resolved::Entity(e.clone()),
            Some(Field::List(list)) => Resolved::List(list.clone()),
            Some(Field::Raw(raw)) => Resolved::Text(raw.to_string()),
        }
    }

    // Resolved-producing helpers for building accessor tables.

    pub fn int_value(&self, key: &str) -> Resolved {
        match self.get_int(key) {
            Ok(Some(i)) => Resolved::Int(i),
            Ok(None) => Resolved::Null,
            // Unparsable: surface the raw text so filters and sorts can
            // still see the value, matching the raw-lookup fallback.
            Err(_) => match self.get_string(key) {
                Some(s) => Resolved::Text(s.to_string()),
                None => Resolved::Null,
            },
        }
    }

    pub fn text_value(&self, key: &str) -> Resolved {
        match self.get_string(key) {
            Some(s) => Resolved::Text(s.to_string()),
            None => Resolved::Null,
        }
    }

    pub fn bool_value(&self, key: &str) -> Resolved {
        Resolved::Bool(self.get_boolean(key))
    }

    pub fn date_value(&self, key: &str) -> Resolved {
        match self.get_date(key) {
            Some(df) => Resolved::Date(df.value()),
            None => Resolved::Null,
        }
    }

    pub fn entity_value(&self, key: &str, ty: &'static EntityType) -> Resolved {
        match self.peek_entity(key, ty) {
            Some(e) => Resolved::Entity(e),
            None => Resolved::Null,
        }
    }

    pub fn list_value(&self, key: &str, ty: &'static EntityType) -> Resolved {
        match self.peek_entity_list(key, ty) {
            Some(list) => Resolved::List(list),
            None => Resolved::Null,
        }
    }

    /// Encode to a fresh wire record: every non-null field except the
    /// suppressed ones, with nested entities and lists recursively encoded
    /// and reference-policy types collapsed to their reference field.
    pub fn to_wire(&self) -> RawValue {
        let mut record = IndexMap::new();
        for (key, value) in &self.fields {
            if self.ty.no_send.contains(&key.as_str()) {
                continue;
            }
            let encoded = match value {
                Field::Null => continue,
                Field::Text(s) => RawValue::Text(s.clone()),
                Field::Raw(raw) => raw.clone(),
                Field::Entity(e) => self.encode_child(e),
                Field::List(list) => {
                    RawValue::Array(list.iter().map(|e| self.encode_child(e)).collect())
                }
            };
            record.insert(key.clone(), encoded);
        }
        RawValue::Record(record)
    }

    /// Wire encoding as a `serde_json::Value`, for handing to a transport.
    pub fn to_wire_json(&self) -> serde_json::Value {
        self.to_wire().to_json()
    }

    fn encode_child(&self, child: &Entity) -> RawValue {
        let wire = child.to_wire();
        match self.ty.reference_field(child.ty.name) {
            Some(ref_field) => match wire {
                RawValue::Record(mut map) => map.shift_remove(ref_field).unwrap_or(RawValue::Null),
                other => other,
            },
            None => wire,
        }
    }

    /// Shallow field-by-field overwrite: every field present in `other`
    /// wins; fields absent from `other` are untouched. Used to splice a
    /// fully-populated entity into a partially-populated stub.
    pub fn merge(&mut self, other: &Entity) {
        for (key, value) in &other.fields {
            self.fields.insert(key.clone(), value.clone());
        }
        for (key, value) in &other.attributes {
            self.attributes.insert(key.clone(), value.clone());
        }
    }

    /// Natural ordering by the numeric `id` field, where both sides have
    /// one.
    pub fn cmp_by_id(&self, other: &Entity) -> Option<std::cmp::Ordering> {
        let a = self.get_int("id").ok()??;
        let b = other.get_int("id").ok()??;
        Some(a.cmp(&b))
    }
}

/// Two entities are equal iff they are the same type and their identity
/// fields match.
impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.ty.name == other.ty.name
            && self
                .ty
                .identity
                .iter()
                .all(|f| self.get_string(f) == other.get_string(f))
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = self
            .get_string("name")
            .or_else(|| self.get_string("key"))
            .or_else(|| self.get_string("id"))
            .unwrap_or(self.ty.name);
        write!(f, "{}", label)
    }
}

/// Promote a wire value to an entity of `ty`, owned by an entity of
/// `owner`: a record embeds directly, a scalar goes through the owner's
/// reference policy, anything else is a shape mismatch.
fn coerce(
    owner: &'static EntityType,
    ty: &'static EntityType,
    field: &str,
    value: &RawValue,
) -> Result<Entity, EntityError> {
    match value {
        RawValue::Record(map) => Ok(Entity::from_record(ty, map.clone())),
        RawValue::Text(s) => match owner.reference_field(ty.name) {
            Some(ref_field) => {
                let mut entity = Entity::new(ty);
                entity.set_string(ref_field, s.clone());
                Ok(entity)
            }
            None => Err(EntityError::TypeMismatch {
                field: field.to_string(),
                entity_type: ty.name,
                found: "string",
            }),
        },
        other => Err(EntityError::TypeMismatch {
            field: field.to_string(),
            entity_type: ty.name,
            found: other.shape(),
        }),
    }
}

/// Try the known wire date formats in order.
fn parse_wire_date(value: &str) -> Option<DateTime<Utc>> {
    // "Tue, 11 Oct 2005 06:10:39 +0000"
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.with_timezone(&Utc));
    }
    // "2005-10-11 06:10:39.115"
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    // "Tue Oct 11 06:10:39 UTC 2005": the zone name cannot be parsed
    // directly, so drop that token and read the rest.
    let parts: Vec<&str> = value.split_whitespace().collect();
    if parts.len() == 6 {
        let without_zone = format!(
            "{} {} {} {} {}",
            parts[0], parts[1], parts[2], parts[3], parts[5]
        );
        if let Ok(naive) = NaiveDateTime::parse_from_str(&without_zone, "%a %b %e %H:%M:%S %Y") {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ISSUE, PRIORITY, USER, VERSION};
    use serde_json::json;

    fn issue_from(json: serde_json::Value) -> Entity {
        Entity::from_raw(&ISSUE, RawValue::from_json(json)).unwrap()
    }

    #[test]
    fn test_typed_scalar_accessors() {
        let mut issue = issue_from(json!({"id": 28093, "votes": "3", "key": "PROJ-1"}));

        assert_eq!(issue.get_int("id").unwrap(), Some(28093));
        assert_eq!(issue.get_string("key"), Some("PROJ-1"));
        assert_eq!(issue.get_int("missing").unwrap(), None);

        issue.set_int("id", 7);
        assert_eq!(issue.get_string("id"), Some("7"));
    }

    #[test]
    fn test_int_parse_failure_is_typed() {
        let issue = issue_from(json!({"id": "not-a-number"}));
        let err = issue.get_int("id").unwrap_err();
        assert_eq!(
            err,
            EntityError::Format {
                field: "id".to_string(),
                value: "not-a-number".to_string(),
                expected: "integer",
            }
        );
    }

    #[test]
    fn test_boolean_leniency() {
        let mut version = Entity::new(&VERSION);
        for truthy in ["true", "TRUE", "1", "yes", "Yes"] {
            version.set_string("released", truthy);
            assert!(version.get_boolean("released"), "{} should be truthy", truthy);
        }
        for falsy in ["false", "0", "no", "2", ""] {
            version.set_string("released", falsy);
            assert!(!version.get_boolean("released"), "{} should be falsy", falsy);
        }
        assert!(!version.get_boolean("archived"));
    }

    #[test]
    fn test_url_validation() {
        let mut issue = Entity::new(&ISSUE);
        issue.set_url("link", "https://issues.example.org/browse/PROJ-1");
        assert_eq!(
            issue.get_url("link").unwrap().as_deref(),
            Some("https://issues.example.org/browse/PROJ-1")
        );

        issue.set_string("link", "not a url");
        assert!(matches!(
            issue.get_url("link"),
            Err(EntityError::Format { .. })
        ));
    }

    #[test]
    fn test_date_formats() {
        let issue = issue_from(json!({
            "created": "2005-10-11 06:10:39.115",
            "updated": "Tue, 11 Oct 2005 06:10:39 +0000",
            "duedate": "Tue Oct 11 06:10:39 UTC 2005"
        }));

        for field in ["created", "updated", "duedate"] {
            let date = issue.get_date(field).unwrap();
            assert!(!date.is_fallback(), "{} should parse", field);
            assert_eq!(
                date.value().format("%Y-%m-%d %H:%M:%S").to_string(),
                "2005-10-11 06:10:39"
            );
        }
    }

    #[test]
    fn test_date_fallback_is_observable() {
        let issue = issue_from(json!({"created": "eleventh of October"}));

        let date = issue.get_date("created").unwrap();
        assert!(date.is_fallback());

        assert!(matches!(
            issue.get_date_strict("created"),
            Err(EntityError::DateFormat { .. })
        ));
        assert!(issue.get_date("missing").is_none());
    }

    #[test]
    fn test_set_date_round_trips() {
        let mut issue = Entity::new(&ISSUE);
        let dt = Utc.with_ymd_and_hms(2005, 10, 11, 6, 10, 39).unwrap();
        issue.set_date("created", dt);

        let read = issue.get_date("created").unwrap();
        assert!(!read.is_fallback());
        assert_eq!(read.value(), dt);
    }

    #[test]
    fn test_entity_promotion_memoizes() {
        let mut issue = issue_from(json!({"priority": {"id": "3", "name": "Major"}}));

        {
            let priority = issue.get_entity("priority", &PRIORITY).unwrap().unwrap();
            assert_eq!(priority.get_string("name"), Some("Major"));
        }

        // Mutate the promoted entity; a second read must see the mutation,
        // proving the raw value was not re-parsed.
        issue
            .get_entity_mut("priority", &PRIORITY)
            .unwrap()
            .unwrap()
            .set_string("name", "Critical");
        let again = issue.get_entity("priority", &PRIORITY).unwrap().unwrap();
        assert_eq!(again.get_string("name"), Some("Critical"));
    }

    #[test]
    fn test_scalar_promotes_through_reference_policy() {
        // Issue registers User -> "name", so a bare string promotes.
        let mut issue = issue_from(json!({"assignee": "dblevins"}));
        let assignee = issue.get_entity("assignee", &USER).unwrap().unwrap();
        assert_eq!(assignee.get_string("name"), Some("dblevins"));
    }

    #[test]
    fn test_scalar_without_reference_policy_is_mismatch() {
        // Issue registers no reference policy for Version.
        let mut issue = issue_from(json!({"fixVersion": "1.2"}));
        assert!(matches!(
            issue.get_entity("fixVersion", &VERSION),
            Err(EntityError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_entity_list_promotion_and_lazy_create() {
        let mut issue = issue_from(json!({
            "fixVersions": [{"id": "1", "name": "1.0"}, {"id": "2", "name": "1.1"}]
        }));

        assert_eq!(
            issue.get_entity_list("fixVersions", &VERSION).unwrap().len(),
            2
        );

        // Absent field: lazily created, stored, and populatable.
        issue
            .get_entity_list("affectsVersions", &VERSION)
            .unwrap()
            .push(Entity::new(&VERSION));
        assert_eq!(
            issue
                .get_entity_list("affectsVersions", &VERSION)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_wire_round_trip_is_idempotent() {
        let issue = issue_from(json!({
            "id": "28093",
            "key": "PROJ-1",
            "summary": "marshalling layer drops nested fields",
            "votes": "2"
        }));

        let wire = issue.to_wire();
        let rebuilt = Entity::from_raw(&ISSUE, wire.clone()).unwrap();
        assert_eq!(rebuilt.to_wire(), wire);
    }

    #[test]
    fn test_null_and_suppressed_fields_are_not_sent() {
        let mut issue = issue_from(json!({
            "key": "PROJ-1",
            "resolution": null,
            "link": "https://issues.example.org/browse/PROJ-1"
        }));
        issue
            .attributes_mut()
            .insert("origin".to_string(), "feed".to_string());

        let wire = issue.to_wire();
        let record = wire.as_record().unwrap();
        assert!(record.contains_key("key"));
        assert!(!record.contains_key("resolution"), "null fields are dropped");
        assert!(!record.contains_key("link"), "suppressed fields are dropped");
        assert!(
            !record.contains_key("origin"),
            "attributes never hit the wire"
        );
    }

    #[test]
    fn test_reference_collapse_on_encode() {
        let mut issue = issue_from(json!({
            "key": "PROJ-1",
            "assignee": {"name": "dblevins", "fullname": "David Blevins"},
            "priority": {"id": "3", "name": "Major"}
        }));
        issue.get_entity("assignee", &USER).unwrap();
        issue.get_entity("priority", &PRIORITY).unwrap();

        let wire = issue.to_wire();
        let record = wire.as_record().unwrap();
        assert_eq!(record.get("assignee"), Some(&RawValue::text("dblevins")));
        assert_eq!(record.get("priority"), Some(&RawValue::text("3")));
    }

    #[test]
    fn test_merge_overwrites_present_fields_only() {
        let mut stub = issue_from(json!({"id": "3", "key": "PROJ-1"}));
        let fetched = issue_from(json!({"id": "3", "summary": "full summary"}));

        stub.merge(&fetched);
        assert_eq!(stub.get_string("key"), Some("PROJ-1"));
        assert_eq!(stub.get_string("summary"), Some("full summary"));
    }

    #[test]
    fn test_equality_uses_identity_fields() {
        let a = issue_from(json!({"id": "1", "key": "PROJ-1", "summary": "x"}));
        let b = issue_from(json!({"id": "1", "key": "PROJ-1", "summary": "different"}));
        let c = issue_from(json!({"id": "2", "key": "PROJ-2"}));

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_resolve_prefers_accessor_then_raw_then_attributes() {
        let mut issue = issue_from(json!({"id": "42", "custom": "raw-only"}));
        issue
            .attributes_mut()
            .insert("page".to_string(), "2".to_string());

        assert_eq!(issue.resolve("id"), Resolved::Int(42));
        assert_eq!(
            issue.resolve("custom"),
            Resolved::Text("raw-only".to_string())
        );
        assert_eq!(issue.resolve("@page"), Resolved::Text("2".to_string()));
        assert_eq!(issue.resolve("@missing"), Resolved::Null);
    }
}

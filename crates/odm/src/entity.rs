//! Entity capabilities: typed field access, lifecycle state and the hooks an
//! entity type declares for caching and the timeline.

use crate::error::OdmError;
use crate::schema::{ID_FIELD, Schema};
use crate::timeline::TimelineEvent;
use chrono::{DateTime, Utc};
use opsdesk_store::{Document, ObjectId, Value};
use std::fmt;

/// Conversion between a typed struct field and a [`Value`].
///
/// `from_value` receives an already coerced value; `Null` means "unset".
pub trait FieldValue: Sized {
    fn into_value(self) -> Value;

    fn from_value(value: Value) -> Result<Option<Self>, OdmError>;
}

fn mismatch<T>(expected: &str, found: &Value) -> Result<Option<T>, OdmError> {
    Err(OdmError::InvalidValue {
        message: format!("expected {expected}, found {}", found.type_name()).into(),
        context: None,
    })
}

impl FieldValue for String {
    fn into_value(self) -> Value {
        Value::String(self)
    }

    fn from_value(value: Value) -> Result<Option<Self>, OdmError> {
        match value {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s)),
            other => mismatch("text", &other),
        }
    }
}

impl FieldValue for i64 {
    fn into_value(self) -> Value {
        Value::Int(self)
    }

    fn from_value(value: Value) -> Result<Option<Self>, OdmError> {
        match value {
            Value::Null => Ok(None),
            Value::Int(i) => Ok(Some(i)),
            other => mismatch("integer", &other),
        }
    }
}

impl FieldValue for f64 {
    fn into_value(self) -> Value {
        Value::Double(self)
    }

    fn from_value(value: Value) -> Result<Option<Self>, OdmError> {
        match value {
            Value::Null => Ok(None),
            ref number @ (Value::Double(_) | Value::Int(_)) => Ok(number.as_f64()),
            other => mismatch("decimal", &other),
        }
    }
}

impl FieldValue for bool {
    fn into_value(self) -> Value {
        Value::Bool(self)
    }

    fn from_value(value: Value) -> Result<Option<Self>, OdmError> {
        match value {
            Value::Null => Ok(None),
            Value::Bool(b) => Ok(Some(b)),
            other => mismatch("boolean", &other),
        }
    }
}

impl FieldValue for DateTime<Utc> {
    fn into_value(self) -> Value {
        Value::from(self)
    }

    fn from_value(value: Value) -> Result<Option<Self>, OdmError> {
        match value {
            Value::Null => Ok(None),
            Value::DateTime(dt) => Ok(Some(dt.to_utc())),
            Value::Timestamp(ts) => Ok(Some(ts.to_datetime())),
            other => mismatch("datetime", &other),
        }
    }
}

impl FieldValue for ObjectId {
    fn into_value(self) -> Value {
        Value::Id(self)
    }

    fn from_value(value: Value) -> Result<Option<Self>, OdmError> {
        match value {
            Value::Null => Ok(None),
            Value::Id(id) => Ok(Some(id)),
            Value::String(s) if s.trim().is_empty() => Ok(None),
            other => mismatch("identifier", &other),
        }
    }
}

impl FieldValue for Vec<ObjectId> {
    fn into_value(self) -> Value {
        Value::Array(self.into_iter().map(Value::Id).collect())
    }

    fn from_value(value: Value) -> Result<Option<Self>, OdmError> {
        match value {
            Value::Null => Ok(None),
            Value::Id(id) => Ok(Some(vec![id])),
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Id(id) => Ok(id),
                    other => Err(OdmError::InvalidValue {
                        message: format!("expected identifier, found {}", other.type_name()).into(),
                        context: None,
                    }),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            other => mismatch("array of identifiers", &other),
        }
    }
}

impl FieldValue for Vec<Value> {
    fn into_value(self) -> Value {
        Value::Array(self)
    }

    fn from_value(value: Value) -> Result<Option<Self>, OdmError> {
        match value {
            Value::Null => Ok(None),
            Value::Array(items) => Ok(Some(items)),
            other => mismatch("array", &other),
        }
    }
}

impl FieldValue for Document {
    fn into_value(self) -> Value {
        Value::Document(self)
    }

    fn from_value(value: Value) -> Result<Option<Self>, OdmError> {
        match value {
            Value::Null => Ok(None),
            Value::Document(doc) => Ok(Some(doc)),
            other => mismatch("mapping", &other),
        }
    }
}

impl FieldValue for Value {
    fn into_value(self) -> Value {
        self
    }

    fn from_value(value: Value) -> Result<Option<Self>, OdmError> {
        Ok((!value.is_null()).then_some(value))
    }
}

/// Persistence bookkeeping carried by every entity instance.
///
/// `old` holds the values as last loaded or persisted; a field missing from
/// it was absent. It is only touched by the mapper after a successful load
/// or write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityState {
    pub(crate) old: Document,
    pub(crate) meta: Document,
    pub(crate) deleted: bool,
}

impl EntityState {
    /// Last loaded or persisted value of `field`.
    #[must_use]
    pub fn old(&self, field: &str) -> Option<&Value> {
        self.old.get(field)
    }

    /// Free-form metadata bag, persisted under `meta`.
    #[must_use]
    pub const fn meta(&self) -> &Document {
        &self.meta
    }

    pub const fn meta_mut(&mut self) -> &mut Document {
        &mut self.meta
    }

    /// Whether the instance was deleted and became inert.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted
    }
}

/// Get/set by field name over a fixed struct, plus its static schema.
///
/// Usually generated by [`model!`](crate::model).
pub trait FieldAccessor {
    fn schema() -> &'static Schema;

    /// Current value of `field`; `None` when unset or unknown.
    fn read(&self, field: &str) -> Option<Value>;

    /// Assigns `field`. `Value::Null` unsets it.
    fn write(&mut self, field: &str, value: Value) -> Result<(), OdmError>;

    fn state(&self) -> &EntityState;

    fn state_mut(&mut self) -> &mut EntityState;
}

/// Extra derived entries contributed to the timeline diff and the serialized
/// form.
pub trait ComputedFields {
    fn computed(&self) -> Vec<(&'static str, Value)>;
}

/// A persistable entity type.
pub trait Model: FieldAccessor + Default + Clone + fmt::Debug + Send + Sync + 'static {
    /// Store collection holding this entity.
    const COLLECTION: &'static str;

    /// Resource name written to timeline entries and cache keys.
    fn resource_name() -> &'static str {
        Self::schema().entity()
    }

    /// Cached query shapes to evict whenever an instance is mutated.
    fn cache_keys() -> Vec<CacheKeyTemplate> {
        vec![CacheKeyTemplate::by_id()]
    }

    /// Fields never written to the timeline.
    fn timeline_discard() -> &'static [&'static str] {
        &[]
    }

    /// Fields recorded on every update, changed or not.
    fn timeline_preserve() -> &'static [&'static str] {
        &[]
    }

    /// Events for which no timeline entry is written.
    fn blocked_events() -> &'static [TimelineEvent] {
        &[]
    }

    fn as_computed(&self) -> Option<&dyn ComputedFields> {
        None
    }

    /// Store identifier, once persisted.
    fn id(&self) -> Option<ObjectId> {
        self.read(ID_FIELD).and_then(|v| v.as_object_id())
    }
}

/// Value of one template entry.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateValue {
    /// Format string whose `%s` is replaced by the instance's own value of
    /// the field.
    Format(&'static str),
    Fixed(Value),
}

/// A cached filter shape to evict on mutation, e.g. `{ "_id": "%s" }`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheKeyTemplate {
    pub(crate) query: Vec<(&'static str, TemplateValue)>,
    pub(crate) fields: Vec<&'static str>,
}

impl CacheKeyTemplate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `{ "_id": "%s" }`, the identity-keyed entry.
    #[must_use]
    pub fn by_id() -> Self {
        Self::new().bind(ID_FIELD, "%s")
    }

    #[must_use]
    pub fn bind(mut self, field: &'static str, format: &'static str) -> Self {
        self.query.push((field, TemplateValue::Format(format)));
        self
    }

    #[must_use]
    pub fn fixed(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.query.push((field, TemplateValue::Fixed(value.into())));
        self
    }

    /// Restricts the cached projection.
    #[must_use]
    pub fn fields(mut self, fields: &[&'static str]) -> Self {
        self.fields.extend_from_slice(fields);
        self
    }

    /// Filter obtained by binding placeholders to `instance`'s values.
    pub(crate) fn bind_to<M: FieldAccessor>(&self, instance: &M) -> Document {
        self.query
            .iter()
            .map(|(field, template)| {
                let value = match template {
                    TemplateValue::Format(format) => {
                        let own = instance.read(field).unwrap_or_default().to_plain_string();
                        Value::String(format.replace("%s", &own))
                    },
                    TemplateValue::Fixed(value) => value.clone(),
                };
                ((*field).to_owned(), value)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn field_values_map_null_to_none() {
        assert_eq!(String::from_value(Value::Null).unwrap(), None);
        assert_eq!(i64::from_value(Value::Int(3)).unwrap(), Some(3));
        assert_eq!(f64::from_value(Value::Int(3)).unwrap(), Some(3.0));
        assert_eq!(ObjectId::from_value(Value::from(" ")).unwrap(), None);
        assert!(bool::from_value(Value::from("yes")).is_err());
    }

    #[test]
    fn datetimes_accept_both_representations() {
        let dt = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();
        assert_eq!(DateTime::<Utc>::from_value(dt.into_value()).unwrap(), Some(dt));
        let ts = Value::Timestamp(opsdesk_store::Timestamp::from(dt));
        assert_eq!(DateTime::<Utc>::from_value(ts).unwrap(), Some(dt));
    }

    #[test]
    fn identifier_lists() {
        let id = ObjectId::new();
        let value = vec![id].into_value();
        assert_eq!(Vec::<ObjectId>::from_value(value).unwrap(), Some(vec![id]));
        assert!(Vec::<ObjectId>::from_value(Value::Array(vec![Value::Int(1)])).is_err());
    }

    #[test]
    fn templates_collect_fields() {
        let template = CacheKeyTemplate::new()
            .bind("requester_id", "%s")
            .fixed("live", true)
            .fields(&["status"]);
        assert_eq!(template.query.len(), 2);
        assert_eq!(template.fields, ["status"]);
        assert_eq!(CacheKeyTemplate::by_id().query, [(ID_FIELD, TemplateValue::Format("%s"))]);
    }
}

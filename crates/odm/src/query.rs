//! Query translation: caller filters and projections into store-native ones.

use crate::coerce::coerce;
use crate::entity::Model;
use crate::error::OdmError;
use crate::schema::{ID_ALIAS, ID_FIELD, Schema};
use fxhash::FxHashMap;
use serde::Serialize;
use opsdesk_store::{Document, FindOptions, ObjectId, SortOrder, Value};
use std::time::Duration;

const LOGICAL_OPERATORS: &[&str] = &["$and", "$or", "$nor"];

/// Strips operator decoration (`=`, `?`) and whitespace from a filter key.
///
/// `"name = ?"` becomes `"name"`.
#[must_use]
pub fn normalize_key(key: &str) -> String {
    key.chars().filter(|c| !(c.is_whitespace() || *c == '=' || *c == '?')).collect()
}

/// Maps the `id` alias onto `_id` unless the entity declares its own `id`.
fn resolve_field(schema: &Schema, key: String) -> String {
    if key == ID_ALIAS && !schema.exposes_id() { ID_FIELD.to_owned() } else { key }
}

/// Rewrites `filter` into a store-native filter for `schema`.
///
/// Values of known fields are coerced to the field's logical type; unknown
/// keys pass through unchanged so ad hoc store filters keep working.
/// `$and`, `$or` and `$nor` branches are translated recursively.
pub fn translate_filter(schema: &Schema, filter: Document) -> Result<Document, OdmError> {
    let mut native = Document::new();
    for (raw_key, value) in filter {
        let key = resolve_field(schema, normalize_key(&raw_key));
        let value = if LOGICAL_OPERATORS.contains(&key.as_str()) {
            translate_branches(schema, value)?
        } else if let Some(field) = schema.field(&key) {
            coerce(value, field.kind).map_err(|err| with_field(err, &key))?
        } else {
            value
        };
        native.insert(key, value);
    }
    Ok(native)
}

fn translate_branches(schema: &Schema, value: Value) -> Result<Value, OdmError> {
    match value {
        Value::Array(branches) => branches
            .into_iter()
            .map(|branch| match branch {
                Value::Document(doc) => translate_filter(schema, doc).map(Value::Document),
                other => Ok(other),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Ok(other),
    }
}

fn with_field(err: OdmError, field: &str) -> OdmError {
    match err {
        OdmError::InvalidIdentifier { message, .. } => {
            OdmError::InvalidIdentifier { message, context: Some(field.to_owned().into()) }
        },
        OdmError::InvalidValue { message, .. } => {
            OdmError::InvalidValue { message, context: Some(field.to_owned().into()) }
        },
        other => other,
    }
}

/// Builds an inclusion projection from field names.
///
/// Wildcards and empty names are dropped; an empty result means "all
/// fields" and yields `None`.
#[must_use]
pub fn translate_projection<S: AsRef<str>>(schema: &Schema, fields: &[S]) -> Option<Document> {
    let projection: Document = fields
        .iter()
        .map(|f| f.as_ref().trim())
        .filter(|f| !f.is_empty() && *f != "*")
        .map(|f| (resolve_field(schema, f.to_owned()), Value::Int(1)))
        .collect();
    (!projection.is_empty()).then_some(projection)
}

/// Ordering, pagination and time budget of a read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct ReadOptions {
    order: Vec<(String, SortOrder)>,
    limit: Option<u64>,
    page: Option<u64>,
    max_time: Option<Duration>,
}

impl ReadOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn order(mut self, field: impl Into<String>, direction: SortOrder) -> Self {
        self.order.push((field.into(), direction));
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// One-based page number; only meaningful together with a limit.
    #[must_use]
    pub const fn page(mut self, page: u64) -> Self {
        self.page = Some(page);
        self
    }

    #[must_use]
    pub const fn max_time(mut self, max_time: Duration) -> Self {
        self.max_time = Some(max_time);
        self
    }

    #[must_use]
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// Documents to skip: `limit * (page - 1)`.
    #[must_use]
    pub fn skip(&self) -> Option<u64> {
        match (self.limit, self.page) {
            (Some(limit), Some(page)) if page > 1 => Some(limit.saturating_mul(page - 1)),
            _ => None,
        }
    }

    pub(crate) fn to_find_options(
        &self,
        schema: &Schema,
        projection: Option<Document>,
        default_max_time: Option<Duration>,
    ) -> FindOptions {
        FindOptions {
            projection,
            sort: self
                .order
                .iter()
                .map(|(field, direction)| (resolve_field(schema, normalize_key(field)), *direction))
                .collect(),
            limit: self.limit,
            skip: self.skip(),
            max_time: self.max_time.or(default_max_time),
        }
    }
}

/// Decoded read results keyed by identifier.
///
/// A second entity with an identifier already present replaces the first
/// one in place; entities without an identifier are appended.
#[derive(Debug, Clone)]
pub struct ResultSet<M> {
    items: Vec<M>,
    positions: FxHashMap<ObjectId, usize>,
}

impl<M> Default for ResultSet<M> {
    fn default() -> Self {
        Self { items: Vec::new(), positions: FxHashMap::default() }
    }
}

impl<M: Model> ResultSet<M> {
    pub fn push(&mut self, item: M) {
        let id = item.id();
        match id.and_then(|id| self.positions.get(&id).copied()) {
            Some(position) => self.items[position] = item,
            None => {
                if let Some(id) = id {
                    self.positions.insert(id, self.items.len());
                }
                self.items.push(item);
            },
        }
    }

    #[must_use]
    pub fn get(&self, id: &ObjectId) -> Option<&M> {
        self.positions.get(id).map(|&position| &self.items[position])
    }
}

impl<M> ResultSet<M> {
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn first(&self) -> Option<&M> {
        self.items.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, M> {
        self.items.iter()
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<M> {
        self.items
    }
}

impl<M: Model> FromIterator<M> for ResultSet<M> {
    fn from_iter<I: IntoIterator<Item = M>>(iter: I) -> Self {
        let mut set = Self::default();
        for item in iter {
            set.push(item);
        }
        set
    }
}

impl<M> IntoIterator for ResultSet<M> {
    type Item = M;
    type IntoIter = std::vec::IntoIter<M>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, M> IntoIterator for &'a ResultSet<M> {
    type Item = &'a M;
    type IntoIter = std::slice::Iter<'a, M>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDescriptor, LogicalType};
    use opsdesk_store::doc;

    const ID: &str = "507f1f77bcf86cd799439011";

    fn schema() -> Schema {
        let mut fields = Schema::base_fields();
        fields.push(FieldDescriptor::new("name", LogicalType::Text));
        fields.push(FieldDescriptor::new("qty", LogicalType::Integer));
        fields.push(FieldDescriptor::new("owner", LogicalType::Identifier));
        Schema::new("Sample", fields)
    }

    #[test]
    fn keys_lose_operator_decoration() {
        assert_eq!(normalize_key("name = ?"), "name");
        assert_eq!(normalize_key(" qty="), "qty");
        assert_eq!(normalize_key("owner"), "owner");
    }

    #[test]
    fn filter_values_are_coerced() {
        let filter = doc! { "name = ?" => "Bob", "qty" => "12", "extra" => "7" };
        let native = translate_filter(&schema(), filter).unwrap();
        assert_eq!(native, doc! { "name" => "Bob", "qty" => 12, "extra" => "7" });
    }

    #[test]
    fn id_alias_maps_to_primary_key() {
        let native = translate_filter(&schema(), doc! { "id" => ID }).unwrap();
        assert_eq!(native, doc! { "_id" => ObjectId::parse_str(ID).unwrap() });

        let err = translate_filter(&schema(), doc! { "id" => "x" }).unwrap_err();
        assert!(matches!(err, OdmError::InvalidIdentifier { context: Some(ref c), .. } if c == "_id"));
    }

    #[test]
    fn entity_with_own_id_keeps_it() {
        let mut fields = Schema::base_fields();
        fields.push(FieldDescriptor::new("id", LogicalType::Integer));
        let schema = Schema::new("Legacy", fields);
        let native = translate_filter(&schema, doc! { "id" => "5" }).unwrap();
        assert_eq!(native, doc! { "id" => 5 });
        assert_eq!(translate_projection(&schema, &["id"]), Some(doc! { "id" => 1 }));
    }

    #[test]
    fn logical_branches_are_translated() {
        let filter = doc! { "$or" => vec![doc! { "qty" => "1" }, doc! { "owner" => ID }] };
        let native = translate_filter(&schema(), filter).unwrap();
        let expected = doc! {
            "$or" => vec![doc! { "qty" => 1 }, doc! { "owner" => ObjectId::parse_str(ID).unwrap() }]
        };
        assert_eq!(native, expected);
    }

    #[test]
    fn projection_drops_wildcards() {
        assert_eq!(translate_projection(&schema(), &["*"]), None);
        assert_eq!(
            translate_projection(&schema(), &["id", "name", ""]),
            Some(doc! { "_id" => 1, "name" => 1 })
        );
    }

    #[test]
    fn pagination_skips_whole_pages() {
        let options = ReadOptions::new().limit(20).page(3).order("id", SortOrder::Desc);
        let find = options.to_find_options(&schema(), None, Some(Duration::from_secs(1)));
        assert_eq!(find.skip, Some(40));
        assert_eq!(find.limit, Some(20));
        assert_eq!(find.sort, vec![("_id".to_owned(), SortOrder::Desc)]);
        assert_eq!(find.max_time, Some(Duration::from_secs(1)));
        assert_eq!(ReadOptions::new().page(2).skip(), None);
        assert!(ReadOptions::new().is_default());
    }
}

//! Document mapping: encoding, decoding and the mutation lifecycle.

use crate::coerce::{coerce, decode_value, is_empty_for, suppress_if_empty};
use crate::context::Odm;
use crate::entity::Model;
use crate::error::{OdmError, OdmErrorExt};
use crate::query::{normalize_key, translate_filter};
use crate::schema::{
    CREATED_FIELD, ID_ALIAS, ID_FIELD, LIVE_FIELD, META_FIELD, MODIFIED_FIELD, Schema,
};
use crate::timeline::{self, TimelineEvent};
use chrono::{SecondsFormat, Utc};
use opsdesk_store::{DeleteResult, Document, FindOptions, ObjectId, UpdateResult, Value};
use serde_json::{Map, Number, Value as Json};
use tracing::{debug, instrument, warn};

/// Store representation of `instance`.
///
/// Every descriptor's current value is coerced and empty-suppressed. A
/// suppressed field is written as explicit `Null` only when its old value
/// was non-empty, so clearing a field persists while an always-empty field
/// stays absent. The metadata bag follows the same rule under `meta`.
pub fn encode<M: Model>(instance: &M) -> Result<Document, OdmError> {
    let state = instance.state();
    let mut document = Document::new();

    for field in M::schema().fields() {
        let value = instance.read(field.name).unwrap_or_default();
        let value = coerce(value, field.kind).context(field.name)?;
        match suppress_if_empty(value, field.kind) {
            Some(value) => {
                document.insert(field.name.to_owned(), value);
            },
            None => {
                if state.old(field.name).is_some_and(|old| !is_empty_for(old, field.kind)) {
                    document.insert(field.name.to_owned(), Value::Null);
                }
            },
        }
    }

    if !state.meta().is_empty() {
        document.insert(META_FIELD.to_owned(), Value::Document(state.meta().clone()));
    } else if state.old(META_FIELD).is_some() {
        document.insert(META_FIELD.to_owned(), Value::Null);
    }
    Ok(document)
}

/// Builds an instance from a stored document. This is a load: old values
/// are reset to the decoded ones. Keys without a descriptor are ignored.
///
/// Stored data is never rejected. A value that no longer fits its field is
/// left out of the instance with a warning and stays untouched in the store.
pub fn decode<M: Model>(document: Document) -> Result<M, OdmError> {
    let mut instance = M::default();
    let schema = M::schema();
    for (key, value) in document {
        if key == META_FIELD {
            if let Value::Document(meta) = value {
                *instance.state_mut().meta_mut() = meta;
            }
            continue;
        }
        let Some(field) = schema.field(&key) else {
            continue;
        };
        let loaded = decode_value(value, field.kind)
            .and_then(|value| instance.write(field.name, value));
        if let Err(err) = loaded {
            warn!(
                entity = schema.entity(),
                field = field.name,
                error = %err,
                "skipping stored value that does not fit its field"
            );
        }
    }
    resync(&mut instance);
    Ok(instance)
}

/// Makes the old values equal to the current ones, computed fields and the
/// metadata bag included.
pub(crate) fn resync<M: Model>(instance: &mut M) {
    let mut old: Document = M::schema()
        .fields()
        .iter()
        .filter_map(|f| instance.read(f.name).map(|v| (f.name.to_owned(), v)))
        .collect();
    if let Some(computed) = instance.as_computed() {
        old.extend(computed.computed().into_iter().map(|(name, v)| (name.to_owned(), v)));
    }
    if !instance.state().meta().is_empty() {
        old.insert(META_FIELD.to_owned(), Value::Document(instance.state().meta().clone()));
    }
    instance.state_mut().old = old;
}

/// Rewrites every set field the way it reads back from the store, so the
/// in-memory instance holds plain values of store precision.
fn normalize<M: Model>(instance: &mut M) -> Result<(), OdmError> {
    for field in M::schema().fields() {
        if let Some(value) = instance.read(field.name) {
            let value = decode_value(value, field.kind).context(field.name)?;
            instance.write(field.name, value)?;
        }
    }
    Ok(())
}

/// Assigns `field` after coercing `value` to its logical type.
pub(crate) fn assign<M: Model>(
    instance: &mut M,
    field: &str,
    value: Value,
) -> Result<(), OdmError> {
    let schema = M::schema();
    let name = resolve(schema, field);
    let Some(descriptor) = schema.field(&name) else {
        return Err(OdmError::Schema {
            message: format!("unknown field '{field}'").into(),
            context: Some(schema.entity().into()),
        });
    };
    let value = decode_value(value, descriptor.kind).context(descriptor.name)?;
    instance.write(descriptor.name, value)
}

fn resolve(schema: &Schema, field: &str) -> String {
    let key = normalize_key(field);
    if key == ID_ALIAS && !schema.exposes_id() { ID_FIELD.to_owned() } else { key }
}

pub(crate) fn by_id(id: ObjectId) -> Document {
    let mut filter = Document::new();
    filter.insert(ID_FIELD.to_owned(), Value::Id(id));
    filter
}

fn ensure_live<M: Model>(instance: &M) -> Result<(), OdmError> {
    if instance.state().is_deleted() {
        return Err(OdmError::Lifecycle {
            message: "the entity was deleted".into(),
            context: Some(M::resource_name().into()),
        });
    }
    Ok(())
}

/// Inserts a new instance or `$set`-updates a persisted one, then resyncs
/// old values, evicts cached reads and records the timeline entry.
#[instrument(skip_all, fields(entity = M::resource_name()))]
pub(crate) fn save<M: Model>(odm: &Odm, instance: &mut M) -> Result<(), OdmError> {
    let primary = odm.schema::<M>()?.primary_field()?.name;
    ensure_live(instance)?;

    let event = match instance.id() {
        None => {
            if instance.read(CREATED_FIELD).is_none() {
                instance.write(CREATED_FIELD, Value::from(Utc::now()))?;
            }
            let mut document = encode(instance)?;
            document.remove(primary);
            let id = odm.store().insert_one(M::COLLECTION, document)?;
            instance.write(primary, Value::Id(id))?;
            TimelineEvent::Create
        },
        Some(id) => {
            instance.write(MODIFIED_FIELD, Value::from(Utc::now()))?;
            let mut document = encode(instance)?;
            document.remove(primary);
            let ack = odm.store().update_one(M::COLLECTION, &by_id(id), &document)?;
            debug!(%id, matched = ack.matched, modified = ack.modified, "update acknowledged");
            TimelineEvent::Update
        },
    };

    normalize(instance)?;
    let changes = timeline::diff(instance, event);
    resync(instance);
    odm.cache().invalidate(instance);
    odm.record::<M>(instance.id(), event, changes);
    debug!(id = ?instance.id(), %event, "entity saved");
    Ok(())
}

/// Removes a persisted instance. The change set is taken from the
/// pre-deletion state and recorded once the removal succeeded.
#[instrument(skip_all, fields(entity = M::resource_name()))]
pub(crate) fn delete<M: Model>(odm: &Odm, instance: &mut M) -> Result<(), OdmError> {
    odm.schema::<M>()?;
    ensure_live(instance)?;
    let Some(id) = instance.id() else {
        return Err(OdmError::Lifecycle {
            message: "the entity was never saved".into(),
            context: Some(M::resource_name().into()),
        });
    };

    let changes = timeline::diff(instance, TimelineEvent::Delete);
    odm.store().delete_one(M::COLLECTION, &by_id(id))?;
    odm.cache().invalidate(instance);
    instance.state_mut().deleted = true;
    odm.record::<M>(Some(id), TimelineEvent::Delete, changes);
    debug!(%id, "entity deleted");
    Ok(())
}

/// Writes the non-empty fields by identifier, never explicit nulls, and
/// without a timeline entry. `replace` swaps the whole stored document.
#[instrument(skip_all, fields(entity = M::resource_name(), replace = replace))]
pub(crate) fn update_without_null<M: Model>(
    odm: &Odm,
    instance: &mut M,
    replace: bool,
) -> Result<UpdateResult, OdmError> {
    let primary = odm.schema::<M>()?.primary_field()?.name;
    ensure_live(instance)?;
    let Some(id) = instance.id() else {
        return Err(OdmError::Lifecycle {
            message: "the entity was never saved".into(),
            context: Some(M::resource_name().into()),
        });
    };

    instance.write(MODIFIED_FIELD, Value::from(Utc::now()))?;
    let mut document = encode(instance)?;
    document.remove(primary);
    document.retain(|_, value| !value.is_null());

    let ack = if replace {
        odm.store().replace_one(M::COLLECTION, &by_id(id), document)?
    } else {
        odm.store().update_one(M::COLLECTION, &by_id(id), &document)?
    };

    normalize(instance)?;
    resync(instance);
    odm.cache().invalidate(instance);
    debug!(%id, matched = ack.matched, "entity updated without timeline");
    Ok(ack)
}

/// Documents matching `filter`, decoded, when the cache needs them for
/// eviction.
fn affected<M: Model>(odm: &Odm, filter: &Document) -> Result<Vec<M>, OdmError> {
    if !odm.cache().is_enabled() {
        return Ok(Vec::new());
    }
    let options = FindOptions { max_time: odm.max_time(), ..FindOptions::default() };
    odm.store()
        .find(M::COLLECTION, filter, &options)?
        .into_iter()
        .map(decode::<M>)
        .collect()
}

/// `$set`s `set` on every document matching `filter`. Both sides are
/// translated; no timeline entries are written.
#[instrument(skip_all, fields(entity = M::resource_name()))]
pub(crate) fn update_all<M: Model>(
    odm: &Odm,
    filter: Document,
    set: Document,
) -> Result<UpdateResult, OdmError> {
    let schema = odm.schema::<M>()?;
    let filter = translate_filter(schema, filter)?;
    let set = translate_filter(schema, set)?;
    let before = affected::<M>(odm, &filter)?;

    let ack = odm.store().update_many(M::COLLECTION, &filter, &set)?;
    for mut instance in before {
        odm.cache().invalidate(&instance);
        for (key, value) in &set {
            if schema.field(key).is_some() {
                instance.write(key, value.clone().simplify())?;
            }
        }
        odm.cache().invalidate(&instance);
    }
    debug!(matched = ack.matched, modified = ack.modified, "bulk update");
    Ok(ack)
}

/// Removes every document matching a non-empty `filter`, without timeline
/// entries.
#[instrument(skip_all, fields(entity = M::resource_name()))]
pub(crate) fn delete_all<M: Model>(odm: &Odm, filter: Document) -> Result<DeleteResult, OdmError> {
    let schema = odm.schema::<M>()?;
    if filter.is_empty() {
        return Err(OdmError::invalid_value("refusing to delete with an empty filter"));
    }
    let filter = translate_filter(schema, filter)?;
    let before = affected::<M>(odm, &filter)?;

    let ack = odm.store().delete_many(M::COLLECTION, &filter)?;
    for instance in &before {
        odm.cache().invalidate(instance);
    }
    debug!(deleted = ack.deleted, "bulk delete");
    Ok(ack)
}

/// Merges the known fields of `extra` into `query`; other keys are dropped.
#[must_use]
pub fn modify_query(schema: &Schema, mut query: Document, extra: Document) -> Document {
    for (key, value) in extra {
        let key = resolve(schema, &key);
        if schema.field(&key).is_some() {
            query.insert(key, value);
        }
    }
    query
}

/// How datetimes are rendered by the serialization helpers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DateStyle {
    Rfc3339,
    EpochSeconds,
    /// `YYYY-MM-DDTHH:MM:SS.000Z`
    Simple,
}

fn to_json(value: &Value, style: DateStyle) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::from(*i),
        Value::Double(f) => Number::from_f64(*f).map_or(Json::Null, Json::Number),
        Value::String(s) => Json::String(s.clone()),
        Value::Id(id) => Json::String(id.to_hex()),
        Value::Regex(re) => Json::String(re.pattern.clone()),
        temporal @ (Value::Timestamp(_) | Value::DateTime(_)) => {
            let Value::DateTime(dt) = temporal.clone().simplify() else {
                return Json::Null;
            };
            match style {
                DateStyle::Rfc3339 => Json::String(dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
                DateStyle::EpochSeconds => Json::from(dt.timestamp()),
                DateStyle::Simple => {
                    Json::String(dt.to_utc().format("%Y-%m-%dT%H:%M:%S.000Z").to_string())
                },
            }
        },
        Value::Array(items) => Json::Array(items.iter().map(|v| to_json(v, style)).collect()),
        Value::Document(doc) => {
            Json::Object(doc.iter().map(|(k, v)| (k.clone(), to_json(v, style))).collect())
        },
    }
}

/// Plain mapping of the set fields, `_id` exposed as `id`, computed fields
/// and `meta` included, `exclude` left out.
pub(crate) fn render<M: Model>(
    instance: &M,
    exclude: &[&str],
    style: DateStyle,
) -> Map<String, Json> {
    let skip = |name: &str| exclude.contains(&name);
    let mut out = Map::new();
    for field in M::schema().fields() {
        let key = if field.name == ID_FIELD { ID_ALIAS } else { field.name };
        if skip(key) || skip(field.name) {
            continue;
        }
        if let Some(value) = instance.read(field.name) {
            out.insert(key.to_owned(), to_json(&value, style));
        }
    }
    if let Some(computed) = instance.as_computed() {
        for (name, value) in computed.computed() {
            if !skip(name) {
                out.insert(name.to_owned(), to_json(&value, style));
            }
        }
    }
    let meta = instance.state().meta();
    if !meta.is_empty() && !skip(META_FIELD) {
        out.insert(META_FIELD.to_owned(), to_json(&Value::Document(meta.clone()), style));
    }
    out
}

/// `render` for API payloads: epoch-second datetimes, no `live`, no `meta`.
pub(crate) fn render_api<M: Model>(instance: &M, exclude: &[&str]) -> Json {
    let mut excluded = exclude.to_vec();
    excluded.extend([LIVE_FIELD, META_FIELD]);
    Json::Object(render(instance, &excluded, DateStyle::EpochSeconds))
}

/// A new, unsaved copy: no identifier, no `modified`, a fresh `created`.
pub(crate) fn copy_of<M: Model>(instance: &M) -> Result<M, OdmError> {
    let mut copy = M::default();
    for field in M::schema().fields() {
        if matches!(field.name, ID_FIELD | MODIFIED_FIELD | CREATED_FIELD) {
            continue;
        }
        if let Some(value) = instance.read(field.name) {
            copy.write(field.name, value)?;
        }
    }
    copy.write(CREATED_FIELD, Value::from(Utc::now()))?;
    *copy.state_mut().meta_mut() = instance.state().meta().clone();
    Ok(copy)
}

use crate::cache::{ALL_SUFFIX, COUNT_SUFFIX, FIRST_SUFFIX, cache_key, options_suffix};
use crate::context::Odm;
use crate::entity::Model;
use crate::error::{AuditError, OdmError};
use crate::mapper::{self, DateStyle};
use crate::query::{ReadOptions, ResultSet, translate_filter, translate_projection};
use crate::schema::{ID_ALIAS, Schema};
use crate::timeline::{self, Changes, TimelineEntry, TimelineEvent};
use opsdesk_store::{DeleteResult, Document, FindOptions, SortOrder, UpdateResult, Value};
use serde_json::{Map, Value as Json};
use tracing::{instrument, warn};

/// Translated filter and projection of a read.
fn shape(
    schema: &Schema,
    filter: Document,
    fields: &[&str],
) -> Result<(Document, Option<Document>), OdmError> {
    Ok((translate_filter(schema, filter)?, translate_projection(schema, fields)))
}

/// Cache key of a read shape; `None` degrades the read to the store.
fn read_key(
    entity: &str,
    filter: &Document,
    projection: Option<&Document>,
    suffix: &str,
) -> Option<String> {
    match cache_key(entity, filter, projection) {
        Ok(base) => Some(format!("{base}{suffix}")),
        Err(err) => {
            warn!(entity, error = %err, "Cannot derive cache key, reading from store");
            None
        },
    }
}

/// Cache key of a read shape with read options. Non-default options add
/// their own suffix after `suffix`; such entries are never invalidated by
/// templates and live until their TTL runs out.
fn options_key(
    entity: &str,
    filter: &Document,
    projection: Option<&Document>,
    options: &ReadOptions,
    suffix: &str,
) -> Option<String> {
    if options.is_default() {
        return read_key(entity, filter, projection, suffix);
    }
    match options_suffix(options) {
        Ok(extra) => read_key(entity, filter, projection, &format!("{suffix}{extra}")),
        Err(err) => {
            warn!(entity, error = %err, "Cannot derive cache key, reading from store");
            None
        },
    }
}

fn first_options(order: Option<(&str, SortOrder)>) -> ReadOptions {
    order.map_or_else(ReadOptions::new, |(field, dir)| ReadOptions::new().order(field, dir))
}

/// Read and write API of every [`Model`].
///
/// Static functions take the [`Odm`] context explicitly; filters use
/// logical field names (`id` for the identifier) and are translated before
/// reaching the store.
pub trait Repository: Model {
    /// Matching entities keyed by identifier.
    #[instrument(skip_all, fields(entity = Self::resource_name()))]
    fn all(
        odm: &Odm,
        filter: Document,
        fields: &[&str],
        options: &ReadOptions,
    ) -> Result<ResultSet<Self>, OdmError> {
        let schema = odm.schema::<Self>()?;
        let (filter, projection) = shape(schema, filter, fields)?;
        let find = options.to_find_options(schema, projection, odm.max_time());
        odm.store()
            .find(Self::COLLECTION, &filter, &find)?
            .into_iter()
            .map(mapper::decode::<Self>)
            .collect()
    }

    /// Same read as [`Repository::all`]: results in store order, keyed by
    /// identifier.
    fn select_all(
        odm: &Odm,
        filter: Document,
        fields: &[&str],
        options: &ReadOptions,
    ) -> Result<ResultSet<Self>, OdmError> {
        Self::all(odm, filter, fields, options)
    }

    /// First match, optionally ordered by one field.
    #[instrument(skip_all, fields(entity = Self::resource_name()))]
    fn first(
        odm: &Odm,
        filter: Document,
        fields: &[&str],
        order: Option<(&str, SortOrder)>,
    ) -> Result<Option<Self>, OdmError> {
        let schema = odm.schema::<Self>()?;
        let (filter, projection) = shape(schema, filter, fields)?;
        let find = first_options(order).to_find_options(schema, projection, odm.max_time());
        odm.store()
            .find_one(Self::COLLECTION, &filter, &find)?
            .map(mapper::decode::<Self>)
            .transpose()
    }

    /// Entity with identifier `id`. A malformed id is an
    /// [`OdmError::InvalidIdentifier`].
    fn find_by_id(odm: &Odm, id: impl Into<Value>) -> Result<Option<Self>, OdmError> {
        let mut filter = Document::new();
        filter.insert(ID_ALIAS.to_owned(), id.into());
        Self::first(odm, filter, &[], None)
    }

    fn count(odm: &Odm, filter: Document) -> Result<u64, OdmError> {
        Self::optimized_count(odm, filter, &ReadOptions::new())
    }

    /// Count honouring the read options (time budget, skip, limit).
    #[instrument(skip_all, fields(entity = Self::resource_name()))]
    fn optimized_count(
        odm: &Odm,
        filter: Document,
        options: &ReadOptions,
    ) -> Result<u64, OdmError> {
        let schema = odm.schema::<Self>()?;
        let filter = translate_filter(schema, filter)?;
        let find = options.to_find_options(schema, None, odm.max_time());
        Ok(odm.store().count(Self::COLLECTION, &filter, &find)?)
    }

    /// [`Repository::first`] through the read cache.
    fn cache_first(
        odm: &Odm,
        filter: Document,
        fields: &[&str],
        order: Option<(&str, SortOrder)>,
    ) -> Result<Option<Self>, OdmError> {
        let schema = odm.schema::<Self>()?;
        let (filter, projection) = shape(schema, filter, fields)?;
        let options = first_options(order);
        let entity = Self::resource_name();
        let key = options_key(entity, &filter, projection.as_ref(), &options, FIRST_SUFFIX);
        let find = options.to_find_options(schema, projection, odm.max_time());
        let read = || -> Result<_, OdmError> {
            Ok(odm.store().find_one(Self::COLLECTION, &filter, &find)?)
        };

        let document = match key {
            Some(key) => odm.cache().cached_read::<Option<Document>, _>(&key, read)?,
            None => read()?,
        };
        document.map(mapper::decode::<Self>).transpose()
    }

    /// [`Repository::all`] through the read cache.
    fn cache_all(
        odm: &Odm,
        filter: Document,
        fields: &[&str],
    ) -> Result<ResultSet<Self>, OdmError> {
        Self::cache_select_all(odm, filter, fields, &ReadOptions::new())
    }

    /// [`Repository::all`] with read options, through the read cache.
    fn cache_select_all(
        odm: &Odm,
        filter: Document,
        fields: &[&str],
        options: &ReadOptions,
    ) -> Result<ResultSet<Self>, OdmError> {
        let schema = odm.schema::<Self>()?;
        let (filter, projection) = shape(schema, filter, fields)?;
        let entity = Self::resource_name();
        let key = options_key(entity, &filter, projection.as_ref(), options, ALL_SUFFIX);
        let find = options.to_find_options(schema, projection, odm.max_time());
        let read = || -> Result<_, OdmError> {
            Ok(odm.store().find(Self::COLLECTION, &filter, &find)?)
        };

        let documents = match key {
            Some(key) => odm.cache().cached_read::<Vec<Document>, _>(&key, read)?,
            None => read()?,
        };
        documents.into_iter().map(mapper::decode::<Self>).collect()
    }

    /// [`Repository::count`] through the read cache unless `bypass_cache`.
    fn cache_count(odm: &Odm, filter: Document, bypass_cache: bool) -> Result<u64, OdmError> {
        if bypass_cache {
            return Self::count(odm, filter);
        }
        let schema = odm.schema::<Self>()?;
        let filter = translate_filter(schema, filter)?;
        let find = FindOptions { max_time: odm.max_time(), ..FindOptions::default() };
        let read = || -> Result<_, OdmError> {
            Ok(odm.store().count(Self::COLLECTION, &filter, &find)?)
        };

        match read_key(Self::resource_name(), &filter, None, COUNT_SUFFIX) {
            Some(key) => odm.cache().cached_read::<u64, _>(&key, read),
            None => read(),
        }
    }

    /// Bulk removal by a non-empty filter. No timeline entries.
    fn delete_all(odm: &Odm, filter: Document) -> Result<DeleteResult, OdmError> {
        mapper::delete_all::<Self>(odm, filter)
    }

    /// Loads every match and deletes it one by one, recording a timeline
    /// entry each. Returns the number of deleted entities.
    fn delete_many(odm: &Odm, filter: Document) -> Result<u64, OdmError> {
        let mut deleted = 0;
        for mut instance in Self::select_all(odm, filter, &[], &ReadOptions::new())? {
            instance.delete(odm)?;
            deleted += 1;
        }
        Ok(deleted)
    }

    /// Bulk `$set`. No timeline entries.
    fn update_all(odm: &Odm, filter: Document, set: Document) -> Result<UpdateResult, OdmError> {
        mapper::update_all::<Self>(odm, filter, set)
    }

    /// Adds the known fields of `extra` to `query`.
    #[must_use]
    fn modify_query(query: Document, extra: Document) -> Document {
        mapper::modify_query(Self::schema(), query, extra)
    }

    /// Not persisted yet.
    fn is_new(&self) -> bool {
        self.id().is_none()
    }

    /// Assigns `field` (logical name, `id` accepted) after coercion.
    fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<(), OdmError> {
        mapper::assign(self, field, value.into())
    }

    fn get(&self, field: &str) -> Option<Value> {
        self.read(field)
    }

    fn save(&mut self, odm: &Odm) -> Result<(), OdmError> {
        mapper::save(odm, self)
    }

    fn delete(&mut self, odm: &Odm) -> Result<(), OdmError> {
        mapper::delete(odm, self)
    }

    /// Persists by identifier without explicit nulls and without a timeline
    /// entry; `replace` swaps the stored document.
    fn update_without_null(
        &mut self,
        odm: &Odm,
        replace: bool,
    ) -> Result<UpdateResult, OdmError> {
        mapper::update_without_null(odm, self, replace)
    }

    /// Plain mapping with `id` and `meta`, RFC 3339 datetimes.
    fn to_array(&self, exclude: &[&str]) -> Map<String, Json> {
        mapper::render(self, exclude, DateStyle::Rfc3339)
    }

    /// API payload: epoch-second datetimes, no `live`, no `meta`.
    fn to_json(&self, exclude: &[&str]) -> Json {
        mapper::render_api(self, exclude)
    }

    /// Datetimes as `YYYY-MM-DDTHH:MM:SS.000Z`, identifiers as strings.
    fn simple_json(&self) -> Json {
        Json::Object(mapper::render(self, &[], DateStyle::Simple))
    }

    /// Unsaved copy with a fresh `created`.
    fn data_for_copy(&self) -> Result<Self, OdmError> {
        mapper::copy_of(self)
    }

    /// Change set the next `event` would record.
    fn timeline_changes(&self, event: TimelineEvent) -> Changes {
        timeline::diff(self, event)
    }

    /// Recorded timeline of this instance, oldest first.
    fn history(&self, odm: &Odm) -> Result<Vec<TimelineEntry>, AuditError> {
        match self.id() {
            Some(id) => odm.timeline().history(Self::resource_name(), &id),
            None => Ok(Vec::new()),
        }
    }
}

impl<M: Model> Repository for M {}

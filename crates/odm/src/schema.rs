//! Field registry: the static description of an entity type's fields.

use crate::error::OdmError;
use fxhash::{FxHashMap, FxHashSet};
use std::fmt;

/// Store key of the primary identifier shared by every entity.
pub const ID_FIELD: &str = "_id";
/// Caller-facing alias of [`ID_FIELD`].
pub const ID_ALIAS: &str = "id";
pub const CREATED_FIELD: &str = "created";
pub const MODIFIED_FIELD: &str = "modified";
pub const LIVE_FIELD: &str = "live";
/// Free-form metadata bag persisted next to the declared fields.
pub const META_FIELD: &str = "meta";

/// Domain-level type of a field, independent of its store representation.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::AsRefStr,
    strum_macros::EnumIter,
)]
#[strum(serialize_all = "kebab-case")]
pub enum LogicalType {
    /// Surrogate key; stored as a store-native identifier.
    Autonumber,
    Text,
    Integer,
    Decimal,
    Boolean,
    Datetime,
    Date,
    Time,
    /// Opaque store-native identifier.
    Identifier,
    Array,
    ArrayOfIdentifiers,
}

impl LogicalType {
    #[must_use]
    pub const fn is_temporal(self) -> bool {
        matches!(self, Self::Datetime | Self::Date | Self::Time)
    }

    #[must_use]
    pub const fn is_identifier(self) -> bool {
        matches!(self, Self::Identifier | Self::Autonumber)
    }
}

/// One declared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: LogicalType,
    pub primary: bool,
    pub indexed: bool,
    pub required: bool,
}

impl FieldDescriptor {
    #[must_use]
    pub const fn new(name: &'static str, kind: LogicalType) -> Self {
        Self { name, kind, primary: false, indexed: false, required: false }
    }

    #[must_use]
    pub const fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    #[must_use]
    pub const fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Ordered field descriptors of one entity type with a name index.
///
/// Built once per type and kept for the life of the process. Construction
/// never fails; [`Schema::validate`] reports malformed tables.
#[derive(Clone)]
pub struct Schema {
    entity: &'static str,
    fields: Vec<FieldDescriptor>,
    index: FxHashMap<&'static str, usize>,
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("entity", &self.entity)
            .field("fields", &self.fields.iter().map(|d| d.name).collect::<Vec<_>>())
            .finish()
    }
}

impl Schema {
    #[must_use]
    pub fn new(entity: &'static str, fields: Vec<FieldDescriptor>) -> Self {
        let mut index = FxHashMap::default();
        for (position, field) in fields.iter().enumerate() {
            index.entry(field.name).or_insert(position);
        }
        Self { entity, fields, index }
    }

    /// Fields every entity inherits: `_id`, `live`, `created`, `modified`.
    #[must_use]
    pub fn base_fields() -> Vec<FieldDescriptor> {
        vec![
            FieldDescriptor::new(ID_FIELD, LogicalType::Autonumber).primary(),
            FieldDescriptor::new(LIVE_FIELD, LogicalType::Boolean).indexed(),
            FieldDescriptor::new(CREATED_FIELD, LogicalType::Datetime),
            FieldDescriptor::new(MODIFIED_FIELD, LogicalType::Datetime),
        ]
    }

    #[must_use]
    pub const fn entity(&self) -> &'static str {
        self.entity
    }

    /// Descriptors in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.index.get(name).map(|&position| &self.fields[position])
    }

    /// The field marked primary.
    pub fn primary_field(&self) -> Result<&FieldDescriptor, OdmError> {
        self.fields.iter().find(|f| f.primary).ok_or_else(|| OdmError::Schema {
            message: "no field is marked primary".into(),
            context: Some(self.entity.into()),
        })
    }

    /// Whether the entity declares its own `id` field (then `id` is not an
    /// alias of `_id`).
    #[must_use]
    pub fn exposes_id(&self) -> bool {
        self.index.contains_key(ID_ALIAS)
    }

    /// Checks the table: non-empty names, no duplicates, exactly one primary.
    pub fn validate(&self) -> Result<(), OdmError> {
        let fail = |message: String| OdmError::Schema {
            message: message.into(),
            context: Some(self.entity.into()),
        };

        if self.entity.trim().is_empty() {
            return Err(OdmError::schema("entity name cannot be empty"));
        }

        let mut seen = FxHashSet::default();
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return Err(fail("field name cannot be empty".to_owned()));
            }
            if field.name == META_FIELD {
                return Err(fail(format!("'{META_FIELD}' is reserved for the metadata bag")));
            }
            if !seen.insert(field.name) {
                return Err(fail(format!("field '{}' is declared twice", field.name)));
            }
        }

        match self.fields.iter().filter(|f| f.primary).count() {
            0 => Err(fail("no field is marked primary".to_owned())),
            1 => Ok(()),
            n => Err(fail(format!("{n} fields are marked primary"))),
        }
    }
}

/// Process-wide lookup of validated schemas by entity name.
///
/// Owned by the [`Odm`](crate::Odm) context; filled during bootstrap.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    schemas: FxHashMap<&'static str, &'static Schema>,
}

impl Registry {
    /// Validates and records `schema`.
    pub fn register(&mut self, schema: &'static Schema) -> Result<(), OdmError> {
        schema.validate()?;
        if let Some(existing) = self.schemas.get(schema.entity())
            && !std::ptr::eq(*existing, schema)
        {
            return Err(OdmError::Schema {
                message: "another schema is registered under this name".into(),
                context: Some(schema.entity().into()),
            });
        }
        self.schemas.insert(schema.entity(), schema);
        Ok(())
    }

    /// Schema registered for `entity`.
    pub fn describe(&self, entity: &str) -> Result<&'static Schema, OdmError> {
        self.schemas.get(entity).copied().ok_or_else(|| OdmError::Schema {
            message: "entity type is not registered".into(),
            context: Some(entity.to_owned().into()),
        })
    }

    /// Primary field of a registered entity.
    pub fn primary_field(&self, entity: &str) -> Result<&'static FieldDescriptor, OdmError> {
        self.describe(entity)?.primary_field()
    }

    pub fn entities(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.schemas.keys().copied()
    }
}

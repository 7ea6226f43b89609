use crate::oid::{ObjectId, Timestamp};
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A store document. Keys are kept sorted, so two documents with the same
/// content always serialize identically.
pub type Document = BTreeMap<String, Value>;

/// A regular expression filter value (`pattern` plus `imsx` style options).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Regex {
    pub pattern: String,
    pub options: String,
}

impl Regex {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self { pattern: pattern.into(), options: String::new() }
    }

    /// Case-insensitive pattern.
    pub fn insensitive(pattern: impl Into<String>) -> Self {
        Self { pattern: pattern.into(), options: "i".to_owned() }
    }
}

/// A single document value.
///
/// `Id` and `Timestamp` are the store-native wrappers; `DateTime` is the domain
/// representation handed back to callers after [`Value::simplify`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Id(ObjectId),
    Timestamp(Timestamp),
    DateTime(DateTime<FixedOffset>),
    Regex(Regex),
    Array(Vec<Value>),
    Document(Document),
}

impl Value {
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::Id(_) => "objectId",
            Self::Timestamp(_) => "timestamp",
            Self::DateTime(_) => "datetime",
            Self::Regex(_) => "regex",
            Self::Array(_) => "array",
            Self::Document(_) => "document",
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub const fn is_temporal(&self) -> bool {
        matches!(self, Self::Timestamp(_) | Self::DateTime(_))
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Double(f) if f.is_finite() => Some(*f as i64),
            _ => None,
        }
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_object_id(&self) -> Option<ObjectId> {
        match self {
            Self::Id(id) => Some(*id),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_document(&self) -> Option<&Document> {
        match self {
            Self::Document(d) => Some(d),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[Self]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Milliseconds since the epoch for temporal values.
    #[must_use]
    pub fn instant(&self) -> Option<i64> {
        match self {
            Self::Timestamp(ts) => Some(ts.millis()),
            Self::DateTime(dt) => Some(dt.timestamp_millis()),
            _ => None,
        }
    }

    /// Replaces store-native wrappers with plain domain values, recursively.
    ///
    /// Timestamps become UTC datetimes; identifiers are already plain values.
    #[must_use]
    pub fn simplify(self) -> Self {
        match self {
            Self::Timestamp(ts) => Self::DateTime(ts.to_datetime().fixed_offset()),
            Self::Array(items) => Self::Array(items.into_iter().map(Self::simplify).collect()),
            Self::Document(doc) => {
                Self::Document(doc.into_iter().map(|(k, v)| (k, v.simplify())).collect())
            },
            other => other,
        }
    }

    /// Semantic equality: temporal values compare by instant and numbers
    /// compare across integer/double.
    #[must_use]
    #[allow(clippy::float_cmp, clippy::cast_precision_loss)]
    pub fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Double(b)) | (Self::Double(b), Self::Int(a)) => (*a as f64) == *b,
            (Self::Array(a), Self::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_as(y))
            },
            (Self::Document(a), Self::Document(b)) => {
                a.len() == b.len()
                    && a.iter().zip(b).all(|((ka, va), (kb, vb))| ka == kb && va.same_as(vb))
            },
            (a, b) if a.is_temporal() && b.is_temporal() => a.instant() == b.instant(),
            (a, b) => a == b,
        }
    }

    /// Ordering between comparable values, `None` across incompatible types.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, Self::Null) => Some(Ordering::Equal),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (a, b) if a.as_f64().is_some() && b.as_f64().is_some() => {
                a.as_f64()?.partial_cmp(&b.as_f64()?)
            },
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Id(a), Self::Id(b)) => Some(a.cmp(b)),
            (a, b) if a.is_temporal() && b.is_temporal() => Some(a.instant()?.cmp(&b.instant()?)),
            _ => None,
        }
    }

    const fn type_rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Int(_) | Self::Double(_) => 1,
            Self::String(_) => 2,
            Self::Document(_) => 3,
            Self::Array(_) => 4,
            Self::Id(_) => 5,
            Self::Bool(_) => 6,
            Self::Timestamp(_) | Self::DateTime(_) => 7,
            Self::Regex(_) => 8,
        }
    }

    /// Total order used for sorting: type rank first, then value.
    #[must_use]
    pub fn sort_cmp(a: Option<&Self>, b: Option<&Self>) -> Ordering {
        let a = a.unwrap_or(&Self::Null);
        let b = b.unwrap_or(&Self::Null);
        a.type_rank()
            .cmp(&b.type_rank())
            .then_with(|| a.compare(b).unwrap_or(Ordering::Equal))
    }

    /// Renders a scalar the way it is substituted into `%s` templates.
    #[must_use]
    pub fn to_plain_string(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(true) => "1".to_owned(),
            Self::Bool(false) => String::new(),
            Self::Int(i) => i.to_string(),
            Self::Double(f) => f.to_string(),
            Self::String(s) => s.clone(),
            Self::Id(id) => id.to_hex(),
            Self::Timestamp(ts) => ts.to_string(),
            Self::DateTime(dt) => dt.to_rfc3339(),
            Self::Regex(re) => re.pattern.clone(),
            Self::Array(_) => "Array".to_owned(),
            Self::Document(_) => "Document".to_owned(),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Self::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Self::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Self::String(value.clone())
    }
}

impl From<ObjectId> for Value {
    fn from(value: ObjectId) -> Self {
        Self::Id(value)
    }
}

impl From<Timestamp> for Value {
    fn from(value: Timestamp) -> Self {
        Self::Timestamp(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Self::DateTime(value.fixed_offset())
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(value: DateTime<FixedOffset>) -> Self {
        Self::DateTime(value)
    }
}

impl From<Regex> for Value {
    fn from(value: Regex) -> Self {
        Self::Regex(value)
    }
}

impl From<Document> for Value {
    fn from(value: Document) -> Self {
        Self::Document(value)
    }
}

impl<T: Into<Self>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Self::Array(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Builds a [`Document`] from `key => value` pairs.
///
/// ```rust
/// use opsdesk_store::{doc, Value};
///
/// let filter = doc! { "status" => "pending", "qty" => doc! { "$gt" => 3 } };
/// assert_eq!(filter.get("status"), Some(&Value::from("pending")));
/// ```
#[macro_export]
macro_rules! doc {
    () => {
        $crate::Document::new()
    };
    ( $( $key:expr => $value:expr ),+ $(,)? ) => {{
        let mut document = $crate::Document::new();
        $( document.insert(::std::string::String::from($key), $crate::Value::from($value)); )+
        document
    }};
}

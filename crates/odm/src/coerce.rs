//! Type coercion between raw values and logical field types.
//!
//! Regex values pass through every type untouched. Structured filter
//! expressions (documents and arrays) pass through the scalar types so the
//! same rules serve document encoding and filter translation.

use crate::error::OdmError;
use crate::schema::LogicalType;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use opsdesk_store::{Document, ObjectId, Timestamp, Value};

/// Operators whose operands are values of the field itself.
const VALUE_OPERATORS: &[&str] = &["$eq", "$ne", "$in", "$nin", "$gt", "$gte", "$lt", "$lte"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d.%m.%Y"];
const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M"];

/// Converts `value` to the representation of `kind`.
///
/// Absent values (`Null`) stay absent for scalar types; only the array types
/// turn them into an empty array.
pub fn coerce(value: Value, kind: LogicalType) -> Result<Value, OdmError> {
    if matches!(value, Value::Regex(_)) {
        return Ok(value);
    }
    match kind {
        LogicalType::Text => Ok(to_text(value)),
        LogicalType::Integer => Ok(to_integer(value)),
        LogicalType::Decimal => Ok(to_decimal(value)),
        LogicalType::Boolean => Ok(to_boolean(value)),
        LogicalType::Datetime | LogicalType::Date | LogicalType::Time => to_timestamp(value, kind),
        LogicalType::Identifier | LogicalType::Autonumber => to_identifier(value, kind),
        LogicalType::ArrayOfIdentifiers => to_identifier_array(value),
        LogicalType::Array => Ok(to_array(value)),
    }
}

/// Returns `None` when `value` is the empty sentinel of `kind`: integer `0`,
/// decimal `0.0`, empty string, empty array or a blank identifier string.
/// `Null` is always absent.
#[must_use]
pub fn suppress_if_empty(value: Value, kind: LogicalType) -> Option<Value> {
    (!is_empty_for(&value, kind)).then_some(value)
}

/// Whether `value` counts as empty for a field of `kind`.
#[must_use]
#[allow(clippy::float_cmp)]
pub fn is_empty_for(value: &Value, kind: LogicalType) -> bool {
    match (kind, value) {
        (_, Value::Null) => true,
        (LogicalType::Integer, Value::Int(0)) => true,
        (LogicalType::Decimal, Value::Double(f)) => *f == 0.0,
        (LogicalType::Decimal, Value::Int(0)) => true,
        (LogicalType::Text, Value::String(s)) => s.is_empty(),
        (LogicalType::Array | LogicalType::ArrayOfIdentifiers, Value::Array(items)) => {
            items.is_empty()
        },
        (LogicalType::Array | LogicalType::ArrayOfIdentifiers, Value::Document(doc)) => {
            doc.is_empty()
        },
        (LogicalType::Identifier | LogicalType::Autonumber, Value::String(s)) => {
            s.trim().is_empty()
        },
        _ => false,
    }
}

/// Store value to in-memory value: coerce, then unwrap store-native types.
pub fn decode_value(value: Value, kind: LogicalType) -> Result<Value, OdmError> {
    coerce(value, kind).map(Value::simplify)
}

fn to_text(value: Value) -> Value {
    match value {
        Value::Null
        | Value::String(_)
        | Value::Array(_)
        | Value::Document(_)
        | Value::Regex(_) => value,
        Value::Bool(b) => Value::String(if b { "1".to_owned() } else { String::new() }),
        Value::Int(i) => Value::String(i.to_string()),
        Value::Double(f) => Value::String(f.to_string()),
        Value::Id(id) => Value::String(id.to_hex()),
        Value::Timestamp(ts) => Value::String(ts.to_datetime().to_rfc3339()),
        Value::DateTime(dt) => Value::String(dt.to_rfc3339()),
    }
}

/// Leading numeric prefix of `input` (`" 12abc"` is 12, `"1.5e2x"` is 150).
fn leading_number(input: &str) -> Option<f64> {
    let s = input.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    let digits_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    let mut seen_digits = end > digits_start;
    if bytes.get(end) == Some(&b'.') {
        let mut frac = end + 1;
        while bytes.get(frac).is_some_and(u8::is_ascii_digit) {
            frac += 1;
        }
        if frac > end + 1 || seen_digits {
            seen_digits = seen_digits || frac > end + 1;
            end = frac;
        }
    }
    if !seen_digits {
        return None;
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp = end + 1;
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        let exp_digits = exp;
        while bytes.get(exp).is_some_and(u8::is_ascii_digit) {
            exp += 1;
        }
        if exp > exp_digits {
            end = exp;
        }
    }
    s[..end].parse::<f64>().ok()
}

#[allow(clippy::cast_possible_truncation)]
fn leading_integer(input: &str) -> i64 {
    let s = input.trim_start();
    let plain_end = s
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '+' || c == '-'))))
        .map_or(s.len(), |(i, _)| i);
    let next = s[plain_end..].chars().next();
    match s[..plain_end].parse::<i64>() {
        Ok(n) if !matches!(next, Some('.' | 'e' | 'E')) => n,
        _ => leading_number(s).map_or(0, |f| f as i64),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn to_integer(value: Value) -> Value {
    match value {
        Value::Null | Value::Int(_) | Value::Array(_) | Value::Document(_) | Value::Regex(_) => {
            value
        },
        Value::Double(f) => Value::Int(if f.is_finite() { f.trunc() as i64 } else { 0 }),
        Value::Bool(b) => Value::Int(i64::from(b)),
        Value::String(s) => Value::Int(leading_integer(&s)),
        Value::Id(_) | Value::Timestamp(_) | Value::DateTime(_) => Value::Int(0),
    }
}

#[allow(clippy::cast_precision_loss)]
fn to_decimal(value: Value) -> Value {
    match value {
        Value::Null | Value::Double(_) | Value::Array(_) | Value::Document(_) | Value::Regex(_) => {
            value
        },
        Value::Int(i) => Value::Double(i as f64),
        Value::Bool(b) => Value::Double(if b { 1.0 } else { 0.0 }),
        Value::String(s) => Value::Double(leading_number(&s).unwrap_or(0.0)),
        Value::Id(_) | Value::Timestamp(_) | Value::DateTime(_) => Value::Double(0.0),
    }
}

fn to_boolean(value: Value) -> Value {
    match value {
        Value::Null | Value::Bool(_) | Value::Array(_) | Value::Document(_) | Value::Regex(_) => {
            value
        },
        Value::Int(i) => Value::Bool(i != 0),
        Value::Double(f) => Value::Bool(f != 0.0),
        Value::String(s) => Value::Bool(!(s.is_empty() || s == "0")),
        Value::Id(_) | Value::Timestamp(_) | Value::DateTime(_) => Value::Bool(true),
    }
}

/// Parses a date/time expression into a UTC instant.
///
/// Accepts RFC 3339, `YYYY-MM-DD[ HH:MM[:SS]]`, US and dotted dates, a bare
/// time (today), `@<unix seconds>`, `now` and `today`.
#[must_use]
pub fn parse_datetime(input: &str) -> Option<DateTime<Utc>> {
    let s = input.trim();
    match s.to_ascii_lowercase().as_str() {
        "now" => return Some(Utc::now()),
        "today" => return Some(Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc()),
        _ => {},
    }
    if let Some(secs) = s.strip_prefix('@') {
        return secs.parse::<i64>().ok().and_then(|secs| Utc.timestamp_opt(secs, 0).single());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
                .map(|d| d.and_time(NaiveTime::MIN))
        })
        .or_else(|| {
            TIME_FORMATS
                .iter()
                .find_map(|f| NaiveTime::parse_from_str(s, f).ok())
                .map(|t| Utc::now().date_naive().and_time(t))
        })
        .map(|naive| naive.and_utc())
}

fn coerce_operator_doc(
    ops: Document,
    kind: LogicalType,
    scalar: fn(Value, LogicalType) -> Result<Value, OdmError>,
) -> Result<Value, OdmError> {
    ops.into_iter()
        .map(|(op, operand)| {
            let coerced = if VALUE_OPERATORS.contains(&op.as_str()) {
                match operand {
                    Value::Array(items) => Value::Array(
                        items.into_iter().map(|v| scalar(v, kind)).collect::<Result<_, _>>()?,
                    ),
                    other => scalar(other, kind)?,
                }
            } else {
                operand
            };
            Ok((op, coerced))
        })
        .collect::<Result<Document, OdmError>>()
        .map(Value::Document)
}

fn is_operator_doc(doc: &Document) -> bool {
    !doc.is_empty() && doc.keys().all(|k| k.starts_with('$'))
}

fn to_timestamp(value: Value, kind: LogicalType) -> Result<Value, OdmError> {
    match value {
        Value::Null | Value::Timestamp(_) | Value::Regex(_) => Ok(value),
        Value::DateTime(dt) => Ok(Value::Timestamp(Timestamp::from(dt.to_utc()))),
        Value::String(s) if s.trim().is_empty() => Ok(Value::Null),
        Value::String(s) => match parse_datetime(&s) {
            Some(dt) => Ok(Value::Timestamp(Timestamp::from(dt))),
            None => Err(OdmError::InvalidValue {
                message: format!("'{s}' is not a recognizable date/time").into(),
                context: Some(kind.to_string().into()),
            }),
        },
        Value::Document(ops) if is_operator_doc(&ops) => {
            coerce_operator_doc(ops, kind, to_timestamp)
        },
        Value::Array(items) => items
            .into_iter()
            .map(|v| to_timestamp(v, kind))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Bool(_) | Value::Int(_) | Value::Double(_) | Value::Id(_) | Value::Document(_) => {
            Ok(Value::Timestamp(Timestamp::now()))
        },
    }
}

fn parse_identifier(s: &str, kind: LogicalType) -> Result<Value, OdmError> {
    ObjectId::parse_str(s.trim()).map(Value::Id).map_err(|_| OdmError::InvalidIdentifier {
        message: format!("'{s}' is not a valid identifier").into(),
        context: Some(kind.to_string().into()),
    })
}

fn to_identifier(value: Value, kind: LogicalType) -> Result<Value, OdmError> {
    match value {
        Value::Null | Value::Id(_) | Value::Regex(_) => Ok(value),
        Value::String(s) if s.trim().is_empty() => Ok(Value::String(s)),
        Value::String(s) => parse_identifier(&s, kind),
        Value::Array(items) => items
            .into_iter()
            .map(|v| to_identifier(v, kind))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Document(ops) if is_operator_doc(&ops) => {
            coerce_operator_doc(ops, kind, to_identifier)
        },
        other => Err(OdmError::InvalidIdentifier {
            message: format!("a {} cannot be used as an identifier", other.type_name()).into(),
            context: Some(kind.to_string().into()),
        }),
    }
}

fn to_identifier_array(value: Value) -> Result<Value, OdmError> {
    const KIND: LogicalType = LogicalType::ArrayOfIdentifiers;
    match value {
        Value::Null => Ok(Value::Array(Vec::new())),
        Value::Document(ops) if is_operator_doc(&ops) => Ok(Value::Document(ops)),
        Value::Array(items) => {
            let mut ids = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::Null => {},
                    Value::String(ref s) if s.trim().is_empty() => {},
                    other => ids.push(to_identifier(other, KIND)?),
                }
            }
            Ok(Value::Array(ids))
        },
        Value::String(ref s) if s.trim().is_empty() => Ok(Value::Array(Vec::new())),
        Value::String(s) => parse_identifier(&s, KIND),
        Value::Id(_) | Value::Regex(_) => Ok(value),
        other => Err(OdmError::InvalidIdentifier {
            message: format!("a {} cannot be used as a list of identifiers", other.type_name())
                .into(),
            context: Some(KIND.to_string().into()),
        }),
    }
}

fn to_array(value: Value) -> Value {
    match value {
        Value::Null => Value::Array(Vec::new()),
        Value::Array(_) | Value::Document(_) | Value::Regex(_) => value,
        scalar => Value::Array(vec![scalar]),
    }
}

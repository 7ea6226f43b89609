//! Filter evaluation for the in-memory engine.
//!
//! Supports plain equality (with array containment), regex values and the
//! operator set `$eq $ne $in $nin $gt $gte $lt $lte $exists $elemMatch $regex
//! $not` plus the top-level `$and $or $nor` combinators.

use crate::error::StoreError;
use crate::value::{Document, Value};
use regex::RegexBuilder;
use std::cmp::Ordering;

type Result<T> = std::result::Result<T, StoreError>;

/// Evaluates `filter` against `doc`.
pub(crate) fn matches(doc: &Document, filter: &Document) -> Result<bool> {
    for (key, condition) in filter {
        let ok = match key.as_str() {
            "$and" => {
                let mut all = true;
                for sub in sub_filters(key, condition)? {
                    if !matches(doc, sub)? {
                        all = false;
                        break;
                    }
                }
                all
            },
            "$or" | "$nor" => {
                let mut any = false;
                for sub in sub_filters(key, condition)? {
                    if matches(doc, sub)? {
                        any = true;
                        break;
                    }
                }
                if key == "$or" { any } else { !any }
            },
            op if op.starts_with('$') => {
                return Err(StoreError::driver(format!("unknown top-level operator '{op}'")));
            },
            path => matches_field(lookup(doc, path), condition)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn sub_filters<'a>(op: &str, condition: &'a Value) -> Result<Vec<&'a Document>> {
    let Value::Array(items) = condition else {
        return Err(StoreError::driver(format!("'{op}' expects an array of filters")));
    };
    items
        .iter()
        .map(|item| {
            item.as_document()
                .ok_or_else(|| StoreError::driver(format!("'{op}' entries must be documents")))
        })
        .collect()
}

/// Resolves a dotted path (`meta.source`, `items.0`).
pub(crate) fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Document(inner) => inner.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn is_operator_doc(doc: &Document) -> bool {
    !doc.is_empty() && doc.keys().all(|k| k.starts_with('$'))
}

fn matches_field(field: Option<&Value>, condition: &Value) -> Result<bool> {
    match condition {
        Value::Document(ops) if is_operator_doc(ops) => {
            let options = ops.get("$options").and_then(Value::as_str).unwrap_or_default();
            for (op, operand) in ops {
                if !apply(op, field, operand, options)? {
                    return Ok(false);
                }
            }
            Ok(true)
        },
        Value::Regex(re) => regex_matches(field, &re.pattern, &re.options),
        _ => Ok(equals(field, condition)),
    }
}

fn equals(field: Option<&Value>, expected: &Value) -> bool {
    match field {
        None => expected.is_null(),
        Some(value) => {
            value.same_as(expected)
                || matches!(value, Value::Array(items) if items.iter().any(|i| i.same_as(expected)))
        },
    }
}

fn ordered(field: Option<&Value>, operand: &Value, accept: fn(Ordering) -> bool) -> bool {
    match field {
        Some(Value::Array(items)) => {
            items.iter().any(|item| item.compare(operand).is_some_and(accept))
        },
        Some(value) => value.compare(operand).is_some_and(accept),
        None => false,
    }
}

fn apply(op: &str, field: Option<&Value>, operand: &Value, options: &str) -> Result<bool> {
    Ok(match op {
        "$eq" => equals(field, operand),
        "$ne" => !equals(field, operand),
        "$in" | "$nin" => {
            let Value::Array(candidates) = operand else {
                return Err(StoreError::driver(format!("'{op}' expects an array")));
            };
            let mut found = false;
            for candidate in candidates {
                let hit = match candidate {
                    Value::Regex(re) => regex_matches(field, &re.pattern, &re.options)?,
                    other => equals(field, other),
                };
                if hit {
                    found = true;
                    break;
                }
            }
            if op == "$in" { found } else { !found }
        },
        "$gt" => ordered(field, operand, Ordering::is_gt),
        "$gte" => ordered(field, operand, Ordering::is_ge),
        "$lt" => ordered(field, operand, Ordering::is_lt),
        "$lte" => ordered(field, operand, Ordering::is_le),
        "$exists" => {
            let wanted = match operand {
                Value::Bool(b) => *b,
                Value::Int(i) => *i != 0,
                _ => true,
            };
            field.is_some() == wanted
        },
        "$elemMatch" => {
            let Value::Document(sub) = operand else {
                return Err(StoreError::driver("'$elemMatch' expects a document"));
            };
            let Some(Value::Array(items)) = field else {
                return Ok(false);
            };
            let mut any = false;
            for item in items {
                let hit = if is_operator_doc(sub) {
                    matches_field(Some(item), operand)?
                } else {
                    match item {
                        Value::Document(inner) => matches(inner, sub)?,
                        _ => false,
                    }
                };
                if hit {
                    any = true;
                    break;
                }
            }
            any
        },
        "$regex" => match operand {
            Value::String(pattern) => regex_matches(field, pattern, options)?,
            Value::Regex(re) => regex_matches(field, &re.pattern, &re.options)?,
            _ => return Err(StoreError::driver("'$regex' expects a string pattern")),
        },
        "$options" => true,
        "$not" => !matches_field(field, operand)?,
        other => return Err(StoreError::driver(format!("unsupported operator '{other}'"))),
    })
}

fn regex_matches(field: Option<&Value>, pattern: &str, options: &str) -> Result<bool> {
    let re = RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .ignore_whitespace(options.contains('x'))
        .build()
        .map_err(|e| StoreError::driver(format!("invalid regex '{pattern}': {e}")))?;

    Ok(match field {
        Some(Value::String(s)) => re.is_match(s),
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).any(|s| re.is_match(s)),
        _ => false,
    })
}

/// Applies an inclusion or exclusion projection.
pub(crate) fn project(doc: &Document, projection: &Document) -> Document {
    let truthy = |v: &Value| match v {
        Value::Bool(b) => *b,
        Value::Int(i) => *i != 0,
        Value::Double(f) => *f != 0.0,
        _ => true,
    };
    let keep_id = projection.get("_id").is_none_or(truthy);
    let included: Vec<&String> =
        projection.iter().filter(|(k, v)| *k != "_id" && truthy(v)).map(|(k, _)| k).collect();

    if included.is_empty() {
        return doc
            .iter()
            .filter(|(k, _)| {
                projection.get(k.as_str()).is_none_or(truthy) && (keep_id || *k != "_id")
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
    }

    let mut out = Document::new();
    if keep_id && let Some(id) = doc.get("_id") {
        out.insert("_id".to_owned(), id.clone());
    }
    for key in included {
        if let Some(value) = doc.get(key.as_str()) {
            out.insert(key.clone(), value.clone());
        }
    }
    out
}

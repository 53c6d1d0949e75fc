use std::cmp::Ordering;

use mongodb::bson::{Bson, Document};
use regex::RegexBuilder;

use crate::errors::ToyStoreError;

/// Returns true when `doc` satisfies the query `filter`.
pub fn matches(doc: &Document, filter: &Document) -> Result<bool, ToyStoreError> {
    for (key, condition) in filter {
        let satisfied = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses(key, condition)? {
                    if !matches(doc, clause)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => any_clause(doc, clauses(key, condition)?)?,
            "$nor" => !any_clause(doc, clauses(key, condition)?)?,
            op if op.starts_with('$') => {
                return Err(ToyStoreError::Query(format!("unsupported top-level operator {}", op)))
            }
            path => {
                let value = get_path(doc, path);
                match condition {
                    Bson::Document(ops) if is_operator_document(ops) => eval_operators(value, ops)?,
                    Bson::RegularExpression(re) => regex_matches(value, &re.pattern, &re.options)?,
                    literal => equals(value, literal),
                }
            }
        };

        if !satisfied {
            return Ok(false);
        }
    }

    Ok(true)
}

fn clauses<'a>(op: &str, condition: &'a Bson) -> Result<Vec<&'a Document>, ToyStoreError> {
    match condition {
        Bson::Array(items) if !items.is_empty() => items
            .iter()
            .map(|item| match item {
                Bson::Document(d) => Ok(d),
                _ => Err(ToyStoreError::Query(format!("{} entries must be documents", op))),
            })
            .collect(),
        _ => Err(ToyStoreError::Query(format!("{} requires a non-empty array", op))),
    }
}

fn any_clause(doc: &Document, clauses: Vec<&Document>) -> Result<bool, ToyStoreError> {
    for clause in clauses {
        if matches(doc, clause)? {
            return Ok(true);
        }
    }
    Ok(false)
}

pub(crate) fn is_operator_document(doc: &Document) -> bool {
    doc.keys().next().is_some_and(|k| k.starts_with('$'))
}

/// Evaluates an operator document such as `{"$gte": 4, "$lt": 10}` against a
/// single (possibly missing) field value.
pub(crate) fn eval_operators(value: Option<&Bson>, ops: &Document) -> Result<bool, ToyStoreError> {
    for (op, operand) in ops {
        let satisfied = match op.as_str() {
            "$eq" => equals(value, operand),
            "$ne" => !equals(value, operand),
            "$gt" => compares(value, operand, |o| o == Ordering::Greater),
            "$gte" => compares(value, operand, |o| o != Ordering::Less),
            "$lt" => compares(value, operand, |o| o == Ordering::Less),
            "$lte" => compares(value, operand, |o| o != Ordering::Greater),
            "$in" => in_set(value, set_operand(op, operand)?),
            "$nin" => !in_set(value, set_operand(op, operand)?),
            "$exists" => value.is_some() == truthy(operand),
            "$type" => match operand {
                Bson::Array(aliases) => {
                    let mut any = false;
                    for alias in aliases {
                        if type_matches(value, alias)? {
                            any = true;
                            break;
                        }
                    }
                    any
                }
                alias => type_matches(value, alias)?,
            },
            "$regex" => {
                let options = match ops.get("$options") {
                    Some(Bson::String(o)) => o.as_str(),
                    _ => "",
                };
                match operand {
                    Bson::String(pattern) => regex_matches(value, pattern, options)?,
                    Bson::RegularExpression(re) => regex_matches(value, &re.pattern, &re.options)?,
                    _ => {
                        return Err(ToyStoreError::Query(String::from(
                            "$regex requires a string pattern",
                        )))
                    }
                }
            }
            "$options" => true,
            "$not" => match operand {
                Bson::Document(inner) => !eval_operators(value, inner)?,
                Bson::RegularExpression(re) => !regex_matches(value, &re.pattern, &re.options)?,
                _ => {
                    return Err(ToyStoreError::Query(String::from(
                        "$not requires an operator document",
                    )))
                }
            },
            other => return Err(ToyStoreError::Query(format!("unsupported operator {}", other))),
        };

        if !satisfied {
            return Ok(false);
        }
    }

    Ok(true)
}

fn set_operand<'a>(op: &str, operand: &'a Bson) -> Result<&'a [Bson], ToyStoreError> {
    match operand {
        Bson::Array(items) => Ok(items),
        _ => Err(ToyStoreError::Query(format!("{} requires an array", op))),
    }
}

// A missing field equals null; an array field equals a scalar when any element does.
fn equals(value: Option<&Bson>, target: &Bson) -> bool {
    match value {
        None => matches!(target, Bson::Null),
        Some(v) if values_equal(v, target) => true,
        Some(Bson::Array(items)) => items.iter().any(|item| values_equal(item, target)),
        Some(_) => false,
    }
}

fn in_set(value: Option<&Bson>, set: &[Bson]) -> bool {
    set.iter().any(|target| equals(value, target))
}

// NaN only ever satisfies a range operator against another NaN.
fn compares(value: Option<&Bson>, target: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    let check = |v: &Bson| {
        if is_nan(v) != is_nan(target) {
            return false;
        }
        compare_same_type(v, target).is_some_and(&accept)
    };
    match value {
        Some(Bson::Array(items)) => items.iter().any(check),
        Some(v) => check(v),
        None => false,
    }
}

fn regex_matches(
    value: Option<&Bson>,
    pattern: &str,
    options: &str,
) -> Result<bool, ToyStoreError> {
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .build()
        .map_err(|e| ToyStoreError::Query(format!("invalid $regex {}: {}", pattern, e)))?;

    Ok(match value {
        Some(Bson::String(s)) => regex.is_match(s),
        Some(Bson::Array(items)) => items
            .iter()
            .any(|item| matches!(item, Bson::String(s) if regex.is_match(s))),
        _ => false,
    })
}

fn type_matches(value: Option<&Bson>, alias: &Bson) -> Result<bool, ToyStoreError> {
    let Some(value) = value else {
        return Ok(false);
    };

    let alias = match alias {
        Bson::String(a) => a.as_str(),
        _ => return Err(ToyStoreError::Query(String::from("$type requires a type alias"))),
    };

    Ok(match alias {
        "number" => is_number(value),
        "double" => matches!(value, Bson::Double(_)),
        "int" => matches!(value, Bson::Int32(_)),
        "long" => matches!(value, Bson::Int64(_)),
        "decimal" => matches!(value, Bson::Decimal128(_)),
        "string" => matches!(value, Bson::String(_)),
        "bool" => matches!(value, Bson::Boolean(_)),
        "array" => matches!(value, Bson::Array(_)),
        "object" => matches!(value, Bson::Document(_)),
        "null" => matches!(value, Bson::Null),
        "objectId" => matches!(value, Bson::ObjectId(_)),
        "date" => matches!(value, Bson::DateTime(_)),
        other => return Err(ToyStoreError::Query(format!("unsupported $type alias {}", other))),
    })
}

pub(crate) fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Null => false,
        v if is_number(v) => as_f64(v).is_some_and(|n| n != 0.0),
        _ => true,
    }
}

pub(crate) fn is_number(value: &Bson) -> bool {
    matches!(value, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_))
}

pub(crate) fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(i) => Some(f64::from(*i)),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(d) => Some(*d),
        Bson::Decimal128(d) => d.to_string().parse().ok(),
        _ => None,
    }
}

fn is_nan(value: &Bson) -> bool {
    as_f64(value).is_some_and(f64::is_nan)
}

pub(crate) fn values_equal(a: &Bson, b: &Bson) -> bool {
    match compare_numbers(a, b) {
        Some(ordering) => ordering == Ordering::Equal,
        None => a == b,
    }
}

/// Orders two numeric values. Integers compare exactly; NaN equals NaN and
/// sorts below every other number.
fn compare_numbers(a: &Bson, b: &Bson) -> Option<Ordering> {
    match (a, b) {
        (Bson::Int32(x), Bson::Int32(y)) => Some(x.cmp(y)),
        (Bson::Int64(x), Bson::Int64(y)) => Some(x.cmp(y)),
        (Bson::Int32(x), Bson::Int64(y)) => Some(i64::from(*x).cmp(y)),
        (Bson::Int64(x), Bson::Int32(y)) => Some(x.cmp(&i64::from(*y))),
        _ => {
            let (x, y) = (as_f64(a)?, as_f64(b)?);
            Some(match (x.is_nan(), y.is_nan()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                (false, false) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            })
        }
    }
}

/// Range comparison only applies between values of the same type bracket.
fn compare_same_type(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let Some(ordering) = compare_numbers(a, b) {
        return Some(ordering);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

// MongoDB's cross-type sort order
fn type_rank(value: &Bson) -> u8 {
    match value {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::DbPointer(_) | Bson::JavaScriptCode(_) | Bson::JavaScriptCodeWithScope(_) => 12,
        Bson::MaxKey => 13,
    }
}

/// Total order used by sorts and `$min`/`$max`; a missing value sorts as null.
pub fn compare_values(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    let a = a.unwrap_or(&Bson::Null);
    let b = b.unwrap_or(&Bson::Null);

    match type_rank(a).cmp(&type_rank(b)) {
        Ordering::Equal => {}
        other => return other,
    }

    if let Some(ordering) = compare_same_type(a, b) {
        return ordering;
    }

    match (a, b) {
        (Bson::Array(x), Bson::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                match compare_values(Some(l), Some(r)) {
                    Ordering::Equal => continue,
                    other => return other,
                }
            }
            x.len().cmp(&y.len())
        }
        (Bson::Document(x), Bson::Document(y)) => {
            for ((lk, lv), (rk, rv)) in x.iter().zip(y.iter()) {
                match lk.cmp(rk).then_with(|| compare_values(Some(lv), Some(rv))) {
                    Ordering::Equal => continue,
                    other => return other,
                }
            }
            x.len().cmp(&y.len())
        }
        _ => Ordering::Equal,
    }
}

/// Resolves a dotted path; numeric segments index into arrays.
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(d) => d.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

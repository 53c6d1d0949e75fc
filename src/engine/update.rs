use mongodb::bson::{Bson, Document};

use super::filter::{as_f64, eval_operators, get_path, is_operator_document, values_equal};
use crate::errors::ToyStoreError;

/// Applies an update operator document in place. Returns whether the
/// document changed.
pub fn apply_update(doc: &mut Document, update: &Document) -> Result<bool, ToyStoreError> {
    if update.is_empty() || !update.keys().all(|k| k.starts_with('$')) {
        return Err(ToyStoreError::Query(String::from(
            "update document must contain only update operators",
        )));
    }

    let before = doc.clone();

    for (op, fields) in update {
        let fields = match fields {
            Bson::Document(d) => d,
            _ => return Err(ToyStoreError::Query(format!("{} requires a document", op))),
        };

        for (path, operand) in fields {
            match op.as_str() {
                "$set" => set_path(doc, path, operand.clone())?,
                "$unset" => {
                    remove_path(doc, path);
                }
                "$inc" => increment(doc, path, operand)?,
                "$rename" => rename(doc, path, operand)?,
                "$push" => push(doc, path, operand)?,
                "$pull" => pull(doc, path, operand)?,
                other => {
                    return Err(ToyStoreError::Query(format!(
                        "unsupported update operator {}",
                        other
                    )))
                }
            }
        }
    }

    Ok(*doc != before)
}

fn increment(doc: &mut Document, path: &str, amount: &Bson) -> Result<(), ToyStoreError> {
    if as_f64(amount).is_none() {
        return Err(ToyStoreError::Query(format!("$inc on {} requires a numeric amount", path)));
    }

    let next = match get_path(doc, path) {
        None => amount.clone(),
        Some(current) => add_numbers(path, current, amount)?,
    };

    set_path(doc, path, next)
}

fn add_numbers(path: &str, a: &Bson, b: &Bson) -> Result<Bson, ToyStoreError> {
    let overflow = || ToyStoreError::Query(format!("$inc on {} overflows a 64-bit integer", path));

    match (a, b) {
        (Bson::Int32(x), Bson::Int32(y)) => Ok(match x.checked_add(*y) {
            Some(sum) => Bson::Int32(sum),
            None => Bson::Int64(i64::from(*x) + i64::from(*y)),
        }),
        (Bson::Int32(x), Bson::Int64(y)) | (Bson::Int64(y), Bson::Int32(x)) => i64::from(*x)
            .checked_add(*y)
            .map(Bson::Int64)
            .ok_or_else(overflow),
        (Bson::Int64(x), Bson::Int64(y)) => x.checked_add(*y).map(Bson::Int64).ok_or_else(overflow),
        _ => match (as_f64(a), as_f64(b)) {
            (Some(x), Some(y)) => Ok(Bson::Double(x + y)),
            _ => Err(ToyStoreError::Query(format!("cannot $inc non-numeric field {}", path))),
        },
    }
}

fn rename(doc: &mut Document, from: &str, to: &Bson) -> Result<(), ToyStoreError> {
    let to = match to {
        Bson::String(t) if !t.is_empty() && t != from => t,
        _ => {
            return Err(ToyStoreError::Query(format!(
                "$rename of {} requires a different target name",
                from
            )))
        }
    };

    if let Some(value) = remove_path(doc, from) {
        set_path(doc, to, value)?;
    }
    Ok(())
}

fn push(doc: &mut Document, path: &str, operand: &Bson) -> Result<(), ToyStoreError> {
    let items: Vec<Bson> = match operand {
        Bson::Document(d) if d.contains_key("$each") => match d.get("$each") {
            Some(Bson::Array(each)) => each.clone(),
            _ => return Err(ToyStoreError::Query(String::from("$each requires an array"))),
        },
        value => vec![value.clone()],
    };

    let next = match get_path(doc, path) {
        None => Bson::Array(items),
        Some(Bson::Array(existing)) => {
            let mut existing = existing.clone();
            existing.extend(items);
            Bson::Array(existing)
        }
        Some(_) => {
            return Err(ToyStoreError::Query(format!("cannot $push to non-array field {}", path)))
        }
    };

    set_path(doc, path, next)
}

fn pull(doc: &mut Document, path: &str, condition: &Bson) -> Result<(), ToyStoreError> {
    let existing = match get_path(doc, path) {
        Some(Bson::Array(existing)) => existing.clone(),
        _ => return Ok(()),
    };

    let mut kept = Vec::with_capacity(existing.len());
    for item in existing {
        let remove = match condition {
            Bson::Document(ops) if is_operator_document(ops) => eval_operators(Some(&item), ops)?,
            value => values_equal(&item, value),
        };
        if !remove {
            kept.push(item);
        }
    }

    set_path(doc, path, Bson::Array(kept))
}

/// Sets a dotted path, creating intermediate documents as needed.
pub(crate) fn set_path(doc: &mut Document, path: &str, value: Bson) -> Result<(), ToyStoreError> {
    match path.split_once('.') {
        None => {
            doc.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            if !doc.contains_key(head) {
                doc.insert(head, Document::new());
            }
            match doc.get_mut(head) {
                Some(Bson::Document(child)) => set_path(child, rest, value),
                _ => Err(ToyStoreError::Query(format!(
                    "cannot set {} inside a non-document field",
                    path
                ))),
            }
        }
    }
}

pub(crate) fn remove_path(doc: &mut Document, path: &str) -> Option<Bson> {
    match path.split_once('.') {
        None => doc.remove(path),
        Some((head, rest)) => match doc.get_mut(head) {
            Some(Bson::Document(child)) => remove_path(child, rest),
            _ => None,
        },
    }
}

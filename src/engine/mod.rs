//! In-memory evaluation of the MongoDB query language subset the toy routes
//! use: filters, sort/projection/paging, update operators and aggregation
//! pipelines. Backs `InMemoryToyRepository`.

mod filter;
mod pipeline;
mod update;

use std::cmp::Ordering;

use mongodb::bson::{Bson, Document};

use crate::{errors::ToyStoreError, repositories::FindSpec};
use filter::truthy;

pub use filter::{compare_values, get_path, matches};
pub use pipeline::run_pipeline;
pub use update::apply_update;

/// Filters, sorts, pages and projects a snapshot of the collection.
pub fn find(
    docs: &[Document],
    filter: &Document,
    spec: &FindSpec,
) -> Result<Vec<Document>, ToyStoreError> {
    let mut found = Vec::new();
    for doc in docs {
        if matches(doc, filter)? {
            found.push(doc.clone());
        }
    }

    if let Some(sort) = &spec.sort {
        sort_documents(&mut found, sort)?;
    }

    let skip = spec.skip.unwrap_or(0) as usize;
    let limit = match spec.limit {
        Some(n) if n > 0 => n as usize,
        _ => usize::MAX,
    };

    found
        .into_iter()
        .skip(skip)
        .take(limit)
        .map(|doc| match &spec.projection {
            Some(projection) => project(&doc, projection),
            None => Ok(doc),
        })
        .collect()
}

pub fn sort_documents(docs: &mut [Document], sort: &Document) -> Result<(), ToyStoreError> {
    let mut keys = Vec::with_capacity(sort.len());
    for (field, direction) in sort {
        let descending = match direction {
            Bson::Int32(-1) | Bson::Int64(-1) => true,
            Bson::Double(d) if *d == -1.0 => true,
            Bson::Int32(1) | Bson::Int64(1) => false,
            Bson::Double(d) if *d == 1.0 => false,
            _ => {
                return Err(ToyStoreError::Query(format!(
                    "sort direction for {} must be 1 or -1",
                    field
                )))
            }
        };
        keys.push((field.as_str(), descending));
    }

    docs.sort_by(|a, b| {
        for (field, descending) in &keys {
            let ordering = compare_values(
                sort_key(get_path(a, field), *descending),
                sort_key(get_path(b, field), *descending),
            );
            if ordering != Ordering::Equal {
                return if *descending { ordering.reverse() } else { ordering };
            }
        }
        Ordering::Equal
    });

    Ok(())
}

static EMPTY_ARRAY_KEY: Bson = Bson::MinKey;

// An array sorts by its smallest element ascending and its largest descending.
// An empty array sorts below null.
fn sort_key(value: Option<&Bson>, descending: bool) -> Option<&Bson> {
    match value {
        Some(Bson::Array(items)) => {
            let compare = |x: &&Bson, y: &&Bson| compare_values(Some(*x), Some(*y));
            let picked = if descending {
                items.iter().max_by(compare)
            } else {
                items.iter().min_by(compare)
            };
            Some(picked.unwrap_or(&EMPTY_ARRAY_KEY))
        }
        other => other,
    }
}

/// Top-level inclusion or exclusion projection. `_id` is kept by an inclusion
/// projection unless it is excluded explicitly.
pub fn project(doc: &Document, projection: &Document) -> Result<Document, ToyStoreError> {
    let id_flag = projection.get("_id").map(truthy);
    let mut include = None;
    for (field, flag) in projection.iter().filter(|(k, _)| k.as_str() != "_id") {
        let flag = truthy(flag);
        match include {
            None => include = Some(flag),
            Some(mode) if mode != flag => {
                return Err(ToyStoreError::Query(format!(
                    "cannot mix inclusion and exclusion in projection at {}",
                    field
                )))
            }
            Some(_) => {}
        }
    }

    let inclusion = include.unwrap_or(id_flag == Some(true));

    if inclusion {
        let mut out = Document::new();
        if id_flag != Some(false) {
            if let Some(id) = doc.get("_id") {
                out.insert("_id", id.clone());
            }
        }
        for (field, _) in projection.iter().filter(|(k, _)| k.as_str() != "_id") {
            if let Some(value) = doc.get(field) {
                out.insert(field.as_str(), value.clone());
            }
        }
        Ok(out)
    } else {
        let mut out = doc.clone();
        for (field, _) in projection {
            if field != "_id" || id_flag == Some(false) {
                out.remove(field);
            }
        }
        Ok(out)
    }
}

use std::cmp::Ordering;

use mongodb::bson::{Bson, Document};

use super::{
    filter::{as_f64, compare_values, get_path, matches},
    project, sort_documents,
};
use crate::errors::ToyStoreError;

/// Runs an aggregation pipeline over an in-memory snapshot of the collection.
pub fn run_pipeline(
    mut docs: Vec<Document>,
    pipeline: &[Document],
) -> Result<Vec<Document>, ToyStoreError> {
    for stage in pipeline {
        let mut entries = stage.iter();
        let (name, spec) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            _ => {
                return Err(ToyStoreError::Query(String::from(
                    "each pipeline stage must contain exactly one operator",
                )))
            }
        };

        docs = match (name.as_str(), spec) {
            ("$match", Bson::Document(filter)) => {
                let mut kept = Vec::with_capacity(docs.len());
                for doc in docs {
                    if matches(&doc, filter)? {
                        kept.push(doc);
                    }
                }
                kept
            }
            ("$sort", Bson::Document(sort)) => {
                sort_documents(&mut docs, sort)?;
                docs
            }
            ("$skip", n) => docs.into_iter().skip(count_arg("$skip", n)?).collect(),
            ("$limit", n) => docs.into_iter().take(count_arg("$limit", n)?).collect(),
            ("$project", Bson::Document(projection)) => docs
                .iter()
                .map(|doc| project(doc, projection))
                .collect::<Result<Vec<_>, _>>()?,
            ("$group", Bson::Document(group)) => run_group(docs, group)?,
            ("$count", Bson::String(field)) => {
                let mut out = Document::new();
                out.insert(field.as_str(), count_value(docs.len()));
                vec![out]
            }
            (other, _) => {
                return Err(ToyStoreError::Query(format!("unsupported pipeline stage {}", other)))
            }
        };
    }

    Ok(docs)
}

fn count_arg(stage: &str, value: &Bson) -> Result<usize, ToyStoreError> {
    match as_f64(value) {
        Some(n) if n >= 0.0 && n.fract() == 0.0 => Ok(n as usize),
        _ => Err(ToyStoreError::Query(format!("{} requires a non-negative integer", stage))),
    }
}

fn count_value(n: usize) -> Bson {
    match i32::try_from(n) {
        Ok(small) => Bson::Int32(small),
        Err(_) => Bson::Int64(n as i64),
    }
}

/// `"$field"` resolves a path in the input document; anything else is a literal.
fn eval_expression(doc: &Document, expression: &Bson) -> Bson {
    match expression {
        Bson::String(s) if s.starts_with('$') => {
            get_path(doc, &s[1..]).cloned().unwrap_or(Bson::Null)
        }
        Bson::Document(fields) => {
            let mut out = Document::new();
            for (key, value) in fields {
                out.insert(key.as_str(), eval_expression(doc, value));
            }
            Bson::Document(out)
        }
        literal => literal.clone(),
    }
}

enum Accumulator {
    Sum { ints: i64, floats: f64, saw_float: bool },
    Avg { total: f64, count: u64 },
    Min(Option<Bson>),
    Max(Option<Bson>),
    Push(Vec<Bson>),
    First(Option<Bson>),
}

impl Accumulator {
    fn new(op: &str) -> Result<Accumulator, ToyStoreError> {
        Ok(match op {
            "$sum" => Accumulator::Sum { ints: 0, floats: 0.0, saw_float: false },
            "$avg" => Accumulator::Avg { total: 0.0, count: 0 },
            "$min" => Accumulator::Min(None),
            "$max" => Accumulator::Max(None),
            "$push" => Accumulator::Push(Vec::new()),
            "$first" => Accumulator::First(None),
            other => return Err(ToyStoreError::Query(format!("unsupported accumulator {}", other))),
        })
    }

    fn add(&mut self, value: Bson) {
        match self {
            // an integer total that would overflow continues as a double
            Accumulator::Sum { ints, floats, saw_float } => match value {
                Bson::Int32(i) => add_int(ints, floats, saw_float, i64::from(i)),
                Bson::Int64(i) => add_int(ints, floats, saw_float, i),
                Bson::Double(_) | Bson::Decimal128(_) => {
                    *floats += as_f64(&value).unwrap_or(0.0);
                    *saw_float = true;
                }
                _ => {}
            },
            Accumulator::Avg { total, count } => {
                if let Some(n) = as_f64(&value) {
                    *total += n;
                    *count += 1;
                }
            }
            Accumulator::Min(current) => {
                let lower = |c: &Bson| compare_values(Some(&value), Some(c)) == Ordering::Less;
                if !matches!(value, Bson::Null) && current.as_ref().map_or(true, lower) {
                    *current = Some(value);
                }
            }
            Accumulator::Max(current) => {
                let higher = |c: &Bson| compare_values(Some(&value), Some(c)) == Ordering::Greater;
                if !matches!(value, Bson::Null) && current.as_ref().map_or(true, higher) {
                    *current = Some(value);
                }
            }
            Accumulator::Push(items) => items.push(value),
            Accumulator::First(first) => {
                if first.is_none() {
                    *first = Some(value);
                }
            }
        }
    }

    fn finish(self) -> Bson {
        match self {
            Accumulator::Sum { ints, floats, saw_float } => {
                if saw_float {
                    Bson::Double(ints as f64 + floats)
                } else {
                    match i32::try_from(ints) {
                        Ok(small) => Bson::Int32(small),
                        Err(_) => Bson::Int64(ints),
                    }
                }
            }
            Accumulator::Avg { total, count } => {
                if count == 0 {
                    Bson::Null
                } else {
                    Bson::Double(total / count as f64)
                }
            }
            Accumulator::Min(v) | Accumulator::Max(v) | Accumulator::First(v) => {
                v.unwrap_or(Bson::Null)
            }
            Accumulator::Push(items) => Bson::Array(items),
        }
    }
}

fn add_int(ints: &mut i64, floats: &mut f64, saw_float: &mut bool, i: i64) {
    match ints.checked_add(i) {
        Some(total) => *ints = total,
        None => {
            *floats += i as f64;
            *saw_float = true;
        }
    }
}

struct Group {
    key: Bson,
    accumulators: Vec<(String, Bson, Accumulator)>,
}

fn run_group(docs: Vec<Document>, spec: &Document) -> Result<Vec<Document>, ToyStoreError> {
    let key_expression = spec
        .get("_id")
        .ok_or_else(|| ToyStoreError::Query(String::from("$group requires an _id expression")))?;

    let mut fields = Vec::new();
    for (name, definition) in spec.iter().filter(|(k, _)| k.as_str() != "_id") {
        match definition {
            Bson::Document(d) if d.len() == 1 => {
                if let Some((op, expression)) = d.iter().next() {
                    Accumulator::new(op)?;
                    fields.push((name.clone(), op.clone(), expression.clone()));
                }
            }
            _ => {
                return Err(ToyStoreError::Query(format!(
                    "$group field {} must be a single accumulator",
                    name
                )))
            }
        }
    }

    let mut groups: Vec<Group> = Vec::new();
    for doc in &docs {
        let key = eval_expression(doc, key_expression);
        let index = match groups.iter().position(|g| g.key == key) {
            Some(i) => i,
            None => {
                let mut accumulators = Vec::with_capacity(fields.len());
                for (name, op, expression) in &fields {
                    accumulators.push((name.clone(), expression.clone(), Accumulator::new(op)?));
                }
                groups.push(Group { key, accumulators });
                groups.len() - 1
            }
        };

        for (_, expression, accumulator) in groups[index].accumulators.iter_mut() {
            accumulator.add(eval_expression(doc, expression));
        }
    }

    Ok(groups
        .into_iter()
        .map(|group| {
            let mut out = Document::new();
            out.insert("_id", group.key);
            for (name, _, accumulator) in group.accumulators {
                out.insert(name, accumulator.finish());
            }
            out
        })
        .collect())
}

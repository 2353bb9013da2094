//! Filter matching and update application for backends that evaluate
//! queries in-process (memory, RocksDB).
//!
//! Filters: `{ field: value }` equality, dotted paths into sub-documents
//! and through arrays of sub-documents, array fields match when any
//! element matches, and the operators `$eq`, `$ne`, `$gt`, `$gte`,
//! `$lt`, `$lte`, `$in`, `$nin`, `$exists`.
//! Updates: `$set`, `$unset`, `$setOnInsert`.

use std::cmp::Ordering;

use bson::{oid::ObjectId, Bson, Document};

use crate::errors::{StoreError, StoreResult};

pub const ID: &str = "_id";

pub fn matches(doc: &Document, filter: &Document) -> StoreResult<bool>
{
    for (key, expected) in filter {
        if key.starts_with('$') {
            return Err(StoreError::UnsupportedOperator(key.clone()));
        }
        let actual = lookup(doc, key);
        let ok = match operator_doc(expected) {
            Some(ops) => match_operators(&actual, ops)?,
            None => match_value(&actual, expected),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Resolves a dotted path such as `address.city`. A path step that meets
/// an array continues into each sub-document element (or the element at
/// a numeric step), so one path can yield several values.
pub fn lookup<'a>(doc: &'a Document, path: &str) -> Vec<&'a Bson>
{
    let mut found = Vec::new();
    let (head, rest) = split_path(path);
    if let Some(value) = doc.get(head) {
        descend(value, rest, &mut found);
    }
    found
}

fn split_path(path: &str) -> (&str, Option<&str>)
{
    match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    }
}

fn descend<'a>(value: &'a Bson, rest: Option<&str>, found: &mut Vec<&'a Bson>)
{
    let Some(rest) = rest else {
        found.push(value);
        return;
    };
    let (head, tail) = split_path(rest);
    match value {
        Bson::Document(d) => {
            if let Some(next) = d.get(head) {
                descend(next, tail, found);
            }
        },
        Bson::Array(items) => {
            if let Some(item) = head.parse::<usize>().ok().and_then(|i| items.get(i)) {
                descend(item, tail, found);
            }
            for item in items {
                if let Some(next) = item.as_document().and_then(|d| d.get(head)) {
                    descend(next, tail, found);
                }
            }
        },
        _ => {},
    }
}

fn operator_doc(value: &Bson) -> Option<&Document>
{
    match value {
        Bson::Document(d) if !d.is_empty()
            && d.keys().all(|k| k.starts_with('$')) => Some(d),
        _ => None,
    }
}

/// A missing path equals only `null`.
fn match_value(actual: &[&Bson], expected: &Bson) -> bool
{
    if actual.is_empty() {
        return matches!(expected, Bson::Null);
    }
    actual.iter().any(|value| match (value, expected) {
        (Bson::Array(items), expected) if !matches!(expected, Bson::Array(_)) => {
            items.iter().any(|item| values_equal(item, expected))
        },
        (value, expected) => values_equal(value, expected),
    })
}

fn match_operators(actual: &[&Bson], ops: &Document) -> StoreResult<bool>
{
    for (op, arg) in ops {
        let ok = match op.as_str() {
            "$eq" => match_value(actual, arg),
            "$ne" => !match_value(actual, arg),
            "$gt" => compare_any(actual, arg, |o| o == Ordering::Greater),
            "$gte" => compare_any(actual, arg, |o| o != Ordering::Less),
            "$lt" => compare_any(actual, arg, |o| o == Ordering::Less),
            "$lte" => compare_any(actual, arg, |o| o != Ordering::Greater),
            "$in" => in_list(actual, arg, op)?,
            "$nin" => !in_list(actual, arg, op)?,
            "$exists" => {
                let wanted = match (arg, as_number(arg)) {
                    (Bson::Boolean(b), _) => *b,
                    (_, Some(Number::Int(n))) => n != 0,
                    (_, Some(Number::Float(n))) => n != 0.0,
                    (_, None) => true,
                };
                actual.is_empty() != wanted
            },
            other => return Err(StoreError::UnsupportedOperator(other.to_string())),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn in_list(actual: &[&Bson], arg: &Bson, op: &str) -> StoreResult<bool>
{
    let Bson::Array(candidates) = arg else {
        return Err(StoreError::UnsupportedOperator(
                std::format!("{} needs an array", op)));
    };
    Ok(candidates.iter().any(|c| match_value(actual, c)))
}

fn compare_any<F>(actual: &[&Bson], arg: &Bson, accept: F) -> bool
    where F: Fn(Ordering) -> bool
{
    let accepts = |value: &Bson| compare(value, arg).map(&accept).unwrap_or(false);
    actual.iter().any(|value| match value {
        Bson::Array(items) => items.iter().any(|item| accepts(item)),
        value => accepts(*value),
    })
}

#[derive(Clone, Copy)]
enum Number
{
    Int(i64),
    Float(f64),
}

fn as_number(value: &Bson) -> Option<Number>
{
    match value {
        Bson::Int32(n) => Some(Number::Int(i64::from(*n))),
        Bson::Int64(n) => Some(Number::Int(*n)),
        Bson::Double(n) => Some(Number::Float(*n)),
        _ => None,
    }
}

/// A double with an exact i64 value.
fn integral(n: f64) -> Option<i64>
{
    // 2^63 is exactly representable; i64::MAX is not.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if n.fract() == 0.0 && n >= -LIMIT && n < LIMIT {
        Some(n as i64)
    } else {
        None
    }
}

/// Integers compare exactly; a double only widens the comparison when
/// it has a fractional part or lies outside the i64 range.
fn compare_numbers(a: Number, b: Number) -> Option<Ordering>
{
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => Some(x.cmp(&y)),
        (Number::Float(x), Number::Float(y)) => x.partial_cmp(&y),
        (Number::Int(x), Number::Float(y)) => match integral(y) {
            Some(y) => Some(x.cmp(&y)),
            None => (x as f64).partial_cmp(&y),
        },
        (Number::Float(_), Number::Int(_)) => {
            compare_numbers(b, a).map(Ordering::reverse)
        },
    }
}

/// Numbers compare across Int32, Int64 and Double.
pub fn values_equal(a: &Bson, b: &Bson) -> bool
{
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => compare_numbers(x, y) == Some(Ordering::Equal),
        _ => match (a, b) {
            (Bson::Document(x), Bson::Document(y)) => {
                x.len() == y.len() && x.iter().zip(y.iter())
                    .all(|((ka, va), (kb, vb))| ka == kb && values_equal(va, vb))
            },
            (Bson::Array(x), Bson::Array(y)) => {
                x.len() == y.len()
                    && x.iter().zip(y.iter()).all(|(va, vb)| values_equal(va, vb))
            },
            _ => a == b,
        },
    }
}

/// The single encoding of a numeric `_id` that [`values_equal`] treats
/// as one value: integral numbers become Int64. Other ids are unchanged.
pub fn canonical_id(id: &Bson) -> Bson
{
    match as_number(id) {
        Some(Number::Int(n)) => Bson::Int64(n),
        Some(Number::Float(n)) => match integral(n) {
            Some(n) => Bson::Int64(n),
            None => id.clone(),
        },
        None => id.clone(),
    }
}

fn compare(a: &Bson, b: &Bson) -> Option<Ordering>
{
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return compare_numbers(x, y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.bytes().cmp(&y.bytes())),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Applies an update document to `doc`. `inserting` is true when the
/// document is being created by an upsert.
pub fn apply_update(doc: &mut Document, update: &Document, inserting: bool)
    -> StoreResult<()>
{
    for (op, fields) in update {
        let fields = match fields {
            Bson::Document(fields) => fields,
            _ => return Err(StoreError::UnsupportedOperator(
                    std::format!("{} needs a document", op))),
        };
        match op.as_str() {
            "$set" => set_fields(doc, fields, inserting)?,
            "$setOnInsert" => {
                if inserting {
                    set_fields(doc, fields, inserting)?;
                }
            },
            "$unset" => {
                for path in fields.keys() {
                    if path == ID {
                        return Err(StoreError::ImmutableId);
                    }
                    remove_path(doc, path);
                }
            },
            other => return Err(StoreError::UnsupportedOperator(other.to_string())),
        }
    }
    Ok(())
}

fn set_fields(doc: &mut Document, fields: &Document, inserting: bool)
    -> StoreResult<()>
{
    for (path, value) in fields {
        if path == ID && !inserting && doc.get(ID) != Some(value) {
            return Err(StoreError::ImmutableId);
        }
        set_path(doc, path, value.clone());
    }
    Ok(())
}

fn set_path(doc: &mut Document, path: &str, value: Bson)
{
    match path.split_once('.') {
        None => {
            doc.insert(path, value);
        },
        Some((head, rest)) => {
            if !matches!(doc.get(head), Some(Bson::Document(_))) {
                doc.insert(head, Document::new());
            }
            if let Some(Bson::Document(child)) = doc.get_mut(head) {
                set_path(child, rest, value);
            }
        },
    }
}

fn remove_path(doc: &mut Document, path: &str)
{
    match path.split_once('.') {
        None => {
            doc.remove(path);
        },
        Some((head, rest)) => {
            if let Some(Bson::Document(child)) = doc.get_mut(head) {
                remove_path(child, rest);
            }
        },
    }
}

/// Starting document for an upsert: the filter's plain equality pairs.
pub fn upsert_seed(filter: &Document) -> Document
{
    let mut seed = Document::new();
    for (key, value) in filter {
        if key.starts_with('$') {
            continue;
        }
        match operator_doc(value) {
            Some(ops) => {
                if let Some(eq) = ops.get("$eq") {
                    set_path(&mut seed, key, eq.clone());
                }
            },
            None => set_path(&mut seed, key, value.clone()),
        }
    }
    seed
}

/// Makes sure `doc` carries an `_id`, placing a generated one first.
pub fn with_id(doc: Document) -> (Bson, Document)
{
    if let Some(id) = doc.get(ID) {
        return (id.clone(), doc);
    }
    let id = Bson::ObjectId(ObjectId::new());
    let mut out = Document::new();
    out.insert(ID, id.clone());
    out.extend(doc);
    (id, out)
}

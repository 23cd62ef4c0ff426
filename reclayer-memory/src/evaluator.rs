//! Filter fragment evaluation for in-memory matching.
//!
//! This module interprets the BSON filter fragments the resolver registry
//! emits (a MongoDB query subset) against plain documents. The supported
//! surface is exactly what the built-in operators produce: `$and`, `$or`,
//! `$not`, bare equality pairs and the field conditions `$ne`, `$lt`,
//! `$lte`, `$gt`, `$gte`, `$in`, `$nin`, `$exists` and `$regex` (with
//! `$options: "i"`).

use bson::oid::ObjectId;
use bson::{Bson, Document, datetime::DateTime};
use regex::Regex;
use std::cmp::Ordering;

/// Type-erased, comparable representation of BSON values.
///
/// Normalizes every numeric width to f64 so stored `Int64`s compare equal
/// to filter-supplied `Int32`s.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    ObjectId(ObjectId),
    Array(Vec<Comparable<'a>>),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Array(arr) => {
                Comparable::Array(arr.iter().map(Comparable::from).collect::<Vec<_>>())
            }
            _ => Comparable::Null, // Other types are not comparable
        }
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            // A raw hex string compares equal to the id it denotes.
            (Comparable::ObjectId(a), Comparable::String(b))
            | (Comparable::String(b), Comparable::ObjectId(a)) => a.to_hex() == *b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// True when the document satisfies the filter fragment. An empty filter
/// matches everything; malformed operator shapes match nothing.
pub(crate) fn matches(filter: &Document, document: &Document) -> bool {
    filter.iter().all(|(key, value)| match key.as_str() {
        "$and" => match value {
            Bson::Array(branches) => branches
                .iter()
                .all(|b| b.as_document().is_some_and(|b| matches(b, document))),
            _ => false,
        },
        "$or" => match value {
            Bson::Array(branches) => branches
                .iter()
                .any(|b| b.as_document().is_some_and(|b| matches(b, document))),
            _ => false,
        },
        "$not" => match value {
            Bson::Document(inner) => !matches(inner, document),
            _ => false,
        },
        field => field_matches(field, value, document),
    })
}

fn field_matches(field: &str, condition: &Bson, document: &Document) -> bool {
    let stored = document.get(field);

    match condition {
        Bson::Document(ops) if is_operator_document(ops) => {
            operators_match(ops, stored)
        }
        // Bare pair: plain equality.
        expected => {
            let stored = stored.unwrap_or(&Bson::Null);
            Comparable::from(stored) == Comparable::from(expected)
        }
    }
}

fn is_operator_document(doc: &Document) -> bool {
    doc.keys().any(|k| k.starts_with('$'))
}

fn operators_match(ops: &Document, stored: Option<&Bson>) -> bool {
    // Missing behaves like an explicit null everywhere except $exists.
    let value = stored.unwrap_or(&Bson::Null);

    ops.iter().all(|(op, operand)| match op.as_str() {
        "$exists" => {
            let should_exist = matches!(operand, Bson::Boolean(true));
            stored.is_some() == should_exist
        }
        "$ne" => Comparable::from(value) != Comparable::from(operand),
        "$lt" | "$lte" | "$gt" | "$gte" => {
            match Comparable::from(value).partial_cmp(&Comparable::from(operand)) {
                Some(ordering) => match op.as_str() {
                    "$lt" => ordering == Ordering::Less,
                    "$lte" => ordering != Ordering::Greater,
                    "$gt" => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                },
                None => false,
            }
        }
        "$in" => match operand {
            Bson::Array(candidates) => candidates
                .iter()
                .any(|c| Comparable::from(value) == Comparable::from(c)),
            _ => false,
        },
        "$nin" => match operand {
            Bson::Array(candidates) => !candidates
                .iter()
                .any(|c| Comparable::from(value) == Comparable::from(c)),
            _ => false,
        },
        "$regex" => regex_matches(ops, operand, value),
        "$options" => true, // consumed by $regex
        "$not" => match operand {
            Bson::Document(inner) => !operators_match(inner, stored),
            _ => false,
        },
        _ => false,
    })
}

fn regex_matches(ops: &Document, pattern: &Bson, value: &Bson) -> bool {
    let (Bson::String(pattern), Bson::String(value)) = (pattern, value) else {
        return false;
    };

    let case_insensitive = matches!(ops.get("$options"), Some(Bson::String(o)) if o.contains('i'));
    let pattern = if case_insensitive {
        format!("(?i){pattern}")
    } else {
        pattern.clone()
    };

    Regex::new(&pattern).is_ok_and(|re| re.is_match(value))
}

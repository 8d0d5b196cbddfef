//! Query evaluation: filters, updates, projections, sorting and
//! aggregation pipelines over in-memory documents.

use std::cmp::Ordering;

use bson::{Bson, Document};
use unified_core::document::{as_number, compare_values, lookup_path, type_name, values_equal};
use unified_core::DriverError;

use crate::model::UpdateModification;
use crate::DriverResult;

fn bad_value(message: impl Into<String>) -> DriverError {
    DriverError::server(2, "BadValue", message)
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Null | Bson::Undefined => false,
        other => as_number(other).map_or(true, |n| n != 0.0),
    }
}

fn operator_document(value: &Bson) -> Option<&Document> {
    match value {
        Bson::Document(d) if d.keys().next().map_or(false, |k| k.starts_with('$')) => Some(d),
        _ => None,
    }
}

// =============================================================================
// Filters
// =============================================================================

/// Whether `doc` satisfies `filter`.
pub(crate) fn matches(doc: &Document, filter: &Document) -> DriverResult<bool> {
    for (key, condition) in filter {
        let ok = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses(condition)? {
                    if !matches(doc, clause)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => any_clause(doc, condition)?,
            "$nor" => !any_clause(doc, condition)?,
            op if op.starts_with('$') => {
                return Err(bad_value(format!("unknown top level operator: {}", op)));
            }
            path => field_matches(lookup_path(doc, path), condition)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn clauses(condition: &Bson) -> DriverResult<Vec<&Document>> {
    match condition {
        Bson::Array(items) if !items.is_empty() => items
            .iter()
            .map(|item| match item {
                Bson::Document(d) => Ok(d),
                _ => Err(bad_value("$and/$or/$nor entries need to be full objects")),
            })
            .collect(),
        _ => Err(bad_value("$and/$or/$nor must be a nonempty array")),
    }
}

fn any_clause(doc: &Document, condition: &Bson) -> DriverResult<bool> {
    for clause in clauses(condition)? {
        if matches(doc, clause)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn field_matches(actual: Option<&Bson>, condition: &Bson) -> DriverResult<bool> {
    let operators = match operator_document(condition) {
        Some(operators) => operators,
        None => return Ok(equals(actual, condition)),
    };
    for (op, operand) in operators {
        let ok = match op.as_str() {
            "$eq" => equals(actual, operand),
            "$ne" => !equals(actual, operand),
            "$gt" => compares(actual, operand, |o| o == Ordering::Greater),
            "$gte" => compares(actual, operand, |o| o != Ordering::Less),
            "$lt" => compares(actual, operand, |o| o == Ordering::Less),
            "$lte" => compares(actual, operand, |o| o != Ordering::Greater),
            "$in" => in_list(actual, operand)?,
            "$nin" => !in_list(actual, operand)?,
            "$exists" => actual.is_some() == truthy(operand),
            other => return Err(bad_value(format!("unknown operator: {}", other))),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn equals(actual: Option<&Bson>, expected: &Bson) -> bool {
    match actual {
        None => matches!(expected, Bson::Null),
        Some(Bson::Array(items)) if !matches!(expected, Bson::Array(_)) => {
            items.iter().any(|item| values_equal(item, expected))
        }
        Some(value) => values_equal(value, expected),
    }
}

fn compares(actual: Option<&Bson>, operand: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    match actual {
        Some(Bson::Array(items)) => items
            .iter()
            .any(|item| compare_values(item, operand).map_or(false, |o| accept(o))),
        Some(value) => compare_values(value, operand).map_or(false, |o| accept(o)),
        None => false,
    }
}

fn in_list(actual: Option<&Bson>, operand: &Bson) -> DriverResult<bool> {
    match operand {
        Bson::Array(candidates) => Ok(candidates.iter().any(|c| equals(actual, c))),
        _ => Err(bad_value("$in needs an array")),
    }
}

// =============================================================================
// Updates
// =============================================================================

/// Reject update documents that are not made of update operators.
pub(crate) fn validate_update(update: &UpdateModification) -> DriverResult<()> {
    match update {
        UpdateModification::Document(d) if d.is_empty() || d.keys().any(|k| !k.starts_with('$')) => {
            Err(DriverError::client("update document must only contain update operators"))
        }
        _ => Ok(()),
    }
}

/// Reject replacement documents that contain update operators.
pub(crate) fn validate_replacement(replacement: &Document) -> DriverResult<()> {
    if replacement.keys().any(|k| k.starts_with('$')) {
        return Err(DriverError::client(
            "replacement document must not contain update operators",
        ));
    }
    Ok(())
}

/// Apply an update in place. Returns whether the document changed.
pub(crate) fn apply_update(doc: &mut Document, update: &UpdateModification) -> DriverResult<bool> {
    let before = doc.clone();
    match update {
        UpdateModification::Document(operators) => {
            for (op, fields) in operators {
                apply_operator(doc, op, fields)?;
            }
        }
        UpdateModification::Pipeline(stages) => {
            for stage in stages {
                apply_update_stage(doc, stage)?;
            }
        }
    }
    if doc.get("_id") != before.get("_id") {
        return Err(DriverError::server(
            66,
            "ImmutableField",
            "Performing an update on the path '_id' would modify the immutable field '_id'",
        ));
    }
    Ok(*doc != before)
}

fn apply_operator(doc: &mut Document, op: &str, fields: &Bson) -> DriverResult<()> {
    let fields = match fields {
        Bson::Document(d) => d,
        other => {
            return Err(DriverError::server(
                9,
                "FailedToParse",
                format!(
                    "Modifiers operate on fields but we found type {} instead",
                    type_name(other)
                ),
            ))
        }
    };
    for (path, value) in fields {
        match op {
            "$set" => set_path(doc, path, value.clone())?,
            "$unset" => remove_path(doc, path),
            "$inc" => {
                let sum = increment(lookup_path(doc, path), value)?;
                set_path(doc, path, sum)?;
            }
            other => {
                return Err(DriverError::server(
                    9,
                    "FailedToParse",
                    format!("Unknown modifier: {}", other),
                ))
            }
        }
    }
    Ok(())
}

fn apply_update_stage(doc: &mut Document, stage: &Document) -> DriverResult<()> {
    let (name, spec) = single_stage(stage)?;
    match name {
        "$set" | "$addFields" => add_fields(doc, spec),
        "$unset" => {
            unset_fields(doc, spec);
            Ok(())
        }
        other => Err(bad_value(format!(
            "{} is not allowed to be used within an update",
            other
        ))),
    }
}

fn increment(current: Option<&Bson>, delta: &Bson) -> DriverResult<Bson> {
    let type_mismatch = || {
        DriverError::server(
            14,
            "TypeMismatch",
            "Cannot apply $inc to a value of non-numeric type",
        )
    };
    let current = match current {
        None => return as_number(delta).map(|_| delta.clone()).ok_or_else(type_mismatch),
        Some(c) => c,
    };
    Ok(match (current, delta) {
        (Bson::Int32(a), Bson::Int32(b)) => match a.checked_add(*b) {
            Some(sum) => Bson::Int32(sum),
            None => Bson::Int64(i64::from(*a) + i64::from(*b)),
        },
        (Bson::Int32(a), Bson::Int64(b)) => Bson::Int64(i64::from(*a) + b),
        (Bson::Int64(a), Bson::Int32(b)) => Bson::Int64(a + i64::from(*b)),
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a + b),
        (a, b) => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => Bson::Double(x + y),
            _ => return Err(type_mismatch()),
        },
    })
}

fn set_path(doc: &mut Document, path: &str, value: Bson) -> DriverResult<()> {
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
                _ => Err(DriverError::server(
                    28,
                    "PathNotViable",
                    format!("Cannot create field '{}' in element {}", rest, head),
                )),
            }
        }
    }
}

fn remove_path(doc: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            doc.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(child)) = doc.get_mut(head) {
                remove_path(child, rest);
            }
        }
    }
}

/// Resolve an expression used by `$set`/`$addFields`: `"$field"` refers to
/// a field of the input document, anything else is a literal.
fn resolve_expression(doc: &Document, value: &Bson) -> Bson {
    match value {
        Bson::String(s) if s.starts_with('$') && !s.starts_with("$$") => {
            lookup_path(doc, &s[1..]).cloned().unwrap_or(Bson::Null)
        }
        other => other.clone(),
    }
}

fn add_fields(doc: &mut Document, spec: &Bson) -> DriverResult<()> {
    let fields = match spec {
        Bson::Document(d) => d,
        _ => return Err(bad_value("$set/$addFields specification must be an object")),
    };
    for (path, value) in fields {
        let resolved = resolve_expression(doc, value);
        set_path(doc, path, resolved)?;
    }
    Ok(())
}

fn unset_fields(doc: &mut Document, spec: &Bson) {
    match spec {
        Bson::String(path) => remove_path(doc, path),
        Bson::Array(paths) => {
            for path in paths.iter().filter_map(Bson::as_str) {
                remove_path(doc, path);
            }
        }
        _ => {}
    }
}

/// The document an upsert starts from: the filter's plain equality fields.
pub(crate) fn upsert_seed(filter: &Document) -> Document {
    filter
        .iter()
        .filter(|(k, v)| !k.starts_with('$') && !k.contains('.') && operator_document(v).is_none())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// A replacement keeps the `_id` of the document it replaces.
pub(crate) fn replace_document(existing: &Document, replacement: &Document) -> Document {
    let mut out = Document::new();
    if let Some(id) = existing.get("_id") {
        out.insert("_id", id.clone());
    }
    for (k, v) in replacement {
        if k != "_id" {
            out.insert(k.clone(), v.clone());
        }
    }
    out
}

// =============================================================================
// Projection, sorting, pipelines
// =============================================================================

/// Apply an inclusion or exclusion projection over top-level fields.
pub(crate) fn project(doc: &Document, projection: &Document) -> DriverResult<Document> {
    let include_id = projection.get("_id").map_or(true, truthy);
    let fields: Vec<(&str, bool)> = projection
        .iter()
        .filter(|(k, _)| k.as_str() != "_id")
        .map(|(k, v)| (k.as_str(), truthy(v)))
        .collect();
    let inclusion = fields.first().map_or(false, |(_, include)| *include);
    if fields.iter().any(|(_, include)| *include != inclusion) {
        return Err(DriverError::server(
            31254,
            "Location31254",
            "Cannot do exclusion on field in inclusion projection",
        ));
    }
    let listed = |key: &str| fields.iter().any(|(f, _)| *f == key);

    let mut out = Document::new();
    for (k, v) in doc {
        let keep = if k == "_id" {
            include_id
        } else if inclusion {
            listed(k)
        } else {
            !listed(k)
        };
        if keep {
            out.insert(k.clone(), v.clone());
        }
    }
    Ok(out)
}

/// Stable sort by a sort specification. Missing fields sort first.
pub(crate) fn sort_documents(docs: &mut [Document], sort: &Document) {
    docs.sort_by(|a, b| compare_by(a, b, sort));
}

fn compare_by(a: &Document, b: &Document, sort: &Document) -> Ordering {
    for (path, direction) in sort {
        let descending = as_number(direction).map_or(false, |d| d < 0.0);
        let ordering = match (lookup_path(a, path), lookup_path(b, path)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
        };
        let ordering = if descending { ordering.reverse() } else { ordering };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn single_stage(stage: &Document) -> DriverResult<(&str, &Bson)> {
    match stage.iter().next() {
        Some((name, spec)) if stage.len() == 1 => Ok((name.as_str(), spec)),
        _ => Err(DriverError::server(
            40323,
            "Location40323",
            "A pipeline stage specification object must contain exactly one field.",
        )),
    }
}

fn count_arg(name: &str, spec: &Bson) -> DriverResult<usize> {
    match as_number(spec) {
        Some(n) if n >= 0.0 => Ok(n as usize),
        _ => Err(bad_value(format!("invalid argument to {} stage", name))),
    }
}

fn filter_documents(docs: Vec<Document>, filter: &Document) -> DriverResult<Vec<Document>> {
    let mut kept = Vec::with_capacity(docs.len());
    for doc in docs {
        if matches(&doc, filter)? {
            kept.push(doc);
        }
    }
    Ok(kept)
}

/// Filter, sort, skip, limit and project a set of documents.
pub(crate) fn select(
    docs: Vec<Document>,
    filter: &Document,
    sort: Option<&Document>,
    skip: Option<i64>,
    limit: Option<i64>,
    projection: Option<&Document>,
) -> DriverResult<Vec<Document>> {
    let mut docs = filter_documents(docs, filter)?;
    if let Some(sort) = sort {
        sort_documents(&mut docs, sort);
    }
    let skip = skip.unwrap_or(0).max(0) as usize;
    // A negative limit means "a single batch of that size"
    let limit = limit
        .filter(|l| *l != 0)
        .map_or(usize::MAX, |l| l.unsigned_abs() as usize);
    let docs = docs.into_iter().skip(skip).take(limit);
    match projection {
        Some(projection) => docs.map(|d| project(&d, projection)).collect(),
        None => Ok(docs.collect()),
    }
}

/// Run an aggregation pipeline over `docs`.
pub(crate) fn run_pipeline(mut docs: Vec<Document>, pipeline: &[Document]) -> DriverResult<Vec<Document>> {
    for stage in pipeline {
        let (name, spec) = single_stage(stage)?;
        docs = match name {
            "$documents" => match spec {
                Bson::Array(items) => items
                    .iter()
                    .map(|item| match item {
                        Bson::Document(d) => Ok(d.clone()),
                        _ => Err(bad_value("$documents entries must be objects")),
                    })
                    .collect::<DriverResult<Vec<_>>>()?,
                _ => return Err(bad_value("$documents must be an array")),
            },
            "$match" => match spec {
                Bson::Document(filter) => filter_documents(docs, filter)?,
                _ => return Err(bad_value("the match filter must be an expression in an object")),
            },
            "$sort" => match spec {
                Bson::Document(sort) => {
                    sort_documents(&mut docs, sort);
                    docs
                }
                _ => return Err(bad_value("the $sort key specification must be an object")),
            },
            "$skip" => {
                let n = count_arg(name, spec)?;
                docs.into_iter().skip(n).collect()
            }
            "$limit" => {
                let n = count_arg(name, spec)?;
                docs.into_iter().take(n).collect()
            }
            "$project" => match spec {
                Bson::Document(projection) => docs
                    .iter()
                    .map(|d| project(d, projection))
                    .collect::<DriverResult<Vec<_>>>()?,
                _ => return Err(bad_value("$project specification must be an object")),
            },
            "$addFields" | "$set" => {
                for doc in docs.iter_mut() {
                    add_fields(doc, spec)?;
                }
                docs
            }
            "$unset" => {
                for doc in docs.iter_mut() {
                    unset_fields(doc, spec);
                }
                docs
            }
            "$count" => {
                let field = spec
                    .as_str()
                    .ok_or_else(|| bad_value("the count field must be a non-empty string"))?;
                if docs.is_empty() {
                    Vec::new()
                } else {
                    let mut out = Document::new();
                    out.insert(field, docs.len() as i32);
                    vec![out]
                }
            }
            other => {
                return Err(DriverError::server(
                    40324,
                    "Location40324",
                    format!("Unrecognized pipeline stage name: '{}'", other),
                ))
            }
        };
    }
    Ok(docs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn comparison_operators() {
        let d = doc! { "_id": 1, "x": 5, "tags": ["a", "b"] };
        assert!(matches(&d, &doc! { "x": { "$gt": 4, "$lte": 5 } }).unwrap());
        assert!(!matches(&d, &doc! { "x": { "$lt": 5 } }).unwrap());
        assert!(matches(&d, &doc! { "tags": "b" }).unwrap());
        assert!(matches(&d, &doc! { "y": { "$exists": false } }).unwrap());
        assert!(matches(&d, &doc! { "x": { "$in": [1, 5_i64] } }).unwrap());
        assert!(matches(&d, &doc! { "$or": [ { "x": 1 }, { "_id": 1 } ] }).unwrap());
        assert!(!matches(&d, &doc! { "$nor": [ { "x": 5 } ] }).unwrap());
    }

    #[test]
    fn unknown_operator_is_bad_value() {
        let err = matches(&doc! { "x": 1 }, &doc! { "x": { "$regexish": 1 } }).unwrap_err();
        assert_eq!(err.code(), Some(2));
    }

    #[test]
    fn set_unset_inc() {
        let mut d = doc! { "_id": 1, "x": 1, "y": 2 };
        let update = UpdateModification::Document(doc! {
            "$inc": { "x": 1 },
            "$unset": { "y": "" },
            "$set": { "a.b": true },
        });
        assert!(apply_update(&mut d, &update).unwrap());
        assert_eq!(d, doc! { "_id": 1, "x": 2, "a": { "b": true } });
    }

    #[test]
    fn noop_update_is_not_a_modification() {
        let mut d = doc! { "_id": 1, "x": 1 };
        let update = UpdateModification::Document(doc! { "$set": { "x": 1 } });
        assert!(!apply_update(&mut d, &update).unwrap());
    }

    #[test]
    fn pipeline_update_references_fields() {
        let mut d = doc! { "_id": 1, "x": 1 };
        let update = UpdateModification::Pipeline(vec![doc! { "$set": { "y": "$x" } }, doc! { "$unset": "x" }]);
        apply_update(&mut d, &update).unwrap();
        assert_eq!(d, doc! { "_id": 1, "y": 1 });
    }

    #[test]
    fn updating_id_is_rejected() {
        let mut d = doc! { "_id": 1 };
        let update = UpdateModification::Document(doc! { "$set": { "_id": 2 } });
        assert_eq!(apply_update(&mut d, &update).unwrap_err().code(), Some(66));
    }

    #[test]
    fn operator_free_update_is_a_client_error() {
        let err = validate_update(&UpdateModification::Document(doc! { "x": 1 })).unwrap_err();
        assert!(err.is_client_error());
        assert!(validate_replacement(&doc! { "$set": { "x": 1 } }).is_err());
    }

    #[test]
    fn projection_modes() {
        let d = doc! { "_id": 1, "a": 1, "b": 2 };
        assert_eq!(project(&d, &doc! { "a": 1 }).unwrap(), doc! { "_id": 1, "a": 1 });
        assert_eq!(project(&d, &doc! { "a": 0 }).unwrap(), doc! { "_id": 1, "b": 2 });
        assert_eq!(project(&d, &doc! { "_id": 0, "b": 1 }).unwrap(), doc! { "b": 2 });
        assert!(project(&d, &doc! { "a": 1, "b": 0 }).is_err());
    }

    #[test]
    fn select_sorts_skips_and_limits() {
        let docs = vec![doc! { "_id": 3 }, doc! { "_id": 1 }, doc! { "_id": 2 }];
        let out = select(docs, &doc! {}, Some(&doc! { "_id": -1 }), Some(1), Some(1), None).unwrap();
        assert_eq!(out, vec![doc! { "_id": 2 }]);
    }

    #[test]
    fn pipeline_stages() {
        let docs = vec![doc! { "_id": 1, "x": 1 }, doc! { "_id": 2, "x": 2 }, doc! { "_id": 3, "x": 3 }];
        let pipeline = vec![
            doc! { "$match": { "x": { "$gte": 2 } } },
            doc! { "$sort": { "x": -1 } },
            doc! { "$project": { "_id": 0, "x": 1 } },
        ];
        assert_eq!(
            run_pipeline(docs.clone(), &pipeline).unwrap(),
            vec![doc! { "x": 3 }, doc! { "x": 2 }]
        );
        assert_eq!(
            run_pipeline(docs, &[doc! { "$count": "n" }]).unwrap(),
            vec![doc! { "n": 3 }]
        );
        assert_eq!(
            run_pipeline(vec![], &[doc! { "$out": "x" }]).unwrap_err().code(),
            Some(40324)
        );
    }

    #[test]
    fn upsert_seed_keeps_equality_fields() {
        let seed = upsert_seed(&doc! { "_id": 4, "x": { "$gt": 1 }, "$or": [] });
        assert_eq!(seed, doc! { "_id": 4 });
    }
}

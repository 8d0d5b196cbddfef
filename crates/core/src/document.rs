//! Helpers over the BSON value model.

use std::cmp::Ordering;

use bson::{Bson, Document};

/// The `$type` alias of a value, as used by `$$type` assertions.
pub fn type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Document(_) => "object",
        Bson::Array(_) => "array",
        Bson::Binary(_) => "binData",
        Bson::Undefined => "undefined",
        Bson::ObjectId(_) => "objectId",
        Bson::Boolean(_) => "bool",
        Bson::DateTime(_) => "date",
        Bson::Null => "null",
        Bson::RegularExpression(_) => "regex",
        Bson::DbPointer(_) => "dbPointer",
        Bson::JavaScriptCode(_) => "javascript",
        Bson::Symbol(_) => "symbol",
        Bson::JavaScriptCodeWithScope(_) => "javascriptWithScope",
        Bson::Int32(_) => "int",
        Bson::Timestamp(_) => "timestamp",
        Bson::Int64(_) => "long",
        Bson::Decimal128(_) => "decimal",
        Bson::MinKey => "minKey",
        Bson::MaxKey => "maxKey",
    }
}

/// Numeric value of an int32, int64 or double.
pub fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(i) => Some(f64::from(*i)),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(d) => Some(*d),
        _ => None,
    }
}

/// Equality that treats int32, int64 and double holding the same number as
/// equal, recursively through documents and arrays.
pub fn values_equal(a: &Bson, b: &Bson) -> bool {
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x == y;
    }
    match (a, b) {
        (Bson::Document(x), Bson::Document(y)) => documents_equal(x, y),
        (Bson::Array(x), Bson::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(l, r)| values_equal(l, r))
        }
        _ => a == b,
    }
}

/// Key-order-sensitive document equality with numeric normalisation.
pub fn documents_equal(a: &Document, b: &Document) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b.iter())
            .all(|((ka, va), (kb, vb))| ka == kb && values_equal(va, vb))
}

/// Ordering between two values of comparable types.
///
/// Numbers compare numerically across int32/int64/double; strings, dates,
/// booleans and object ids compare naturally. Mixed types are unordered.
pub fn compare_values(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.bytes().cmp(&y.bytes())),
        (Bson::Null, Bson::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Look up a dotted path such as `"a.b.c"`.
pub fn lookup_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = doc.get(first)?;
    for segment in segments {
        current = match current {
            Bson::Document(d) => d.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn numeric_types_compare_equal() {
        assert!(values_equal(&Bson::Int32(1), &Bson::Int64(1)));
        assert!(values_equal(&Bson::Int64(2), &Bson::Double(2.0)));
        assert!(!values_equal(&Bson::Int32(1), &Bson::String("1".into())));
    }

    #[test]
    fn nested_documents_normalise_numbers() {
        let a = doc! { "_id": 1, "x": { "y": [1, 2] } };
        let b = doc! { "_id": 1_i64, "x": { "y": [1.0, 2_i64] } };
        assert!(documents_equal(&a, &b));
        assert!(!documents_equal(&a, &doc! { "_id": 1 }));
    }

    #[test]
    fn dotted_lookup() {
        let d = doc! { "a": { "b": [ { "c": 5 } ] } };
        assert_eq!(lookup_path(&d, "a.b.0.c"), Some(&Bson::Int32(5)));
        assert_eq!(lookup_path(&d, "a.x"), None);
    }

    #[test]
    fn mixed_types_are_unordered() {
        assert_eq!(compare_values(&Bson::Int32(1), &Bson::Double(1.5)), Some(Ordering::Less));
        assert_eq!(compare_values(&Bson::Int32(1), &Bson::String("a".into())), None);
    }

    #[test]
    fn type_aliases() {
        assert_eq!(type_name(&Bson::Int64(1)), "long");
        assert_eq!(type_name(&Bson::Document(doc! {})), "object");
    }
}

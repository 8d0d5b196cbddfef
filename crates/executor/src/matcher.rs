//! Matching of actual values against expected values.
//!
//! Rules:
//! - Numbers compare by value across int32, int64 and double.
//! - A root-level document may carry fields the expectation does not name.
//!   Nested documents may not. Elements of a root-level array are root-level.
//! - Arrays must have the same length and match element by element.
//! - A document whose single key starts with `$$` is an operator:
//!
//! | Operator | Meaning |
//! |----------|---------|
//! | `$$exists: bool` | field presence (field position only) |
//! | `$$type: name \| [names]` | type alias; `number` matches any numeric |
//! | `$$unsetOrMatches: value` | field absent, or matches `value` |
//! | `$$sessionLsid: id` | equals the lsid of session entity `id` |
//! | `$$matchesEntity: id` | matches the value saved as entity `id` |
//! | `$$lte: number` | numeric, at most `number` |

use std::fmt;

use bson::{Bson, Document};
use unified_core::document::{as_number, type_name, values_equal};

use crate::entity::EntityMap;

/// Where and why a match failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub path: String,
    pub reason: String,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.reason)
    }
}

type MatchResult = std::result::Result<(), Mismatch>;

/// Match with root-level extra-field leniency.
pub fn match_root(expected: &Bson, actual: &Bson, entities: &EntityMap) -> MatchResult {
    Matcher { entities }.value(expected, actual, "$", true)
}

/// Match without extra-field leniency at any level.
pub fn match_exact(expected: &Bson, actual: &Bson, entities: &EntityMap) -> MatchResult {
    Matcher { entities }.value(expected, actual, "$", false)
}

/// Operator name of an expectation such as `{ "$$type": "int" }`.
fn special_operator(expected: &Document) -> Option<(&str, &Bson)> {
    if expected.len() != 1 {
        return None;
    }
    let (key, value) = expected.iter().next()?;
    key.starts_with("$$").then_some((key.as_str(), value))
}

fn mismatch(path: &str, reason: impl Into<String>) -> MatchResult {
    Err(Mismatch {
        path: path.to_string(),
        reason: reason.into(),
    })
}

struct Matcher<'a> {
    entities: &'a EntityMap,
}

impl Matcher<'_> {
    fn value(&self, expected: &Bson, actual: &Bson, path: &str, root: bool) -> MatchResult {
        match expected {
            Bson::Document(expected) => {
                if let Some((operator, argument)) = special_operator(expected) {
                    return self.operator(operator, argument, Some(actual), path, root);
                }
                match actual {
                    Bson::Document(actual) => self.document(expected, actual, path, root),
                    other => mismatch(path, format!("expected a document, got {}", type_name(other))),
                }
            }
            Bson::Array(expected) => {
                let Bson::Array(actual) = actual else {
                    return mismatch(path, format!("expected an array, got {}", type_name(actual)));
                };
                if expected.len() != actual.len() {
                    return mismatch(
                        path,
                        format!("expected {} elements, got {}", expected.len(), actual.len()),
                    );
                }
                for (i, (e, a)) in expected.iter().zip(actual.iter()).enumerate() {
                    self.value(e, a, &format!("{}[{}]", path, i), root)?;
                }
                Ok(())
            }
            _ => {
                if values_equal(expected, actual) {
                    Ok(())
                } else {
                    mismatch(path, format!("expected {}, got {}", expected, actual))
                }
            }
        }
    }

    fn document(&self, expected: &Document, actual: &Document, path: &str, root: bool) -> MatchResult {
        for (key, value) in expected {
            let field_path = format!("{}.{}", path, key);
            if let Bson::Document(inner) = value {
                if let Some((operator, argument)) = special_operator(inner) {
                    if operator == "$$exists" || actual.get(key).is_none() {
                        self.operator(operator, argument, actual.get(key), &field_path, false)?;
                        continue;
                    }
                }
            }
            match actual.get(key) {
                Some(actual_value) => self.value(value, actual_value, &field_path, false)?,
                None => return mismatch(&field_path, "missing field"),
            }
        }
        if !root {
            if let Some(extra) = actual.keys().find(|k| !expected.contains_key(k.as_str())) {
                return mismatch(&format!("{}.{}", path, extra), "unexpected field");
            }
        }
        Ok(())
    }

    fn operator(
        &self,
        operator: &str,
        argument: &Bson,
        actual: Option<&Bson>,
        path: &str,
        root: bool,
    ) -> MatchResult {
        match operator {
            "$$exists" => {
                let Bson::Boolean(should_exist) = argument else {
                    return mismatch(path, "$$exists requires a boolean");
                };
                match (actual.is_some(), *should_exist) {
                    (true, false) => mismatch(path, "field should not exist"),
                    (false, true) => mismatch(path, "field should exist"),
                    _ => Ok(()),
                }
            }
            "$$unsetOrMatches" => match actual {
                None => Ok(()),
                Some(actual) => self.value(argument, actual, path, root),
            },
            _ => {
                let Some(actual) = actual else {
                    return mismatch(path, "missing field");
                };
                match operator {
                    "$$type" => self.type_check(argument, actual, path),
                    "$$sessionLsid" => self.session_lsid(argument, actual, path),
                    "$$matchesEntity" => self.matches_entity(argument, actual, path, root),
                    "$$lte" => match (as_number(argument), as_number(actual)) {
                        (Some(limit), Some(value)) if value <= limit => Ok(()),
                        (Some(_), Some(_)) => mismatch(path, format!("{} is greater than {}", actual, argument)),
                        _ => mismatch(path, "$$lte requires numbers"),
                    },
                    other => mismatch(path, format!("unsupported operator {}", other)),
                }
            }
        }
    }

    fn type_check(&self, argument: &Bson, actual: &Bson, path: &str) -> MatchResult {
        let names: Vec<&str> = match argument {
            Bson::String(name) => vec![name.as_str()],
            Bson::Array(names) => names.iter().filter_map(Bson::as_str).collect(),
            _ => return mismatch(path, "$$type requires a string or a list of strings"),
        };
        let actual_type = type_name(actual);
        let matched = names.iter().any(|name| {
            *name == actual_type
                || (*name == "number" && matches!(actual_type, "int" | "long" | "double" | "decimal"))
        });
        if matched {
            Ok(())
        } else {
            mismatch(path, format!("expected type {}, got {}", names.join(" or "), actual_type))
        }
    }

    fn session_lsid(&self, argument: &Bson, actual: &Bson, path: &str) -> MatchResult {
        let Some(id) = argument.as_str() else {
            return mismatch(path, "$$sessionLsid requires an entity id");
        };
        let session = self.entities.session(id).map_err(|e| Mismatch {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        let lsid = Bson::Document(session.lsid());
        if values_equal(&lsid, actual) {
            Ok(())
        } else {
            mismatch(path, format!("expected lsid of session {}, got {}", id, actual))
        }
    }

    fn matches_entity(&self, argument: &Bson, actual: &Bson, path: &str, root: bool) -> MatchResult {
        let Some(id) = argument.as_str() else {
            return mismatch(path, "$$matchesEntity requires an entity id");
        };
        let saved = self.entities.value(id).map_err(|e| Mismatch {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        self.value(saved, actual, path, root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn root(expected: Document, actual: Document) -> MatchResult {
        match_root(&Bson::Document(expected), &Bson::Document(actual), &EntityMap::new())
    }

    #[test]
    fn root_allows_extra_fields_but_nested_does_not() {
        assert!(root(doc! { "a": 1 }, doc! { "a": 1, "b": 2 }).is_ok());
        let err = root(doc! { "a": { "x": 1 } }, doc! { "a": { "x": 1, "y": 2 } }).unwrap_err();
        assert_eq!(err.path, "$.a.y");
    }

    #[test]
    fn exact_rejects_root_extra_fields() {
        let result = match_exact(
            &Bson::Document(doc! { "a": 1 }),
            &Bson::Document(doc! { "a": 1, "b": 2 }),
            &EntityMap::new(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn numbers_are_normalised() {
        assert!(root(doc! { "n": 1 }, doc! { "n": 1i64 }).is_ok());
        assert!(root(doc! { "n": 1.0 }, doc! { "n": 1 }).is_ok());
        assert!(root(doc! { "n": 1 }, doc! { "n": 2 }).is_err());
    }

    #[test]
    fn exists_and_unset_or_matches() {
        assert!(root(doc! { "a": { "$$exists": false } }, doc! { "b": 1 }).is_ok());
        assert!(root(doc! { "a": { "$$exists": true } }, doc! { "b": 1 }).is_err());
        assert!(root(doc! { "a": { "$$exists": false } }, doc! { "a": 1 }).is_err());
        assert!(root(doc! { "a": { "$$unsetOrMatches": 5 } }, doc! {}).is_ok());
        assert!(root(doc! { "a": { "$$unsetOrMatches": 5 } }, doc! { "a": 5 }).is_ok());
        assert!(root(doc! { "a": { "$$unsetOrMatches": 5 } }, doc! { "a": 6 }).is_err());
    }

    #[test]
    fn type_operator_accepts_lists_and_number() {
        assert!(root(doc! { "a": { "$$type": "int" } }, doc! { "a": 1 }).is_ok());
        assert!(root(doc! { "a": { "$$type": ["long", "string"] } }, doc! { "a": "x" }).is_ok());
        assert!(root(doc! { "a": { "$$type": "number" } }, doc! { "a": 1.5 }).is_ok());
        assert!(root(doc! { "a": { "$$type": "objectId" } }, doc! { "a": 1 }).is_err());
    }

    #[test]
    fn arrays_require_equal_length() {
        let err = root(doc! { "a": [1, 2] }, doc! { "a": [1, 2, 3] }).unwrap_err();
        assert_eq!(err.path, "$.a");
    }

    #[test]
    fn lte_compares_numerically() {
        assert!(root(doc! { "t": { "$$lte": 10 } }, doc! { "t": 3i64 }).is_ok());
        assert!(root(doc! { "t": { "$$lte": 10 } }, doc! { "t": 11 }).is_err());
    }
}

//! Typed access to an operation's raw argument document.

use bson::{Bson, Document};
use serde::de::DeserializeOwned;
use unified_core::{Error, Result};

/// The `arguments` of one operation, tagged with the operation name for
/// error reporting.
#[derive(Debug, Clone, Copy)]
pub struct Arguments<'a> {
    operation: &'a str,
    raw: &'a Document,
}

impl<'a> Arguments<'a> {
    pub fn new(operation: &'a str, raw: &'a Document) -> Self {
        Self { operation, raw }
    }

    pub fn operation(&self) -> &'a str {
        self.operation
    }

    pub fn raw(&self) -> &'a Document {
        self.raw
    }

    fn invalid(&self, reason: impl Into<String>) -> Error {
        Error::InvalidArguments {
            operation: self.operation.to_string(),
            reason: reason.into(),
        }
    }

    fn convert<T: DeserializeOwned>(&self, key: &str, value: &Bson) -> Result<T> {
        bson::from_bson(value.clone()).map_err(|e| self.invalid(format!("'{}': {}", key, e)))
    }

    /// A required argument.
    pub fn required<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        match self.raw.get(key) {
            Some(value) => self.convert(key, value),
            None => Err(self.invalid(format!("missing required argument '{}'", key))),
        }
    }

    /// An optional argument. An explicit `null` counts as absent.
    pub fn optional<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.raw.get(key) {
            None | Some(Bson::Null) => Ok(None),
            Some(value) => self.convert(key, value).map(Some),
        }
    }

    /// The `session` argument: an entity id.
    pub fn session(&self) -> Result<Option<String>> {
        self.optional("session")
    }

    /// The operation's options structure, decoded from the whole argument
    /// document. Keys that are not option fields are ignored here; the
    /// closed-world check rejects the ones nothing recognises.
    pub fn options<T: DeserializeOwned>(&self) -> Result<T> {
        bson::from_document(self.raw.clone()).map_err(|e| self.invalid(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn missing_required_argument_names_the_key() {
        let raw = doc! {};
        let args = Arguments::new("insertOne", &raw);
        let err = args.required::<Document>("document").unwrap_err();
        assert!(matches!(err, Error::InvalidArguments { ref operation, .. } if operation == "insertOne"));
        assert!(err.to_string().contains("document"));
    }

    #[test]
    fn null_optional_is_absent() {
        let raw = doc! { "filter": Bson::Null, "session": "s0" };
        let args = Arguments::new("find", &raw);
        assert_eq!(args.optional::<Document>("filter").unwrap(), None);
        assert_eq!(args.session().unwrap(), Some("s0".to_string()));
    }

    #[test]
    fn ill_typed_argument_is_rejected() {
        let raw = doc! { "fieldName": 5 };
        let args = Arguments::new("distinct", &raw);
        assert!(args.required::<String>("fieldName").is_err());
    }
}

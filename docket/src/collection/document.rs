use crate::common::{
    Value, DOC_ETAG, DOC_ID, DOC_SELF, DOC_TIMESTAMP, INVALID_ID_CHARS, MAX_ID_LENGTH,
    SYSTEM_FIELDS,
};
use crate::errors::{DocketError, DocketResult, ErrorKind};
use indexmap::IndexMap;
use itertools::Itertools;
use std::fmt::{Debug, Display, Formatter};

const FIELD_SEPARATOR: char = '.';

/// A JSON-like document body.
///
/// A `Document` is an insertion-ordered map from field name to [Value]. Field
/// names may be dotted paths (`"address.countryRegionName"`) when reading or
/// writing, in which case nested documents are traversed or created as needed.
/// Numeric path segments index into arrays on read.
///
/// Every stored document is identified by its `id` field. The store also
/// stamps three system fields on each persisted revision:
///
/// - `_etag`: opaque version marker, changes on every write
/// - `_ts`: time of the last write in epoch milliseconds
/// - `_self`: `colls/<collection>/docs/<id>`
///
/// System fields cannot be written through [Document::put]; they are removed
/// from incoming bodies before the store writes them.
///
/// # Examples
///
/// ```rust
/// use docket::doc;
///
/// let doc = doc! {
///     id: "Andersen.1",
///     name: "John Doe",
///     address: { countryRegionName: "Germany" },
/// };
/// assert_eq!(doc.id(), Some("Andersen.1"));
/// assert_eq!(
///     doc.get("address.countryRegionName").and_then(|v| v.as_str()),
///     Some("Germany")
/// );
/// ```
#[derive(Clone, Default, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
pub struct Document {
    data: IndexMap<String, Value>,
}

impl Document {
    /// Creates an empty document.
    pub fn new() -> Self {
        Document {
            data: IndexMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the number of top-level fields.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Checks whether a top-level field exists.
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Checks whether a (possibly dotted) field path resolves to a value.
    pub fn contains_field(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.data.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.data.iter()
    }

    /// Associates `value` with `key`.
    ///
    /// # Arguments
    ///
    /// * `key` - A field name or a dotted path. Intermediate documents are
    ///   created when missing.
    /// * `value` - Anything convertible into a [Value].
    ///
    /// # Errors
    ///
    /// * `InvalidOperation` if the key is empty, names a system field, or a
    ///   path segment runs through a non-document value.
    /// * `InvalidId` if the key is `id` and the value is not a string.
    pub fn put<T: Into<Value>>(&mut self, key: &str, value: T) -> DocketResult<()> {
        if key.is_empty() {
            log::error!("Document does not support empty key");
            return Err(DocketError::new(
                "Document does not support empty key",
                ErrorKind::InvalidOperation,
            ));
        }

        if SYSTEM_FIELDS.contains(&key) {
            log::error!("{} is a system field and cannot be set manually", key);
            return Err(DocketError::new(
                &format!("{} is a system field and cannot be set manually", key),
                ErrorKind::InvalidOperation,
            ));
        }

        let value = value.into();
        if key == DOC_ID && !value.is_string() {
            log::error!("Document id must be a string, found {}", value.type_name());
            return Err(DocketError::new(
                &format!("Document id must be a string, found {}", value.type_name()),
                ErrorKind::InvalidId,
            ));
        }

        if key.contains(FIELD_SEPARATOR) {
            let splits: Vec<&str> = key.split(FIELD_SEPARATOR).collect();
            self.deep_put(&splits, value)
        } else {
            self.data.insert(key.to_string(), value);
            Ok(())
        }
    }

    /// Returns the value at `path`, or `None` if any segment is missing.
    ///
    /// Dotted paths descend into nested documents; numeric segments index into
    /// arrays (`"tags.0"`).
    pub fn get(&self, path: &str) -> Option<&Value> {
        if let Some(value) = self.data.get(path) {
            return Some(value);
        }
        if !path.contains(FIELD_SEPARATOR) {
            return None;
        }

        let mut segments = path.split(FIELD_SEPARATOR);
        let mut current = self.data.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Document(doc) => doc.data.get(segment)?,
                Value::Array(values) => {
                    let index = segment.parse::<usize>().ok()?;
                    values.get(index)?
                }
                _ => return None,
            };
        }
        Some(current)
    }

    /// Removes the value at `path` and returns it.
    pub fn remove(&mut self, path: &str) -> Option<Value> {
        if let Some(value) = self.data.shift_remove(path) {
            return Some(value);
        }

        let (parent, last) = path.rsplit_once(FIELD_SEPARATOR)?;
        let mut current = &mut self.data;
        for segment in parent.split(FIELD_SEPARATOR) {
            current = match current.get_mut(segment)? {
                Value::Document(doc) => &mut doc.data,
                _ => return None,
            };
        }
        current.shift_remove(last)
    }

    /// Returns the document id if it is present and a non-empty string.
    pub fn id(&self) -> Option<&str> {
        match self.data.get(DOC_ID) {
            Some(Value::String(id)) if !id.is_empty() => Some(id.as_str()),
            _ => None,
        }
    }

    /// Sets the document id after validating it.
    pub fn set_id(&mut self, id: &str) -> DocketResult<()> {
        validate_id(id)?;
        self.data.insert(DOC_ID.to_string(), Value::from(id));
        Ok(())
    }

    /// Returns the etag stamped by the store, if the document was persisted.
    pub fn etag(&self) -> Option<&str> {
        self.data.get(DOC_ETAG).and_then(|v| v.as_str())
    }

    /// Returns the last write time in epoch milliseconds.
    pub fn timestamp(&self) -> Option<i64> {
        self.data.get(DOC_TIMESTAMP).and_then(|v| v.as_i64())
    }

    pub fn self_link(&self) -> Option<&str> {
        self.data.get(DOC_SELF).and_then(|v| v.as_str())
    }

    /// Writes a field without validation. Used by the store for system fields.
    pub(crate) fn put_system(&mut self, key: &str, value: Value) {
        self.data.insert(key.to_string(), value);
    }

    /// Removes every system field, leaving the user body.
    pub(crate) fn strip_system_fields(&mut self) {
        for field in SYSTEM_FIELDS {
            self.data.shift_remove(field);
        }
    }

    /// Inserts a top-level field as-is. Used when decoding foreign maps.
    pub(crate) fn insert_raw(&mut self, key: String, value: Value) {
        self.data.insert(key, value);
    }

    pub(crate) fn to_json_string(&self) -> String {
        format!(
            "{{{}}}",
            self.data
                .iter()
                .map(|(key, value)| format!("{:?}: {}", key, value.to_json_string()))
                .join(", ")
        )
    }

    /// Parses a JSON object into a document.
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> DocketResult<Document> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        match Value::from(value) {
            Value::Document(doc) => Ok(doc),
            other => {
                log::error!("Expected a JSON object, found {}", other.type_name());
                Err(DocketError::new(
                    &format!("Expected a JSON object, found {}", other.type_name()),
                    ErrorKind::EncodingError,
                ))
            }
        }
    }

    /// Serializes the document, system fields included, as a JSON object.
    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> DocketResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    fn deep_put(&mut self, splits: &[&str], value: Value) -> DocketResult<()> {
        let (head, rest) = match splits.split_first() {
            Some(parts) => parts,
            None => return Ok(()),
        };

        if head.is_empty() {
            log::error!("Document does not support empty key segment");
            return Err(DocketError::new(
                "Document does not support empty key segment",
                ErrorKind::InvalidOperation,
            ));
        }

        if rest.is_empty() {
            self.data.insert(head.to_string(), value);
            return Ok(());
        }

        let entry = self
            .data
            .entry(head.to_string())
            .or_insert_with(|| Value::Document(Document::new()));
        if entry.is_null() {
            *entry = Value::Document(Document::new());
        }
        match entry {
            Value::Document(nested) => nested.deep_put(rest, value),
            other => {
                log::error!(
                    "Cannot write through field {} holding a {}",
                    head,
                    other.type_name()
                );
                Err(DocketError::new(
                    &format!("Cannot write through field {} holding a {}", head, other.type_name()),
                    ErrorKind::InvalidOperation,
                ))
            }
        }
    }
}

impl IntoIterator for Document {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.into_iter()
    }
}

impl Display for Document {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_json_string())
    }
}

impl Debug for Document {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_json_string())
    }
}

/// Checks that `id` can be used as a document id.
///
/// An id must be non-empty, at most 255 characters long, and free of the
/// characters `/`, `\`, `?` and `#`.
pub fn validate_id(id: &str) -> DocketResult<()> {
    if id.is_empty() {
        log::error!("Document id cannot be empty");
        return Err(DocketError::new(
            "Document id cannot be empty",
            ErrorKind::InvalidId,
        ));
    }

    if id.chars().count() > MAX_ID_LENGTH {
        log::error!("Document id exceeds {} characters", MAX_ID_LENGTH);
        return Err(DocketError::new(
            &format!("Document id exceeds {} characters", MAX_ID_LENGTH),
            ErrorKind::InvalidId,
        ));
    }

    if let Some(c) = id.chars().find(|c| INVALID_ID_CHARS.contains(c)) {
        log::error!("Document id {} contains invalid character {:?}", id, c);
        return Err(DocketError::new(
            &format!("Document id {} contains invalid character {:?}", id, c),
            ErrorKind::InvalidId,
        ));
    }
    Ok(())
}

/// Generates a fresh globally unique document id.
pub fn new_document_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Strips surrounding quotes from a stringified macro key.
#[doc(hidden)]
pub fn normalize(value: &str) -> String {
    value.trim_matches('"').to_string()
}

/// Creates a [Document] with JSON-like syntax.
///
/// # Examples
///
/// ```rust
/// use docket::doc;
///
/// let empty = doc!{};
/// assert!(empty.is_empty());
///
/// let nested = doc!{
///     id: "WakefieldFamily",
///     parents: [{ familyName: "Wakefield" }, { givenName: "Robin" }],
///     "address.city": "Seattle",
/// };
/// assert_eq!(nested.get("address.city").and_then(|v| v.as_str()), Some("Seattle"));
/// ```
///
/// Panics if a key is rejected by [Document::put].
#[macro_export]
macro_rules! doc {
    ({}) => {
        $crate::collection::Document::new()
    };

    () => {
        $crate::collection::Document::new()
    };

    ({ $($key:tt : $value:tt),* $(,)? }) => {
        $crate::doc!($($key : $value),*)
    };

    ($($key:tt : $value:tt),* $(,)?) => {
        {
            #[allow(unused_imports)]
            use $crate::doc_value;

            let mut doc = $crate::collection::Document::new();
            $(
                doc.put(&$crate::collection::normalize(stringify!($key)), $crate::doc_value!($value))
                .expect(&format!("Failed to put value {} in document", stringify!($value)));
            )*
            doc
        }
    };
}

/// Converts a `doc!` value token tree into a [crate::common::Value].
#[macro_export]
macro_rules! doc_value {
    ({ $($key:tt : $value:tt),* $(,)? }) => {
        {
            $crate::common::Value::Document($crate::doc!{ $($key : $value),* })
        }
    };

    ([ $($value:tt),* $(,)? ]) => {
        $crate::common::Value::Array(vec![$($crate::doc_value!($value)),*])
    };

    ($value:expr) => {
        $crate::common::Value::from($value)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    fn family() -> Document {
        doc! {
            id: "AndersenFamily",
            lastName: "Andersen",
            parents: [
                { firstName: "Thomas" },
                { firstName: "Mary Kay" },
            ],
            address: {
                state: "WA",
                county: "King",
                city: "Seattle",
            },
            isRegistered: true,
        }
    }

    #[test]
    fn get_dotted_paths_and_array_indexes() {
        let doc = family();
        assert_eq!(doc.get("address.city"), Some(&Value::from("Seattle")));
        assert_eq!(doc.get("parents.1.firstName"), Some(&Value::from("Mary Kay")));
        assert_eq!(doc.get("parents.5.firstName"), None);
        assert_eq!(doc.get("address.zip"), None);
        assert_eq!(doc.get("lastName.first"), None);
    }

    #[test]
    fn put_dotted_path_creates_nested_documents() {
        let mut doc = Document::new();
        doc.put("address.isNorthAmerica", true).unwrap();
        assert_eq!(doc.get("address.isNorthAmerica"), Some(&Value::Bool(true)));
        assert!(doc.get("address").unwrap().is_document());
    }

    #[test]
    fn put_through_scalar_fails() {
        let mut doc = doc! { address: "flat" };
        let err = doc.put("address.city", "Seattle").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidOperation);
    }

    #[test]
    fn put_rejects_empty_and_system_keys() {
        let mut doc = Document::new();
        assert_eq!(doc.put("", 1).unwrap_err().kind(), &ErrorKind::InvalidOperation);
        assert_eq!(doc.put("_etag", "x").unwrap_err().kind(), &ErrorKind::InvalidOperation);
        assert_eq!(doc.put("_ts", 1).unwrap_err().kind(), &ErrorKind::InvalidOperation);
        assert_eq!(doc.put("a..b", 1).unwrap_err().kind(), &ErrorKind::InvalidOperation);
    }

    #[test]
    fn put_rejects_non_string_id() {
        let mut doc = Document::new();
        assert_eq!(doc.put("id", 42).unwrap_err().kind(), &ErrorKind::InvalidId);
        assert!(doc.put("id", "ok").is_ok());
    }

    #[test]
    fn id_is_none_when_empty_or_missing() {
        assert_eq!(Document::new().id(), None);
        assert_eq!(doc! { id: "" }.id(), None);
        assert_eq!(family().id(), Some("AndersenFamily"));
    }

    #[test]
    fn set_id_validates() {
        let mut doc = Document::new();
        assert!(doc.set_id("DUPEJ12345").is_ok());
        assert_eq!(doc.set_id("a/b").unwrap_err().kind(), &ErrorKind::InvalidId);
        assert_eq!(doc.set_id("").unwrap_err().kind(), &ErrorKind::InvalidId);
        let long = "x".repeat(MAX_ID_LENGTH + 1);
        assert_eq!(doc.set_id(&long).unwrap_err().kind(), &ErrorKind::InvalidId);
        assert_eq!(doc.id(), Some("DUPEJ12345"));
    }

    #[test]
    fn remove_top_level_and_nested() {
        let mut doc = family();
        assert_eq!(doc.remove("address.county"), Some(Value::from("King")));
        assert_eq!(doc.get("address.county"), None);
        assert_eq!(doc.remove("lastName"), Some(Value::from("Andersen")));
        assert_eq!(doc.remove("missing.path"), None);
    }

    #[test]
    fn strip_system_fields_keeps_body() {
        let mut doc = family();
        doc.put_system(DOC_ETAG, Value::from("1"));
        doc.put_system(DOC_TIMESTAMP, Value::from(10));
        doc.put_system(DOC_SELF, Value::from("colls/c/docs/AndersenFamily"));
        assert_eq!(doc.etag(), Some("1"));
        assert_eq!(doc.timestamp(), Some(10));

        doc.strip_system_fields();
        assert_eq!(doc, family());
    }

    #[test]
    fn insertion_order_is_kept() {
        let doc = doc! { z: 1, a: 2, m: 3 };
        let keys: Vec<&String> = doc.keys().collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn display_renders_json_like_text() {
        let doc = doc! { id: "a", n: 1 };
        assert_eq!(format!("{}", doc), r#"{"id": "a", "n": 1}"#);
    }

    #[test]
    fn new_document_ids_are_unique() {
        let a = new_document_id();
        let b = new_document_id();
        assert_ne!(a, b);
        assert!(validate_id(&a).is_ok());
    }

    #[test]
    fn normalize_strips_quotes() {
        assert_eq!(normalize("\"address.city\""), "address.city");
        assert_eq!(normalize("plain"), "plain");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn json_round_trip() {
        let doc = Document::from_json(
            r#"{"id":"SalesOrder1","items":[{"qty":1}],"total":5.5}"#,
        )
        .unwrap();
        assert_eq!(doc.id(), Some("SalesOrder1"));
        assert_eq!(doc.get("items.0.qty"), Some(&Value::I64(1)));

        let json = doc.to_json().unwrap();
        assert_eq!(Document::from_json(&json).unwrap(), doc);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn from_json_rejects_non_objects() {
        let err = Document::from_json("[1, 2]").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::EncodingError);
        let err = Document::from_json("{bad").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::EncodingError);
    }
}

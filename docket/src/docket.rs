use crate::collection::Collection;
use crate::common::INVALID_ID_CHARS;
use crate::docket_builder::DocketBuilder;
use crate::docket_config::DocketConfig;
use crate::errors::{DocketError, DocketResult, ErrorKind};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The database handle: a named set of [Collection]s sharing one
/// [DocketConfig].
///
/// `Docket` uses the PIMPL pattern; clones are cheap and share the same
/// collections. Everything lives in memory and is gone once the last clone
/// is dropped or [Docket::close] is called.
///
/// # Examples
///
/// ```rust
/// use docket::Docket;
/// use docket::collection::RequestOptions;
/// use docket::doc;
///
/// let db = Docket::builder().open().unwrap();
/// let families = db.collection("families").unwrap();
/// families
///     .create_document(doc! { id: "AndersenFamily" }, &RequestOptions::new())
///     .unwrap();
///
/// assert_eq!(db.list_collection_names().unwrap(), vec!["families"]);
/// db.close().unwrap();
/// assert!(db.collection("families").is_err());
/// ```
#[derive(Clone)]
pub struct Docket {
    inner: Arc<DocketInner>,
}

impl Docket {
    /// Creates a [DocketBuilder] for configuring and opening a database.
    pub fn builder() -> DocketBuilder {
        DocketBuilder::new()
    }

    pub(crate) fn new(config: DocketConfig) -> Self {
        Docket {
            inner: Arc::new(DocketInner {
                config,
                collections: DashMap::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Gets a collection by name, creating it if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is closed or the name is invalid.
    pub fn collection(&self, name: &str) -> DocketResult<Collection> {
        self.inner.collection(name, false)
    }

    /// Creates a collection that must not exist yet.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` if the collection already exists.
    pub fn create_collection(&self, name: &str) -> DocketResult<Collection> {
        self.inner.collection(name, true)
    }

    pub fn has_collection(&self, name: &str) -> DocketResult<bool> {
        self.inner.check_opened()?;
        Ok(self.inner.collections.contains_key(name))
    }

    /// Names of all collections in lexical order.
    pub fn list_collection_names(&self) -> DocketResult<Vec<String>> {
        self.inner.check_opened()?;
        let mut names: Vec<String> = self
            .inner
            .collections
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        Ok(names)
    }

    /// Drops a collection with all of its documents, triggers and procedures.
    ///
    /// Outstanding handles to the collection reject further requests.
    ///
    /// # Errors
    ///
    /// `CollectionNotFound` if no such collection exists.
    pub fn drop_collection(&self, name: &str) -> DocketResult<()> {
        self.inner.check_opened()?;
        match self.inner.collections.remove(name) {
            Some((_, collection)) => {
                collection.mark_dropped();
                collection.store().clear();
                log::debug!("Dropped collection {}", name);
                Ok(())
            }
            None => {
                log::error!("Collection {} does not exist", name);
                Err(DocketError::new(
                    &format!("Collection {} does not exist", name),
                    ErrorKind::CollectionNotFound,
                ))
            }
        }
    }

    /// Closes the database. Closing twice is a no-op.
    pub fn close(&self) -> DocketResult<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        for entry in self.inner.collections.iter() {
            entry.value().mark_dropped();
        }
        self.inner.collections.clear();
        log::debug!("Docket database closed");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &DocketConfig {
        &self.inner.config
    }
}

struct DocketInner {
    config: DocketConfig,
    collections: DashMap<String, Collection>,
    closed: AtomicBool,
}

impl DocketInner {
    fn collection(&self, name: &str, must_be_new: bool) -> DocketResult<Collection> {
        self.check_opened()?;
        validate_collection_name(name)?;

        match self.collections.entry(name.to_string()) {
            Entry::Occupied(entry) => {
                if must_be_new {
                    log::error!("Collection {} already exists", name);
                    return Err(DocketError::new(
                        &format!("Collection {} already exists", name),
                        ErrorKind::InvalidOperation,
                    ));
                }
                Ok(entry.get().clone())
            }
            Entry::Vacant(entry) => {
                let collection = Collection::new(name, self.config.clone())?;
                entry.insert(collection.clone());
                log::debug!("Created collection {}", name);
                Ok(collection)
            }
        }
    }

    fn check_opened(&self) -> DocketResult<()> {
        if self.closed.load(Ordering::Acquire) {
            log::error!("Docket database is closed");
            return Err(DocketError::new(
                "Docket database is closed",
                ErrorKind::InvalidOperation,
            ));
        }
        Ok(())
    }
}

fn validate_collection_name(name: &str) -> DocketResult<()> {
    if name.trim().is_empty() {
        log::error!("Collection name cannot be empty");
        return Err(DocketError::new(
            "Collection name cannot be empty",
            ErrorKind::InvalidOperation,
        ));
    }
    if name.contains(INVALID_ID_CHARS) {
        log::error!("Collection name {} contains a reserved character", name);
        return Err(DocketError::new(
            &format!("Collection name {} contains a reserved character", name),
            ErrorKind::InvalidOperation,
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::RequestOptions;
    use crate::doc;

    // Setup only one time throughout the crate's unit tests.
    #[ctor::ctor]
    fn init() {
        colog::init();
    }

    fn open() -> Docket {
        Docket::builder().open().unwrap()
    }

    #[test]
    fn test_collection_is_shared() {
        let db = open();
        let a = db.collection("families").unwrap();
        let b = db.clone().collection("families").unwrap();
        a.create_document(doc! { id: "x" }, &RequestOptions::new()).unwrap();
        assert!(b.store().contains("x"));
        assert!(db.has_collection("families").unwrap());
        assert!(!db.has_collection("other").unwrap());
    }

    #[test]
    fn test_create_collection_twice() {
        let db = open();
        db.create_collection("families").unwrap();
        let err = db.create_collection("families").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidOperation);
    }

    #[test]
    fn test_invalid_collection_names() {
        let db = open();
        assert!(db.collection("").is_err());
        assert!(db.collection("  ").is_err());
        assert!(db.collection("a/b").is_err());
    }

    #[test]
    fn test_list_collection_names_sorted() {
        let db = open();
        db.collection("b").unwrap();
        db.collection("a").unwrap();
        assert_eq!(db.list_collection_names().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_drop_collection() {
        let db = open();
        let families = db.collection("families").unwrap();
        families
            .create_document(doc! { id: "x" }, &RequestOptions::new())
            .unwrap();
        db.drop_collection("families").unwrap();
        assert!(families.is_dropped());
        assert!(families.read_document("x").is_err());
        assert!(!db.has_collection("families").unwrap());

        let err = db.drop_collection("families").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::CollectionNotFound);

        let recreated = db.collection("families").unwrap();
        assert!(recreated.store().is_empty());
    }

    #[test]
    fn test_close() {
        let db = open();
        let families = db.collection("families").unwrap();
        db.close().unwrap();
        assert!(db.is_closed());
        db.close().unwrap();
        assert!(families.is_dropped());
        assert_eq!(
            db.collection("families").unwrap_err().kind(),
            &ErrorKind::InvalidOperation
        );
        assert!(db.list_collection_names().is_err());
    }
}

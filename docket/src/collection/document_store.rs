use crate::collection::{new_document_id, validate_id, Document, ScanCursor};
use crate::common::{Value, DOC_ETAG, DOC_ID, DOC_SELF, DOC_TIMESTAMP};
use crate::errors::{DocketError, DocketResult, ErrorKind};
use crate::filter::Filter;
use im::OrdMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// The documents of one collection, keyed by id.
///
/// `DocumentStore` is an ordered map from document id to document body. Every
/// document gets a position when it is created; positions only grow, so full
/// scans return documents in insertion order. Replace keeps a document's
/// position, delete frees it for good.
///
/// # Consistency
///
/// All mutations take a single write lock, so create, replace and delete on
/// the same id are linearizable and two concurrent creates of one id can
/// never both succeed. Scans work on a persistent snapshot of the entry map
/// taken under a read lock, so they never block writers and never observe a
/// half-applied write.
///
/// The store runs no hooks. Trigger handling lives in
/// [crate::trigger::TriggerPipeline], which wraps these calls.
///
/// # Usage
///
/// ```rust
/// use docket::collection::DocumentStore;
/// use docket::doc;
///
/// let store = DocumentStore::new("families");
/// let created = store.create(doc! { id: "Andersen.1", lastName: "Andersen" }).unwrap();
/// assert!(created.etag().is_some());
/// assert!(store.get("Andersen.1").is_some());
/// ```
#[derive(Clone)]
pub struct DocumentStore {
    inner: Arc<DocumentStoreInner>,
}

impl DocumentStore {
    /// Creates an empty store for the named collection.
    pub fn new(collection_name: &str) -> Self {
        DocumentStore {
            inner: Arc::new(DocumentStoreInner::new(collection_name)),
        }
    }

    /// Returns the collection name this store belongs to.
    pub fn name(&self) -> &str {
        &self.inner.collection_name
    }

    /// Inserts a new document.
    ///
    /// System fields in the incoming body are discarded and re-stamped. An
    /// absent or empty id is replaced by a fresh UUID.
    ///
    /// # Returns
    ///
    /// The persisted document, including `_etag`, `_ts` and `_self`.
    ///
    /// # Errors
    ///
    /// * `DuplicateId` if a live document already has this id
    /// * `InvalidId` if the id is malformed or not a string
    pub fn create(&self, document: Document) -> DocketResult<Document> {
        self.inner.create(document)
    }

    /// Overwrites a document's body.
    ///
    /// # Arguments
    ///
    /// * `id` - The id of the document to replace
    /// * `body` - The new body. Its `id` field, if present, must equal `id`.
    /// * `expected_etag` - When given, the write only happens if the stored
    ///   etag still matches.
    ///
    /// # Errors
    ///
    /// * `NotFound` if there is no document with this id
    /// * `Conflict` if `expected_etag` does not match
    /// * `InvalidId` if the body carries a different id
    pub fn replace(
        &self,
        id: &str,
        body: Document,
        expected_etag: Option<&str>,
    ) -> DocketResult<Document> {
        self.inner.replace(id, body, expected_etag)
    }

    /// Removes a document and returns its last persisted revision.
    ///
    /// Deleting is not idempotent: a second delete of the same id fails with
    /// `NotFound`.
    pub fn delete(&self, id: &str) -> DocketResult<Document> {
        self.inner.delete(id)
    }

    /// Reads a document. A missing id is `None`, not an error.
    pub fn get(&self, id: &str) -> Option<Document> {
        self.inner.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.state.read().positions.contains_key(id)
    }

    /// Returns the number of live documents.
    pub fn size(&self) -> usize {
        self.inner.state.read().positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Returns all live ids in insertion order.
    pub fn ids(&self) -> Vec<String> {
        let state = self.inner.state.read();
        state
            .entries
            .values()
            .filter_map(|doc| doc.id().map(str::to_string))
            .collect()
    }

    /// Removes every document.
    pub fn clear(&self) {
        let mut state = self.inner.state.write();
        state.positions.clear();
        state.entries = OrdMap::new();
        state.generation += 1;
        log::debug!("Cleared collection {}", self.inner.collection_name);
    }

    /// Returns the snapshot generation, bumped by every successful write.
    pub fn generation(&self) -> u64 {
        self.inner.state.read().generation
    }

    /// Starts a paginated scan over the documents matching `filter`.
    ///
    /// The cursor works on a snapshot taken now; writes made afterwards are
    /// not visible to it.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` if `page_size` is zero.
    pub fn scan(&self, filter: Filter, page_size: usize) -> DocketResult<ScanCursor> {
        if page_size == 0 {
            log::error!("Scan page size must be greater than zero");
            return Err(DocketError::new(
                "Scan page size must be greater than zero",
                ErrorKind::InvalidOperation,
            ));
        }
        let (entries, generation) = self.inner.snapshot();
        Ok(ScanCursor::new(entries, generation, filter, page_size))
    }

    /// Returns every document matching `filter`, in insertion order.
    pub fn find(&self, filter: &Filter) -> DocketResult<Vec<Document>> {
        let (entries, _) = self.inner.snapshot();
        let mut matches = Vec::new();
        for doc in entries.values() {
            if filter.apply(doc)? {
                matches.push(doc.clone());
            }
        }
        Ok(matches)
    }

    /// Returns the first document matching `filter`, in insertion order.
    pub fn first_match(&self, filter: &Filter) -> DocketResult<Option<Document>> {
        let (entries, _) = self.inner.snapshot();
        for doc in entries.values() {
            if filter.apply(doc)? {
                return Ok(Some(doc.clone()));
            }
        }
        Ok(None)
    }
}

struct StoreState {
    positions: HashMap<String, u64>,
    entries: OrdMap<u64, Document>,
    next_position: u64,
    etag_counter: u64,
    generation: u64,
}

struct DocumentStoreInner {
    collection_name: String,
    state: RwLock<StoreState>,
}

impl DocumentStoreInner {
    fn new(collection_name: &str) -> Self {
        DocumentStoreInner {
            collection_name: collection_name.to_string(),
            state: RwLock::new(StoreState {
                positions: HashMap::new(),
                entries: OrdMap::new(),
                next_position: 1,
                etag_counter: 0,
                generation: 0,
            }),
        }
    }

    fn snapshot(&self) -> (OrdMap<u64, Document>, u64) {
        let state = self.state.read();
        (state.entries.clone(), state.generation)
    }

    fn create(&self, mut document: Document) -> DocketResult<Document> {
        document.strip_system_fields();
        let id = match document.get(DOC_ID) {
            None | Some(Value::Null) => new_document_id(),
            Some(Value::String(id)) if id.is_empty() => new_document_id(),
            Some(Value::String(id)) => {
                validate_id(id)?;
                id.clone()
            }
            Some(other) => {
                log::error!("Document id must be a string, found {}", other.type_name());
                return Err(DocketError::new(
                    &format!("Document id must be a string, found {}", other.type_name()),
                    ErrorKind::InvalidId,
                ));
            }
        };
        document.put_system(DOC_ID, Value::from(id.as_str()));

        let mut state = self.state.write();
        if state.positions.contains_key(&id) {
            log::error!(
                "Document with id {} already exists in {}",
                id,
                self.collection_name
            );
            return Err(DocketError::new(
                &format!("Document with id {} already exists", id),
                ErrorKind::DuplicateId,
            ));
        }

        self.stamp(&mut state, &id, &mut document);
        let position = state.next_position;
        state.next_position += 1;
        state.positions.insert(id.clone(), position);
        state.entries.insert(position, document.clone());
        state.generation += 1;

        log::trace!("Created {} at position {} in {}", id, position, self.collection_name);
        Ok(document)
    }

    fn replace(
        &self,
        id: &str,
        mut body: Document,
        expected_etag: Option<&str>,
    ) -> DocketResult<Document> {
        match body.get(DOC_ID) {
            None | Some(Value::Null) => {}
            Some(Value::String(body_id)) if body_id == id => {}
            Some(other) => {
                log::error!("Replacement body id {:?} does not match {}", other, id);
                return Err(DocketError::new(
                    &format!("Replacement body id {:?} does not match {}", other, id),
                    ErrorKind::InvalidId,
                ));
            }
        }
        body.strip_system_fields();
        body.put_system(DOC_ID, Value::from(id));

        let mut state = self.state.write();
        let position = match state.positions.get(id) {
            Some(position) => *position,
            None => {
                log::error!("Document with id {} not found in {}", id, self.collection_name);
                return Err(DocketError::new(
                    &format!("Document with id {} not found", id),
                    ErrorKind::NotFound,
                ));
            }
        };

        if let Some(expected) = expected_etag {
            let current = state.entries.get(&position).and_then(|doc| doc.etag());
            if current != Some(expected) {
                log::error!(
                    "Etag mismatch on {}: expected {}, found {:?}",
                    id,
                    expected,
                    current
                );
                return Err(DocketError::new(
                    &format!("Document {} was modified concurrently", id),
                    ErrorKind::Conflict,
                ));
            }
        }

        self.stamp(&mut state, id, &mut body);
        state.entries.insert(position, body.clone());
        state.generation += 1;

        log::trace!("Replaced {} at position {} in {}", id, position, self.collection_name);
        Ok(body)
    }

    fn delete(&self, id: &str) -> DocketResult<Document> {
        let mut state = self.state.write();
        let position = match state.positions.remove(id) {
            Some(position) => position,
            None => {
                log::error!("Document with id {} not found in {}", id, self.collection_name);
                return Err(DocketError::new(
                    &format!("Document with id {} not found", id),
                    ErrorKind::NotFound,
                ));
            }
        };

        match state.entries.remove(&position) {
            Some(document) => {
                state.generation += 1;
                log::trace!("Deleted {} from {}", id, self.collection_name);
                Ok(document)
            }
            None => {
                log::error!("Position index of {} is out of sync with entries", id);
                Err(DocketError::new(
                    &format!("Position index of {} is out of sync with entries", id),
                    ErrorKind::InternalError,
                ))
            }
        }
    }

    fn get(&self, id: &str) -> Option<Document> {
        let state = self.state.read();
        let position = state.positions.get(id)?;
        state.entries.get(position).cloned()
    }

    fn stamp(&self, state: &mut StoreState, id: &str, document: &mut Document) {
        state.etag_counter += 1;
        document.put_system(DOC_ETAG, Value::from(format!("{:016x}", state.etag_counter)));
        document.put_system(DOC_TIMESTAMP, Value::from(chrono::Utc::now().timestamp_millis()));
        document.put_system(
            DOC_SELF,
            Value::from(format!("colls/{}/docs/{}", self.collection_name, id)),
        );
    }
}

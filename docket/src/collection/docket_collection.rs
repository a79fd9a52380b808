use crate::collection::{Document, DocumentStore, FeedOptions, Page, RequestOptions, WriteResult};
use crate::common::{RequestThrottle, Value};
use crate::docket_config::DocketConfig;
use crate::errors::{DocketError, DocketResult, ErrorKind};
use crate::filter::Filter;
use crate::procedure::{
    register_builtin_procedures, ProcedureContext, ProcedureRegistry, StoredProcedure,
};
use crate::trigger::{EnsureUniqueIdTrigger, Trigger, TriggerPipeline, UpdateMetadataTrigger};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Client-facing handle to one collection of a [crate::Docket].
///
/// Every document request made through this handle (create, replace,
/// delete, read, query and procedure execution) is charged against the
/// collection's request throttle. Housekeeping calls such as trigger and
/// procedure registration, [Collection::count_documents] and direct
/// [Collection::store] access are not.
///
/// Handles are cheap to clone and share state. Once the collection is
/// dropped, or the database closed, every request fails with
/// `InvalidOperation`.
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
///
/// let options = RequestOptions::new().pre_trigger_include(vec!["trgEnsureUniqueId"]);
/// families.create_document(doc! { id: "DUPEJ", name: "A" }, &options).unwrap();
/// let second = families.create_document(doc! { id: "DUPEJ", name: "B" }, &options).unwrap();
/// assert_ne!(second.document().id(), Some("DUPEJ"));
/// ```
#[derive(Clone)]
pub struct Collection {
    inner: Arc<CollectionInner>,
}

#[cfg(test)]
impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection").finish_non_exhaustive()
    }
}

struct CollectionInner {
    pipeline: TriggerPipeline,
    procedures: ProcedureRegistry,
    config: DocketConfig,
    throttle: RequestThrottle,
    dropped: AtomicBool,
}

impl Collection {
    pub(crate) fn new(name: &str, config: DocketConfig) -> DocketResult<Self> {
        let pipeline = TriggerPipeline::new(DocumentStore::new(name));
        let procedures = ProcedureRegistry::new();
        if config.register_builtins() {
            pipeline.register(
                EnsureUniqueIdTrigger::new(
                    config.unique_id_retry_limit(),
                    config.unique_id_suffix_length(),
                )
                .into_trigger(),
            )?;
            pipeline.register(UpdateMetadataTrigger.into_trigger())?;
            register_builtin_procedures(&procedures)?;
        }
        let throttle = RequestThrottle::new(config.request_rate_limit(), config.throttle_window());

        Ok(Collection {
            inner: Arc::new(CollectionInner {
                pipeline,
                procedures,
                config,
                throttle,
                dropped: AtomicBool::new(false),
            }),
        })
    }

    pub fn name(&self) -> &str {
        self.inner.pipeline.store().name()
    }

    /// Creates a document through the triggers selected by `options`.
    pub fn create_document(
        &self,
        document: Document,
        options: &RequestOptions,
    ) -> DocketResult<WriteResult> {
        self.admit()?;
        self.inner.pipeline.create(document, options)
    }

    /// Replaces the document `id`, honouring [RequestOptions::if_match].
    pub fn replace_document(
        &self,
        id: &str,
        document: Document,
        options: &RequestOptions,
    ) -> DocketResult<WriteResult> {
        self.admit()?;
        self.inner.pipeline.replace(id, document, options)
    }

    /// Deletes the document `id`; the result carries the removed revision.
    pub fn delete_document(&self, id: &str, options: &RequestOptions) -> DocketResult<WriteResult> {
        self.admit()?;
        self.inner.pipeline.delete(id, options)
    }

    /// Reads the document `id`.
    ///
    /// # Errors
    ///
    /// `NotFound` when no such document exists.
    pub fn read_document(&self, id: &str) -> DocketResult<Document> {
        self.admit()?;
        match self.inner.pipeline.store().get(id) {
            Some(document) => Ok(document),
            None => {
                log::error!("Document with id {} not found in {}", id, self.name());
                Err(DocketError::new(
                    &format!("Document with id {} not found", id),
                    ErrorKind::NotFound,
                ))
            }
        }
    }

    /// Returns one page of documents matching `filter`.
    ///
    /// Pass the page's continuation back through [FeedOptions::continuation]
    /// to fetch the next one.
    pub fn query(&self, filter: &Filter, options: &FeedOptions) -> DocketResult<Page> {
        self.admit()?;
        let page_size = options
            .max_item_count()
            .unwrap_or_else(|| self.inner.config.page_size());
        let mut cursor = self.inner.pipeline.store().scan(filter.clone(), page_size)?;
        cursor.next_page(options.continuation_token())
    }

    /// Returns every document matching `filter`, as a single request.
    pub fn query_all(&self, filter: &Filter) -> DocketResult<Vec<Document>> {
        self.admit()?;
        self.inner.pipeline.store().find(filter)
    }

    /// Counts every document matching `filter`.
    pub fn count_documents(&self, filter: &Filter) -> DocketResult<usize> {
        self.ensure_open()?;
        let aggregator = self.procedure_context().count_aggregator();
        Ok(aggregator.count(filter, usize::MAX, None)?.count())
    }

    /// Runs the stored procedure `name` with positional `args`.
    pub fn execute_procedure(&self, name: &str, args: &[Value]) -> DocketResult<Value> {
        self.admit()?;
        let context = self.procedure_context();
        self.inner.procedures.execute(name, &context, args)
    }

    pub fn register_trigger(&self, trigger: Trigger) -> DocketResult<()> {
        self.ensure_open()?;
        self.inner.pipeline.register(trigger)
    }

    pub fn deregister_trigger(&self, name: &str) -> DocketResult<Trigger> {
        self.ensure_open()?;
        self.inner.pipeline.deregister(name)
    }

    /// Registered triggers in registration order.
    pub fn triggers(&self) -> Vec<Trigger> {
        self.inner.pipeline.triggers()
    }

    pub fn register_procedure(&self, procedure: StoredProcedure) -> DocketResult<()> {
        self.ensure_open()?;
        self.inner.procedures.register(procedure)
    }

    pub fn deregister_procedure(&self, name: &str) -> DocketResult<StoredProcedure> {
        self.ensure_open()?;
        self.inner.procedures.deregister(name)
    }

    pub fn procedure_names(&self) -> Vec<String> {
        self.inner.procedures.names()
    }

    /// Direct, untriggered and unthrottled access to the documents.
    pub fn store(&self) -> &DocumentStore {
        self.inner.pipeline.store()
    }

    pub fn pipeline(&self) -> &TriggerPipeline {
        &self.inner.pipeline
    }

    pub fn is_dropped(&self) -> bool {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    pub(crate) fn mark_dropped(&self) {
        self.inner.dropped.store(true, Ordering::Relaxed);
    }

    fn procedure_context(&self) -> ProcedureContext {
        ProcedureContext::new(self.inner.pipeline.clone(), self.inner.config.clone())
    }

    fn admit(&self) -> DocketResult<()> {
        self.ensure_open()?;
        self.inner.throttle.acquire()
    }

    fn ensure_open(&self) -> DocketResult<()> {
        if self.is_dropped() {
            log::error!("Collection {} is dropped or its database is closed", self.name());
            return Err(DocketError::new(
                &format!("Collection {} is dropped or its database is closed", self.name()),
                ErrorKind::InvalidOperation,
            ));
        }
        Ok(())
    }
}

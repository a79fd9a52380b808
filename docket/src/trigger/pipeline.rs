use crate::collection::{Document, DocumentStore, RequestOptions, WriteResult};
use crate::errors::{DocketError, DocketResult, ErrorKind};
use crate::trigger::{Trigger, TriggerContext, TriggerOperation, TriggerType};
use indexmap::IndexMap;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard, RwLock};
use smallvec::SmallVec;
use std::sync::Arc;

type TriggerVec = SmallVec<[Trigger; 4]>;

/// Progress of one logical write through the pipeline.
///
/// The normal path is `Pending -> PreTriggersRun -> Created ->
/// PostTriggersRun -> Done`. A pre-trigger failure moves `Pending ->
/// Rejected` and the store is never touched. `Created` means the store write
/// committed, whatever the operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Pending,
    PreTriggersRun,
    Created,
    PostTriggersRun,
    Done,
    Rejected,
}

/// Which registered triggers a request opts into.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TriggerSelection {
    /// Run no triggers.
    #[default]
    None,
    /// Run every registered trigger of the matching type.
    All,
    /// Run only these triggers. Each name must be registered with the
    /// matching type.
    Named(Vec<String>),
}

/// Wraps document writes with ordered pre- and post-triggers.
///
/// # Purpose
/// The pipeline owns the trigger registry of one collection and routes
/// create, replace and delete through it. For every write:
///
/// 1. the triggers selected by [RequestOptions] are resolved, in
///    registration order, skipping those whose operation does not apply;
/// 2. pre-triggers run on the request body and may change it or reject the
///    write, in which case nothing is written;
/// 3. the store write happens; its errors go back to the caller unchanged;
/// 4. post-triggers run on the persisted (or deleted) document. A failure is
///    reported as `PostTriggerFailed` but does not undo the write, and the
///    remaining post-triggers are skipped.
///
/// # Concurrency
/// Each logical write holds the collection's write gate from the first
/// pre-trigger to the last post-trigger. The gate is reentrant, so code that
/// already holds it (a stored procedure, say) can issue pipelined writes.
/// This makes "check the id is free, then create it" atomic with respect to
/// every other gated writer.
#[derive(Clone)]
pub struct TriggerPipeline {
    inner: Arc<TriggerPipelineInner>,
}

struct TriggerPipelineInner {
    store: DocumentStore,
    triggers: RwLock<IndexMap<String, Trigger>>,
    gate: ReentrantMutex<()>,
}

impl TriggerPipeline {
    pub fn new(store: DocumentStore) -> Self {
        TriggerPipeline {
            inner: Arc::new(TriggerPipelineInner {
                store,
                triggers: RwLock::new(IndexMap::new()),
                gate: ReentrantMutex::new(()),
            }),
        }
    }

    pub fn store(&self) -> &DocumentStore {
        &self.inner.store
    }

    /// Registers a trigger after the existing ones.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` if a trigger with the same name is registered.
    pub fn register(&self, trigger: Trigger) -> DocketResult<()> {
        let mut triggers = self.inner.triggers.write();
        if triggers.contains_key(trigger.name()) {
            log::error!(
                "Trigger {} is already registered on {}",
                trigger.name(),
                self.inner.store.name()
            );
            return Err(DocketError::new(
                &format!("Trigger {} is already registered", trigger.name()),
                ErrorKind::InvalidOperation,
            ));
        }
        log::debug!(
            "Registered {:?} trigger {} for {} on {}",
            trigger.trigger_type(),
            trigger.name(),
            trigger.operation(),
            self.inner.store.name()
        );
        triggers.insert(trigger.name().to_string(), trigger);
        Ok(())
    }

    /// Removes a trigger, keeping the order of the others.
    pub fn deregister(&self, name: &str) -> DocketResult<Trigger> {
        match self.inner.triggers.write().shift_remove(name) {
            Some(trigger) => Ok(trigger),
            None => {
                log::error!("Trigger {} is not registered", name);
                Err(DocketError::new(
                    &format!("Trigger {} is not registered", name),
                    ErrorKind::TriggerNotFound,
                ))
            }
        }
    }

    pub fn trigger(&self, name: &str) -> Option<Trigger> {
        self.inner.triggers.read().get(name).cloned()
    }

    /// Returns all registered triggers in registration order.
    pub fn triggers(&self) -> Vec<Trigger> {
        self.inner.triggers.read().values().cloned().collect()
    }

    /// Creates a document through the selected triggers.
    pub fn create(&self, document: Document, options: &RequestOptions) -> DocketResult<WriteResult> {
        let operation = TriggerOperation::Create;
        let _gate = self.gate();
        let (pre, post) = self.selected(options, operation)?;

        let mut state = PipelineState::Pending;
        let mut body = document;
        for trigger in &pre {
            let mut context = TriggerContext::for_request(&self.inner.store, operation, &mut body);
            self.run_pre(trigger, &mut context, &mut state)?;
        }
        self.transition(&mut state, PipelineState::PreTriggersRun, operation);

        let created = self.inner.store.create(body)?;
        self.finish(created, &post, operation, state)
    }

    /// Replaces a document through the selected triggers.
    ///
    /// The etag condition comes from [RequestOptions::if_match].
    pub fn replace(
        &self,
        id: &str,
        body: Document,
        options: &RequestOptions,
    ) -> DocketResult<WriteResult> {
        let operation = TriggerOperation::Replace;
        let _gate = self.gate();
        let (pre, post) = self.selected(options, operation)?;

        let mut state = PipelineState::Pending;
        let mut body = body;
        for trigger in &pre {
            let mut context = TriggerContext::for_request(&self.inner.store, operation, &mut body);
            self.run_pre(trigger, &mut context, &mut state)?;
        }
        self.transition(&mut state, PipelineState::PreTriggersRun, operation);

        let replaced = self
            .inner
            .store
            .replace(id, body, options.if_match_etag())?;
        self.finish(replaced, &post, operation, state)
    }

    /// Deletes a document through the selected triggers.
    ///
    /// Pre-delete triggers see the document about to be removed, read-only.
    pub fn delete(&self, id: &str, options: &RequestOptions) -> DocketResult<WriteResult> {
        let operation = TriggerOperation::Delete;
        let _gate = self.gate();
        let (pre, post) = self.selected(options, operation)?;

        let mut state = PipelineState::Pending;
        if !pre.is_empty() {
            let current = match self.inner.store.get(id) {
                Some(current) => current,
                None => {
                    log::error!("Document with id {} not found", id);
                    return Err(DocketError::new(
                        &format!("Document with id {} not found", id),
                        ErrorKind::NotFound,
                    ));
                }
            };
            for trigger in &pre {
                let mut context =
                    TriggerContext::for_read_only_request(&self.inner.store, operation, &current);
                self.run_pre(trigger, &mut context, &mut state)?;
            }
        }
        self.transition(&mut state, PipelineState::PreTriggersRun, operation);

        let deleted = self.inner.store.delete(id)?;
        self.finish(deleted, &post, operation, state)
    }

    /// Holds the collection write gate until the guard drops.
    pub(crate) fn gate(&self) -> ReentrantMutexGuard<'_, ()> {
        self.inner.gate.lock()
    }

    fn selected(
        &self,
        options: &RequestOptions,
        operation: TriggerOperation,
    ) -> DocketResult<(TriggerVec, TriggerVec)> {
        let pre = self.select(options.pre_triggers(), TriggerType::Pre, operation)?;
        let post = self.select(options.post_triggers(), TriggerType::Post, operation)?;
        Ok((pre, post))
    }

    fn select(
        &self,
        selection: &TriggerSelection,
        trigger_type: TriggerType,
        operation: TriggerOperation,
    ) -> DocketResult<TriggerVec> {
        let triggers = self.inner.triggers.read();
        let names = match selection {
            TriggerSelection::None => return Ok(TriggerVec::new()),
            TriggerSelection::All => None,
            TriggerSelection::Named(names) => {
                for name in names {
                    match triggers.get(name) {
                        Some(trigger) if trigger.trigger_type() == trigger_type => {}
                        _ => {
                            log::error!(
                                "No {:?} trigger named {} is registered on {}",
                                trigger_type,
                                name,
                                self.inner.store.name()
                            );
                            return Err(DocketError::new(
                                &format!("No {:?} trigger named {} is registered", trigger_type, name),
                                ErrorKind::TriggerNotFound,
                            ));
                        }
                    }
                }
                Some(names)
            }
        };

        Ok(triggers
            .values()
            .filter(|trigger| trigger.trigger_type() == trigger_type)
            .filter(|trigger| names.map_or(true, |names| names.iter().any(|n| n == trigger.name())))
            .filter(|trigger| trigger.operation().applies_to(operation))
            .cloned()
            .collect())
    }

    fn run_pre(
        &self,
        trigger: &Trigger,
        context: &mut TriggerContext<'_>,
        state: &mut PipelineState,
    ) -> DocketResult<()> {
        match trigger.execute(context) {
            Ok(()) => Ok(()),
            Err(err) => {
                let operation = context.operation();
                self.transition(state, PipelineState::Rejected, operation);
                log::error!(
                    "Pre-trigger {} rejected {} on {}: {}",
                    trigger.name(),
                    operation,
                    self.inner.store.name(),
                    err
                );
                Err(DocketError::new_with_cause(
                    &format!("Pre-trigger {} rejected the {}", trigger.name(), operation),
                    ErrorKind::TriggerRejected,
                    err,
                ))
            }
        }
    }

    fn finish(
        &self,
        document: Document,
        post: &[Trigger],
        operation: TriggerOperation,
        mut state: PipelineState,
    ) -> DocketResult<WriteResult> {
        self.transition(&mut state, PipelineState::Created, operation);

        for trigger in post {
            let mut context = TriggerContext::for_response(&self.inner.store, operation, &document);
            if let Err(err) = trigger.execute(&mut context) {
                log::warn!(
                    "Post-trigger {} failed after {} of {:?} on {}, the write is kept: {}",
                    trigger.name(),
                    operation,
                    document.id(),
                    self.inner.store.name(),
                    err
                );
                return Err(DocketError::new_with_cause(
                    &format!("Post-trigger {} failed", trigger.name()),
                    ErrorKind::PostTriggerFailed,
                    err,
                ));
            }
        }
        self.transition(&mut state, PipelineState::PostTriggersRun, operation);
        self.transition(&mut state, PipelineState::Done, operation);
        Ok(WriteResult::new(document, state))
    }

    fn transition(&self, state: &mut PipelineState, next: PipelineState, operation: TriggerOperation) {
        log::debug!(
            "{} on {}: {:?} -> {:?}",
            operation,
            self.inner.store.name(),
            state,
            next
        );
        *state = next;
    }
}

use crate::collection::{Document, DocumentStore};
use crate::errors::{DocketError, DocketResult, ErrorKind};
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

/// When a trigger runs relative to the store write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerType {
    /// Runs before the write and may change or reject the request.
    Pre,
    /// Runs after the write has been committed.
    Post,
}

/// Which write operations a trigger applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerOperation {
    All,
    Create,
    Replace,
    Delete,
}

impl TriggerOperation {
    /// Whether a trigger registered for `self` runs on a write of kind `operation`.
    pub fn applies_to(&self, operation: TriggerOperation) -> bool {
        *self == TriggerOperation::All || *self == operation
    }
}

impl Display for TriggerOperation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerOperation::All => write!(f, "all"),
            TriggerOperation::Create => write!(f, "create"),
            TriggerOperation::Replace => write!(f, "replace"),
            TriggerOperation::Delete => write!(f, "delete"),
        }
    }
}

enum RequestBody<'a> {
    Writable(&'a mut Document),
    ReadOnly(&'a Document),
}

/// What a trigger sees while it runs.
///
/// Pre-triggers get the request body: the proposed document for create and
/// replace (writable), or the document about to be removed for delete
/// (read-only). Post-triggers get the response body: the persisted document,
/// or the deleted one.
///
/// The store handle is the collection's own store. Writes made through it
/// run no triggers and are not throttled.
pub struct TriggerContext<'a> {
    store: &'a DocumentStore,
    operation: TriggerOperation,
    request: Option<RequestBody<'a>>,
    response: Option<&'a Document>,
}

impl<'a> TriggerContext<'a> {
    pub(crate) fn for_request(
        store: &'a DocumentStore,
        operation: TriggerOperation,
        body: &'a mut Document,
    ) -> Self {
        TriggerContext {
            store,
            operation,
            request: Some(RequestBody::Writable(body)),
            response: None,
        }
    }

    pub(crate) fn for_read_only_request(
        store: &'a DocumentStore,
        operation: TriggerOperation,
        body: &'a Document,
    ) -> Self {
        TriggerContext {
            store,
            operation,
            request: Some(RequestBody::ReadOnly(body)),
            response: None,
        }
    }

    pub(crate) fn for_response(
        store: &'a DocumentStore,
        operation: TriggerOperation,
        body: &'a Document,
    ) -> Self {
        TriggerContext {
            store,
            operation,
            request: None,
            response: Some(body),
        }
    }

    pub fn store(&self) -> &DocumentStore {
        self.store
    }

    /// The kind of write in progress. Never [TriggerOperation::All].
    pub fn operation(&self) -> TriggerOperation {
        self.operation
    }

    pub fn request_body(&self) -> Option<&Document> {
        match &self.request {
            Some(RequestBody::Writable(body)) => Some(&**body),
            Some(RequestBody::ReadOnly(body)) => Some(*body),
            None => None,
        }
    }

    /// The proposed document, for pre-triggers on create and replace.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` in post-triggers and in pre-delete triggers.
    pub fn request_body_mut(&mut self) -> DocketResult<&mut Document> {
        match &mut self.request {
            Some(RequestBody::Writable(body)) => Ok(&mut **body),
            _ => {
                log::error!("Request body is not writable during {} triggers", self.operation);
                Err(DocketError::new(
                    &format!("Request body is not writable during {} triggers", self.operation),
                    ErrorKind::InvalidOperation,
                ))
            }
        }
    }

    pub fn response_body(&self) -> Option<&Document> {
        self.response
    }
}

/// Contract for trigger bodies.
///
/// # Behavior
///
/// Returning an error from a pre-trigger aborts the write before it reaches
/// the store. Returning an error from a post-trigger is reported to the caller
/// but the write stays committed.
pub trait TriggerProvider: Send + Sync {
    fn execute(&self, context: &mut TriggerContext<'_>) -> DocketResult<()>;
}

struct FnTrigger<F>(F);

impl<F> TriggerProvider for FnTrigger<F>
where
    F: Fn(&mut TriggerContext<'_>) -> DocketResult<()> + Send + Sync,
{
    fn execute(&self, context: &mut TriggerContext<'_>) -> DocketResult<()> {
        (self.0)(context)
    }
}

/// A named, registered trigger.
///
/// # Examples
///
/// ```rust
/// use docket::trigger::{Trigger, TriggerOperation, TriggerType};
///
/// let stamp = Trigger::from_fn("trgStamp", TriggerType::Pre, TriggerOperation::Create, |ctx| {
///     ctx.request_body_mut()?.put("stamped", true)
/// });
/// assert_eq!(stamp.name(), "trgStamp");
/// ```
#[derive(Clone)]
pub struct Trigger {
    inner: Arc<TriggerInner>,
}

struct TriggerInner {
    name: String,
    trigger_type: TriggerType,
    operation: TriggerOperation,
    body: Box<dyn TriggerProvider>,
}

impl Trigger {
    pub fn new<T: TriggerProvider + 'static>(
        name: &str,
        trigger_type: TriggerType,
        operation: TriggerOperation,
        body: T,
    ) -> Self {
        Trigger {
            inner: Arc::new(TriggerInner {
                name: name.to_string(),
                trigger_type,
                operation,
                body: Box::new(body),
            }),
        }
    }

    /// Wraps a closure as a trigger body.
    pub fn from_fn<F>(
        name: &str,
        trigger_type: TriggerType,
        operation: TriggerOperation,
        body: F,
    ) -> Self
    where
        F: Fn(&mut TriggerContext<'_>) -> DocketResult<()> + Send + Sync + 'static,
    {
        Trigger::new(name, trigger_type, operation, FnTrigger(body))
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn trigger_type(&self) -> TriggerType {
        self.inner.trigger_type
    }

    pub fn operation(&self) -> TriggerOperation {
        self.inner.operation
    }

    pub(crate) fn execute(&self, context: &mut TriggerContext<'_>) -> DocketResult<()> {
        self.inner.body.execute(context)
    }
}

impl Debug for Trigger {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trigger")
            .field("name", &self.inner.name)
            .field("trigger_type", &self.inner.trigger_type)
            .field("operation", &self.inner.operation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn operation_applies_to() {
        assert!(TriggerOperation::All.applies_to(TriggerOperation::Delete));
        assert!(TriggerOperation::Create.applies_to(TriggerOperation::Create));
        assert!(!TriggerOperation::Create.applies_to(TriggerOperation::Replace));
    }

    #[test]
    fn writable_request_can_be_mutated() {
        let store = DocumentStore::new("c");
        let mut body = doc! { id: "a" };
        let mut ctx = TriggerContext::for_request(&store, TriggerOperation::Create, &mut body);
        ctx.request_body_mut().unwrap().put("touched", true).unwrap();
        assert!(ctx.response_body().is_none());
        assert!(body.contains_key("touched"));
    }

    #[test]
    fn read_only_request_rejects_mutation() {
        let store = DocumentStore::new("c");
        let body = doc! { id: "a" };
        let mut ctx = TriggerContext::for_read_only_request(&store, TriggerOperation::Delete, &body);
        assert_eq!(ctx.request_body().and_then(|d| d.id()), Some("a"));
        assert_eq!(
            ctx.request_body_mut().unwrap_err().kind(),
            &ErrorKind::InvalidOperation
        );
    }

    #[test]
    fn response_context_has_no_request() {
        let store = DocumentStore::new("c");
        let body = doc! { id: "a" };
        let mut ctx = TriggerContext::for_response(&store, TriggerOperation::Create, &body);
        assert!(ctx.request_body().is_none());
        assert!(ctx.request_body_mut().is_err());
        assert_eq!(ctx.response_body().and_then(|d| d.id()), Some("a"));
    }

    #[test]
    fn from_fn_runs_closure() {
        let trigger = Trigger::from_fn("t", TriggerType::Pre, TriggerOperation::All, |ctx| {
            let operation = ctx.operation().to_string();
            ctx.request_body_mut()?.put("seen", operation)
        });
        let store = DocumentStore::new("c");
        let mut body = doc! {};
        let mut ctx = TriggerContext::for_request(&store, TriggerOperation::Replace, &mut body);
        trigger.execute(&mut ctx).unwrap();
        assert_eq!(body.get("seen").and_then(|v| v.as_str()), Some("replace"));
        assert_eq!(format!("{:?}", trigger), "Trigger { name: \"t\", trigger_type: Pre, operation: All }");
    }
}

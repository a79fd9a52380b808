use crate::collection::{DocumentStore, UniqueIdResolver};
use crate::common::Value;
use crate::docket_config::DocketConfig;
use crate::errors::{DocketError, DocketResult, ErrorKind};
use crate::procedure::{BulkOperationDriver, CountAggregator};
use crate::trigger::TriggerPipeline;
use dashmap::DashMap;
use std::fmt::{Debug, Formatter};
use std::ops::Deref;
use std::sync::Arc;

/// What a stored procedure can reach while it runs.
///
/// Writes made through [ProcedureContext::pipeline] run the selected
/// triggers; writes made through [ProcedureContext::store] do not. Neither is
/// throttled.
pub struct ProcedureContext {
    pipeline: TriggerPipeline,
    config: DocketConfig,
}

impl ProcedureContext {
    pub(crate) fn new(pipeline: TriggerPipeline, config: DocketConfig) -> Self {
        ProcedureContext { pipeline, config }
    }

    pub fn store(&self) -> &DocumentStore {
        self.pipeline.store()
    }

    pub fn pipeline(&self) -> &TriggerPipeline {
        &self.pipeline
    }

    pub fn config(&self) -> &DocketConfig {
        &self.config
    }

    /// A resolver configured with the database's retry limit and suffix
    /// length.
    pub fn resolver(&self) -> UniqueIdResolver {
        UniqueIdResolver::new(self.store().clone())
            .with_retry_limit(self.config.unique_id_retry_limit())
            .with_suffix_length(self.config.unique_id_suffix_length())
    }

    pub fn bulk_driver(&self) -> BulkOperationDriver {
        BulkOperationDriver::new(self.pipeline.clone(), self.config.page_size())
    }

    pub fn count_aggregator(&self) -> CountAggregator {
        CountAggregator::new(self.store().clone(), self.config.page_size())
    }
}

/// Contract for stored procedure bodies.
///
/// # Behavior
///
/// A procedure gets its positional arguments as [Value]s and returns a single
/// [Value]. Missing trailing arguments should be treated as `Null`.
pub trait ProcedureProvider: Send + Sync {
    /// Name the procedure is registered under.
    fn name(&self) -> String;

    fn execute(&self, context: &ProcedureContext, args: &[Value]) -> DocketResult<Value>;
}

struct FnProcedure<F> {
    name: String,
    body: F,
}

impl<F> ProcedureProvider for FnProcedure<F>
where
    F: Fn(&ProcedureContext, &[Value]) -> DocketResult<Value> + Send + Sync,
{
    fn name(&self) -> String {
        self.name.clone()
    }

    fn execute(&self, context: &ProcedureContext, args: &[Value]) -> DocketResult<Value> {
        (self.body)(context, args)
    }
}

/// A registered stored procedure.
///
/// # Examples
///
/// ```rust
/// use docket::Docket;
/// use docket::common::Value;
/// use docket::procedure::StoredProcedure;
///
/// let db = Docket::builder().open().unwrap();
/// let families = db.collection("families").unwrap();
/// families
///     .register_procedure(StoredProcedure::from_fn("spEcho", |_ctx, args| {
///         Ok(args.first().cloned().unwrap_or_default())
///     }))
///     .unwrap();
/// let echoed = families.execute_procedure("spEcho", &[Value::from("hi")]).unwrap();
/// assert_eq!(echoed, Value::from("hi"));
/// ```
#[derive(Clone)]
pub struct StoredProcedure {
    inner: Arc<dyn ProcedureProvider>,
}

impl StoredProcedure {
    pub fn new<T: ProcedureProvider + 'static>(provider: T) -> Self {
        StoredProcedure {
            inner: Arc::new(provider),
        }
    }

    /// Wraps a closure as a procedure body.
    pub fn from_fn<F>(name: &str, body: F) -> Self
    where
        F: Fn(&ProcedureContext, &[Value]) -> DocketResult<Value> + Send + Sync + 'static,
    {
        StoredProcedure::new(FnProcedure {
            name: name.to_string(),
            body,
        })
    }
}

impl Deref for StoredProcedure {
    type Target = Arc<dyn ProcedureProvider>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl Debug for StoredProcedure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredProcedure")
            .field("name", &self.inner.name())
            .finish()
    }
}

/// Stored procedures of one collection, keyed by name.
#[derive(Clone, Default)]
pub struct ProcedureRegistry {
    inner: Arc<ProcedureRegistryInner>,
}

#[derive(Default)]
struct ProcedureRegistryInner {
    procedures: DashMap<String, StoredProcedure>,
}

impl ProcedureRegistry {
    pub fn new() -> Self {
        ProcedureRegistry::default()
    }

    /// Registers a procedure under its own name.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` if the name is empty or already taken.
    pub fn register(&self, procedure: StoredProcedure) -> DocketResult<()> {
        let name = procedure.name();
        if name.is_empty() {
            log::error!("Stored procedure name cannot be empty");
            return Err(DocketError::new(
                "Stored procedure name cannot be empty",
                ErrorKind::InvalidOperation,
            ));
        }
        match self.inner.procedures.entry(name) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                log::error!("Stored procedure {} is already registered", entry.key());
                Err(DocketError::new(
                    &format!("Stored procedure {} is already registered", entry.key()),
                    ErrorKind::InvalidOperation,
                ))
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                log::debug!("Registered stored procedure {}", entry.key());
                entry.insert(procedure);
                Ok(())
            }
        }
    }

    pub fn deregister(&self, name: &str) -> DocketResult<StoredProcedure> {
        match self.inner.procedures.remove(name) {
            Some((_, procedure)) => Ok(procedure),
            None => Err(not_found(name)),
        }
    }

    pub fn get(&self, name: &str) -> Option<StoredProcedure> {
        self.inner.procedures.get(name).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.procedures.contains_key(name)
    }

    /// Registered names in lexical order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .procedures
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Runs the named procedure.
    ///
    /// # Errors
    ///
    /// `ProcedureNotFound` for an unknown name; otherwise whatever the
    /// procedure returns.
    pub fn execute(
        &self,
        name: &str,
        context: &ProcedureContext,
        args: &[Value],
    ) -> DocketResult<Value> {
        // no map guard may be held while the body runs, it can re-enter the registry
        let procedure = self.get(name).ok_or_else(|| not_found(name))?;
        log::debug!("Executing stored procedure {} with {} args", name, args.len());
        procedure.execute(context, args)
    }
}

fn not_found(name: &str) -> DocketError {
    log::error!("Stored procedure {} not found", name);
    DocketError::new(
        &format!("Stored procedure {} not found", name),
        ErrorKind::ProcedureNotFound,
    )
}

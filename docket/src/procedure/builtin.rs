use crate::collection::{ContinuationToken, Document};
use crate::common::{
    Value, DOC_ID, SP_BULK_DELETE, SP_BULK_INSERT, SP_ENSURE_UNIQUE_ID, SP_HELLO_WORLD,
    SP_SELECT_COUNT, SP_SET_NORTH_AMERICA,
};
use crate::errors::{DocketError, DocketResult, ErrorKind};
use crate::filter::Filter;
use crate::procedure::{
    BatchStatus, BulkOperation, ProcedureContext, ProcedureProvider, ProcedureRegistry,
    StoredProcedure,
};
use std::str::FromStr;

const NORTH_AMERICA: [&str; 3] = ["United States", "Canada", "Mexico"];
const COUNTRY_PATH: &str = "address.countryRegionName";
const NORTH_AMERICA_PATH: &str = "address.isNorthAmerica";

/// Registers every built-in procedure on `registry`.
pub fn register_builtin_procedures(registry: &ProcedureRegistry) -> DocketResult<()> {
    registry.register(StoredProcedure::new(HelloWorld))?;
    registry.register(StoredProcedure::new(SetNorthAmerica))?;
    registry.register(StoredProcedure::new(EnsureUniqueId))?;
    registry.register(StoredProcedure::new(BulkInsert))?;
    registry.register(StoredProcedure::new(BulkDelete))?;
    registry.register(StoredProcedure::new(SelectCount))?;
    Ok(())
}

/// `spHelloWorld()`: returns `"Hello, World"`.
pub struct HelloWorld;

impl ProcedureProvider for HelloWorld {
    fn name(&self) -> String {
        SP_HELLO_WORLD.to_string()
    }

    fn execute(&self, _context: &ProcedureContext, _args: &[Value]) -> DocketResult<Value> {
        Ok(Value::from("Hello, World"))
    }
}

/// `spSetNorthAmerica(document, enforceSchema = true)`.
///
/// Sets `address.isNorthAmerica` from `address.countryRegionName` and creates
/// the document, returning it as persisted. A document without a country is
/// rejected while `enforceSchema` is on and stored unchanged otherwise.
pub struct SetNorthAmerica;

impl ProcedureProvider for SetNorthAmerica {
    fn name(&self) -> String {
        SP_SET_NORTH_AMERICA.to_string()
    }

    fn execute(&self, context: &ProcedureContext, args: &[Value]) -> DocketResult<Value> {
        let mut document = document_arg(args, 0, SP_SET_NORTH_AMERICA)?;
        let enforce_schema = match arg(args, 1) {
            Value::Null => true,
            Value::Bool(enforce) => *enforce,
            other => {
                return Err(validation_error(&format!(
                    "{} expects a boolean enforceSchema, got {}",
                    SP_SET_NORTH_AMERICA,
                    other.type_name()
                )))
            }
        };

        match document.get(COUNTRY_PATH).and_then(Value::as_str) {
            Some(country) => {
                let north_american = NORTH_AMERICA.contains(&country);
                document.put(NORTH_AMERICA_PATH, north_american)?;
            }
            None if enforce_schema => {
                return Err(validation_error(
                    "Expected document to contain address.countryRegionName property",
                ));
            }
            None => {}
        }

        let _gate = context.pipeline().gate();
        let created = context.store().create(document)?;
        Ok(Value::Document(created))
    }
}

/// `spEnsureUniqueId(document)`.
///
/// Resolves a free id and creates the document in one step under the write
/// gate, returning the created document.
pub struct EnsureUniqueId;

impl ProcedureProvider for EnsureUniqueId {
    fn name(&self) -> String {
        SP_ENSURE_UNIQUE_ID.to_string()
    }

    fn execute(&self, context: &ProcedureContext, args: &[Value]) -> DocketResult<Value> {
        let mut document = document_arg(args, 0, SP_ENSURE_UNIQUE_ID)?;
        let _gate = context.pipeline().gate();

        let candidate = match document.get(DOC_ID) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(id)) => id.clone(),
            Some(other) => {
                log::error!("Document id must be a string, got {}", other.type_name());
                return Err(DocketError::new(
                    &format!("Document id must be a string, got {}", other.type_name()),
                    ErrorKind::InvalidId,
                ));
            }
        };
        let resolved = context.resolver().resolve(&candidate)?;
        document.set_id(&resolved)?;

        let created = context.store().create(document)?;
        Ok(Value::Document(created))
    }
}

/// `spBulkInsert(documents)`.
///
/// Inserts documents in order until the configured bulk budget runs out and
/// returns how many were inserted. Callers resubmit the rest until every
/// document is in.
pub struct BulkInsert;

impl ProcedureProvider for BulkInsert {
    fn name(&self) -> String {
        SP_BULK_INSERT.to_string()
    }

    fn execute(&self, context: &ProcedureContext, args: &[Value]) -> DocketResult<Value> {
        let documents = match arg(args, 0) {
            Value::Null => {
                return Err(validation_error("Documents array is null or undefined."));
            }
            Value::Array(documents) => documents,
            other => {
                return Err(validation_error(&format!(
                    "{} expects an array of documents, got {}",
                    SP_BULK_INSERT,
                    other.type_name()
                )))
            }
        };
        if documents.is_empty() {
            return Ok(Value::from(0));
        }

        let operations = documents
            .iter()
            .enumerate()
            .map(|(index, value)| match value.as_document() {
                Some(document) => Ok(BulkOperation::Create(document.clone())),
                None => Err(validation_error(&format!(
                    "Element {} of {} is a {}, expected a document",
                    index,
                    SP_BULK_INSERT,
                    value.type_name()
                ))),
            })
            .collect::<DocketResult<Vec<_>>>()?;

        let outcome = context
            .bulk_driver()
            .run_batch(operations, context.config().bulk_batch_budget());
        match outcome.status() {
            BatchStatus::Failed(err) => Err(DocketError::new_with_cause(
                &format!("{} stopped after {} documents", SP_BULK_INSERT, outcome.applied()),
                err.kind().clone(),
                err.clone(),
            )),
            _ => Ok(Value::from(outcome.applied())),
        }
    }
}

/// `spBulkDelete(filter)`: returns `{count, continuationFlag}`.
///
/// Deletes matches until the configured bulk budget runs out. The flag is
/// true while the filter still matches something.
pub struct BulkDelete;

impl ProcedureProvider for BulkDelete {
    fn name(&self) -> String {
        SP_BULK_DELETE.to_string()
    }

    fn execute(&self, context: &ProcedureContext, args: &[Value]) -> DocketResult<Value> {
        let filter = Filter::from_value(arg(args, 0))?;
        let outcome = context
            .bulk_driver()
            .delete_matching(&filter, context.config().bulk_batch_budget())?;

        let mut response = Document::new();
        response.put("count", outcome.deleted())?;
        response.put("continuationFlag", outcome.more_remaining())?;
        Ok(Value::Document(response))
    }
}

/// `spSelectCount(filter, continuationToken)`: returns
/// `{count, continuationToken}`.
///
/// Counts at most the configured number of matches per call. A null token in
/// the response means the count is complete.
pub struct SelectCount;

impl ProcedureProvider for SelectCount {
    fn name(&self) -> String {
        SP_SELECT_COUNT.to_string()
    }

    fn execute(&self, context: &ProcedureContext, args: &[Value]) -> DocketResult<Value> {
        let filter = Filter::from_value(arg(args, 0))?;
        let token = match arg(args, 1) {
            Value::Null => None,
            Value::String(token) if token.is_empty() => None,
            Value::String(token) => Some(ContinuationToken::from_str(token)?),
            other => {
                return Err(validation_error(&format!(
                    "{} expects a string continuation token, got {}",
                    SP_SELECT_COUNT,
                    other.type_name()
                )))
            }
        };

        let result = context.count_aggregator().count(
            &filter,
            context.config().max_count_per_invocation(),
            token.as_ref(),
        )?;

        let mut response = Document::new();
        response.put("count", result.count())?;
        response.put(
            "continuationToken",
            result.continuation().map(|token| token.to_string()),
        )?;
        Ok(Value::Document(response))
    }
}

fn arg(args: &[Value], index: usize) -> &Value {
    const NULL: &Value = &Value::Null;
    args.get(index).unwrap_or(NULL)
}

fn document_arg(args: &[Value], index: usize, procedure: &str) -> DocketResult<Document> {
    match arg(args, index) {
        Value::Document(document) => Ok(document.clone()),
        other => Err(validation_error(&format!(
            "{} expects a document argument, got {}",
            procedure,
            other.type_name()
        ))),
    }
}

fn validation_error(message: &str) -> DocketError {
    log::error!("{}", message);
    DocketError::new(message, ErrorKind::ValidationError)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::DocumentStore;
    use crate::docket_config::DocketConfig;
    use crate::doc;
    use crate::procedure::Budget;
    use crate::trigger::TriggerPipeline;

    fn setup(config: DocketConfig) -> (ProcedureRegistry, ProcedureContext) {
        let registry = ProcedureRegistry::new();
        register_builtin_procedures(&registry).unwrap();
        let context = ProcedureContext::new(TriggerPipeline::new(DocumentStore::new("sp")), config);
        (registry, context)
    }

    fn bulk_docs(n: usize) -> Value {
        Value::Array(
            (0..n)
                .map(|i| Value::Document(doc! { name: (format!("Bulk inserted doc {}", i)) }))
                .collect(),
        )
    }

    fn starts_with_filter() -> Value {
        Value::Document(doc! { field: "name", op: "startsWith", value: "Bulk inserted doc " })
    }

    #[test]
    fn registers_all_builtins() {
        let (registry, _) = setup(DocketConfig::new());
        assert_eq!(
            registry.names(),
            vec![
                SP_BULK_DELETE,
                SP_BULK_INSERT,
                SP_ENSURE_UNIQUE_ID,
                SP_HELLO_WORLD,
                SP_SELECT_COUNT,
                SP_SET_NORTH_AMERICA
            ]
        );
    }

    #[test]
    fn hello_world() {
        let (registry, ctx) = setup(DocketConfig::new());
        let result = registry.execute(SP_HELLO_WORLD, &ctx, &[]).unwrap();
        assert_eq!(result, Value::from("Hello, World"));
    }

    #[test]
    fn set_north_america_flags_country() {
        let (registry, ctx) = setup(DocketConfig::new());
        let doc = doc! { id: "MARK", address: { countryRegionName: "United States" } };
        let result = registry
            .execute(SP_SET_NORTH_AMERICA, &ctx, &[Value::Document(doc), Value::Bool(true)])
            .unwrap();
        let created = result.as_document().unwrap();
        assert_eq!(created.get(NORTH_AMERICA_PATH), Some(&Value::Bool(true)));
        assert!(created.etag().is_some());
        assert!(ctx.store().contains("MARK"));

        let doc = doc! { id: "ENGLAND", address: { countryRegionName: "England" } };
        let result = registry
            .execute(SP_SET_NORTH_AMERICA, &ctx, &[Value::Document(doc)])
            .unwrap();
        assert_eq!(
            result.as_document().unwrap().get(NORTH_AMERICA_PATH),
            Some(&Value::Bool(false))
        );
    }

    #[test]
    fn set_north_america_enforces_schema() {
        let (registry, ctx) = setup(DocketConfig::new());
        let doc = Value::Document(doc! { id: "NOADDR" });
        let err = registry
            .execute(SP_SET_NORTH_AMERICA, &ctx, &[doc.clone()])
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ValidationError);
        assert_eq!(
            err.message(),
            "Expected document to contain address.countryRegionName property"
        );
        assert!(ctx.store().is_empty());

        let result = registry
            .execute(SP_SET_NORTH_AMERICA, &ctx, &[doc, Value::Bool(false)])
            .unwrap();
        assert!(result.as_document().unwrap().get(NORTH_AMERICA_PATH).is_none());
        assert!(ctx.store().contains("NOADDR"));
    }

    #[test]
    fn ensure_unique_id_suffixes_taken_ids() {
        let (registry, ctx) = setup(DocketConfig::new());
        let first = registry
            .execute(SP_ENSURE_UNIQUE_ID, &ctx, &[Value::Document(doc! { id: "DUPE", n: 1 })])
            .unwrap();
        let second = registry
            .execute(SP_ENSURE_UNIQUE_ID, &ctx, &[Value::Document(doc! { id: "DUPE", n: 2 })])
            .unwrap();
        assert_eq!(first.as_document().unwrap().id(), Some("DUPE"));
        let id = second.as_document().unwrap().id().unwrap().to_string();
        assert_eq!(id.len(), 9);
        assert!(id.starts_with("DUPE"));
        assert_eq!(ctx.store().size(), 2);
    }

    #[test]
    fn ensure_unique_id_rejects_non_string_id() {
        let (registry, ctx) = setup(DocketConfig::new());
        let mut doc = Document::new();
        doc.insert_raw(DOC_ID.to_string(), Value::from(7));
        let err = registry
            .execute(SP_ENSURE_UNIQUE_ID, &ctx, &[Value::Document(doc)])
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidId);
    }

    #[test]
    fn bulk_insert_argument_validation() {
        let (registry, ctx) = setup(DocketConfig::new());
        let err = registry.execute(SP_BULK_INSERT, &ctx, &[]).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ValidationError);
        assert_eq!(err.message(), "Documents array is null or undefined.");

        let err = registry
            .execute(SP_BULK_INSERT, &ctx, &[Value::Array(vec![Value::from(1)])])
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ValidationError);

        let empty = registry
            .execute(SP_BULK_INSERT, &ctx, &[Value::Array(vec![])])
            .unwrap();
        assert_eq!(empty, Value::from(0));
    }

    #[test]
    fn bulk_insert_stops_at_budget() {
        let config = DocketConfig::new();
        config.set_bulk_batch_budget(Budget::Operations(4)).unwrap();
        let (registry, ctx) = setup(config);

        let docs = bulk_docs(10);
        let mut inserted = 0;
        let mut calls = 0;
        while inserted < 10 {
            let remaining = Value::Array(docs.as_array().unwrap()[inserted..].to_vec());
            let count = registry
                .execute(SP_BULK_INSERT, &ctx, &[remaining])
                .unwrap()
                .as_i64()
                .unwrap() as usize;
            inserted += count;
            calls += 1;
        }
        assert_eq!(calls, 3);
        assert_eq!(ctx.store().size(), 10);
    }

    #[test]
    fn bulk_insert_surfaces_store_errors() {
        let (registry, ctx) = setup(DocketConfig::new());
        ctx.store().create(doc! { id: "taken" }).unwrap();
        let docs = Value::Array(vec![
            Value::Document(doc! { id: "fresh" }),
            Value::Document(doc! { id: "taken" }),
        ]);
        let err = registry.execute(SP_BULK_INSERT, &ctx, &[docs]).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::DuplicateId);
        assert!(ctx.store().contains("fresh"));
    }

    #[test]
    fn bulk_delete_loops_on_continuation_flag() {
        let config = DocketConfig::new();
        config.set_bulk_batch_budget(Budget::Operations(3)).unwrap();
        let (registry, ctx) = setup(config);
        registry.execute(SP_BULK_INSERT, &ctx, &[bulk_docs(3)]).unwrap();
        registry.execute(SP_BULK_INSERT, &ctx, &[bulk_docs(3)]).unwrap();
        registry.execute(SP_BULK_INSERT, &ctx, &[bulk_docs(1)]).unwrap();
        ctx.store().create(doc! { id: "keeper", name: "other" }).unwrap();

        let mut deleted = 0;
        loop {
            let response = registry
                .execute(SP_BULK_DELETE, &ctx, &[starts_with_filter()])
                .unwrap();
            let response = response.as_document().unwrap().clone();
            deleted += response.get("count").and_then(Value::as_i64).unwrap();
            if response.get("continuationFlag") == Some(&Value::Bool(false)) {
                break;
            }
        }
        assert_eq!(deleted, 7);
        assert_eq!(ctx.store().ids(), vec!["keeper"]);
    }

    #[test]
    fn select_count_chains_tokens() {
        let config = DocketConfig::new();
        config.set_max_count_per_invocation(4).unwrap();
        config.set_bulk_batch_budget(Budget::Unlimited).unwrap();
        let (registry, ctx) = setup(config);
        registry.execute(SP_BULK_INSERT, &ctx, &[bulk_docs(10)]).unwrap();

        let mut total = 0;
        let mut calls = 0;
        let mut token = Value::Null;
        loop {
            let response = registry
                .execute(SP_SELECT_COUNT, &ctx, &[Value::Null, token])
                .unwrap();
            let response = response.as_document().unwrap().clone();
            total += response.get("count").and_then(Value::as_i64).unwrap();
            calls += 1;
            token = response.get("continuationToken").cloned().unwrap_or_default();
            if token.is_null() {
                break;
            }
        }
        assert_eq!(total, 10);
        assert_eq!(calls, 3);
    }

    #[test]
    fn select_count_rejects_bad_token() {
        let (registry, ctx) = setup(DocketConfig::new());
        let err = registry
            .execute(SP_SELECT_COUNT, &ctx, &[Value::Null, Value::from("nonsense")])
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::EncodingError);
        let err = registry
            .execute(SP_SELECT_COUNT, &ctx, &[Value::Null, Value::from(3)])
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ValidationError);
    }
}

use crate::collection::{Document, DocumentStore, UniqueIdResolver};
use crate::common::{
    Value, DEFAULT_UNIQUE_ID_RETRY_LIMIT, DEFAULT_UNIQUE_ID_SUFFIX_LENGTH, DOC_ID, METADATA_ID,
    METADATA_LAST_ID, TRG_ENSURE_UNIQUE_ID, TRG_UPDATE_METADATA,
};
use crate::errors::{DocketError, DocketResult, ErrorKind};
use crate::trigger::{Trigger, TriggerContext, TriggerOperation, TriggerProvider, TriggerType};

/// Pre-create trigger that rewrites a taken id to a free one.
///
/// The incoming id is passed through [UniqueIdResolver]; a taken id comes
/// back with a random numeric suffix. An absent or empty id is replaced by a
/// UUID. Ids of a non-string type are left for the store to reject.
pub struct EnsureUniqueIdTrigger {
    retry_limit: u32,
    suffix_length: usize,
}

impl EnsureUniqueIdTrigger {
    pub fn new(retry_limit: u32, suffix_length: usize) -> Self {
        EnsureUniqueIdTrigger {
            retry_limit,
            suffix_length,
        }
    }

    /// Wraps this body as the `trgEnsureUniqueId` trigger.
    pub fn into_trigger(self) -> Trigger {
        Trigger::new(
            TRG_ENSURE_UNIQUE_ID,
            TriggerType::Pre,
            TriggerOperation::Create,
            self,
        )
    }
}

impl Default for EnsureUniqueIdTrigger {
    fn default() -> Self {
        EnsureUniqueIdTrigger::new(DEFAULT_UNIQUE_ID_RETRY_LIMIT, DEFAULT_UNIQUE_ID_SUFFIX_LENGTH)
    }
}

impl TriggerProvider for EnsureUniqueIdTrigger {
    fn execute(&self, context: &mut TriggerContext<'_>) -> DocketResult<()> {
        let resolver = UniqueIdResolver::new(context.store().clone())
            .with_retry_limit(self.retry_limit)
            .with_suffix_length(self.suffix_length);

        let body = context.request_body_mut()?;
        let candidate = match body.get(DOC_ID) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(id)) => id.clone(),
            Some(_) => return Ok(()),
        };

        let resolved = resolver.resolve(&candidate)?;
        if resolved != candidate {
            log::debug!("Document id {:?} rewritten to {}", candidate, resolved);
        }
        body.set_id(&resolved)
    }
}

/// Post-create trigger that records the last created id in `_metadata`.
///
/// The metadata document is created on first use and replaced, guarded by
/// its etag, afterwards. Writes of the metadata document itself are ignored.
#[derive(Default)]
pub struct UpdateMetadataTrigger;

impl UpdateMetadataTrigger {
    /// Wraps this body as the `trgUpdateMetadata` trigger.
    pub fn into_trigger(self) -> Trigger {
        Trigger::new(
            TRG_UPDATE_METADATA,
            TriggerType::Post,
            TriggerOperation::Create,
            self,
        )
    }
}

impl TriggerProvider for UpdateMetadataTrigger {
    fn execute(&self, context: &mut TriggerContext<'_>) -> DocketResult<()> {
        let created_id = match context.response_body().and_then(|doc| doc.id()) {
            Some(id) => id.to_string(),
            None => {
                log::error!("Metadata trigger ran without a persisted document");
                return Err(DocketError::new(
                    "Metadata trigger ran without a persisted document",
                    ErrorKind::InvalidOperation,
                ));
            }
        };
        if created_id == METADATA_ID {
            return Ok(());
        }
        record_last_id(context.store(), &created_id)
    }
}

fn record_last_id(store: &DocumentStore, last_id: &str) -> DocketResult<()> {
    if let Some(metadata) = store.get(METADATA_ID) {
        return replace_last_id(store, metadata, last_id);
    }

    let mut metadata = Document::new();
    metadata.put(DOC_ID, METADATA_ID)?;
    metadata.put(METADATA_LAST_ID, last_id)?;
    match store.create(metadata) {
        Ok(_) => {
            log::debug!("Created {} with {} = {}", METADATA_ID, METADATA_LAST_ID, last_id);
            Ok(())
        }
        // an ungated writer created it between the read and the create
        Err(err) if err.kind() == &ErrorKind::DuplicateId => match store.get(METADATA_ID) {
            Some(metadata) => replace_last_id(store, metadata, last_id),
            None => Err(err),
        },
        Err(err) => Err(err),
    }
}

fn replace_last_id(store: &DocumentStore, mut metadata: Document, last_id: &str) -> DocketResult<()> {
    let etag = metadata.etag().map(str::to_string);
    metadata.put(METADATA_LAST_ID, last_id)?;
    store.replace(METADATA_ID, metadata, etag.as_deref())?;
    log::trace!("Updated {} with {} = {}", METADATA_ID, METADATA_LAST_ID, last_id);
    Ok(())
}

use crate::collection::Document;
use crate::trigger::PipelineState;

/// Outcome of a write that went through the trigger pipeline.
///
/// For create and replace the document is the persisted revision; for delete
/// it is the revision that was removed.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteResult {
    document: Document,
    state: PipelineState,
}

impl WriteResult {
    pub(crate) fn new(document: Document, state: PipelineState) -> Self {
        WriteResult { document, state }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn into_document(self) -> Document {
        self.document
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }
}

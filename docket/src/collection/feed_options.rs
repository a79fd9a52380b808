use crate::collection::ContinuationToken;

/// Paging options for [crate::collection::Collection::query].
///
/// A query without a page size uses the configured default. Presenting the
/// continuation from a previous page resumes the query after it.
#[derive(Debug, Clone, Default)]
pub struct FeedOptions {
    page_size: Option<usize>,
    continuation: Option<ContinuationToken>,
}

impl FeedOptions {
    pub fn new() -> Self {
        FeedOptions::default()
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn continuation(mut self, token: Option<ContinuationToken>) -> Self {
        self.continuation = token;
        self
    }

    pub fn max_item_count(&self) -> Option<usize> {
        self.page_size
    }

    pub fn continuation_token(&self) -> Option<&ContinuationToken> {
        self.continuation.as_ref()
    }
}

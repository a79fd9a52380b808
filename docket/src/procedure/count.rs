use crate::collection::{ContinuationToken, DocumentStore};
use crate::errors::{DocketError, DocketResult, ErrorKind};
use crate::filter::Filter;

/// Partial result of one [CountAggregator::count] invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CountResult {
    count: usize,
    continuation: Option<ContinuationToken>,
}

impl CountResult {
    pub fn count(&self) -> usize {
        self.count
    }

    /// Resume point for the next invocation; `None` once the count is final.
    pub fn continuation(&self) -> Option<&ContinuationToken> {
        self.continuation.as_ref()
    }

    pub fn is_final(&self) -> bool {
        self.continuation.is_none()
    }
}

/// Counts matches of a filter in bounded, resumable chunks.
///
/// Each invocation walks scan pages and stops after `max_per_invocation`
/// matches, handing back a token. Re-invoking with that token keeps adding
/// to the grand total without counting any document twice.
#[derive(Clone)]
pub struct CountAggregator {
    store: DocumentStore,
    page_size: usize,
}

impl CountAggregator {
    pub fn new(store: DocumentStore, page_size: usize) -> Self {
        CountAggregator { store, page_size }
    }

    /// Counts up to `max_per_invocation` matches, resuming after `token`.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` when `max_per_invocation` is zero.
    pub fn count(
        &self,
        filter: &Filter,
        max_per_invocation: usize,
        token: Option<&ContinuationToken>,
    ) -> DocketResult<CountResult> {
        if max_per_invocation == 0 {
            log::error!("Count cap must be greater than zero");
            return Err(DocketError::new(
                "Count cap must be greater than zero",
                ErrorKind::InvalidOperation,
            ));
        }

        let mut cursor = self.store.scan(filter.clone(), self.page_size)?;
        let mut resume = token;
        let mut count = 0;
        loop {
            let page = cursor.next_page_limited(resume.take(), max_per_invocation - count)?;
            count += page.len();
            let continuation = page.continuation().cloned();
            log::trace!("Counted {} of {} so far on {}", page.len(), count, self.store.name());

            if continuation.is_none() || count >= max_per_invocation {
                log::debug!(
                    "Count on {} returned {}, final: {}",
                    self.store.name(),
                    count,
                    continuation.is_none()
                );
                return Ok(CountResult {
                    count,
                    continuation,
                });
            }
        }
    }
}

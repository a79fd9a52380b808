use crate::collection::{new_document_id, DocumentStore};
use crate::common::{DEFAULT_UNIQUE_ID_RETRY_LIMIT, DEFAULT_UNIQUE_ID_SUFFIX_LENGTH};
use crate::errors::{DocketError, DocketResult, ErrorKind};
use rand::Rng;

/// Finds a free document id close to a candidate.
///
/// A taken candidate gets a random numeric suffix appended. Every attempt
/// suffixes the original base id, never the previous attempt, and the number
/// of attempts is capped.
///
/// The check and the later insert are only race-free when both happen under
/// the collection's write gate; see [crate::trigger::TriggerPipeline].
///
/// # Usage
///
/// ```rust
/// use docket::collection::{DocumentStore, UniqueIdResolver};
/// use docket::doc;
///
/// let store = DocumentStore::new("c");
/// store.create(doc! { id: "DUPEJ" }).unwrap();
///
/// let resolver = UniqueIdResolver::new(store.clone());
/// let id = resolver.resolve("DUPEJ").unwrap();
/// assert!(id.starts_with("DUPEJ"));
/// assert_eq!(id.len(), "DUPEJ".len() + 5);
/// ```
#[derive(Clone)]
pub struct UniqueIdResolver {
    store: DocumentStore,
    retry_limit: u32,
    suffix_length: usize,
}

impl UniqueIdResolver {
    /// Creates a resolver with the default cap of 50 retries and 5 suffix digits.
    pub fn new(store: DocumentStore) -> Self {
        UniqueIdResolver {
            store,
            retry_limit: DEFAULT_UNIQUE_ID_RETRY_LIMIT,
            suffix_length: DEFAULT_UNIQUE_ID_SUFFIX_LENGTH,
        }
    }

    pub fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    /// Sets the number of random digits appended per attempt.
    pub fn with_suffix_length(mut self, suffix_length: usize) -> Self {
        self.suffix_length = suffix_length;
        self
    }

    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    pub fn suffix_length(&self) -> usize {
        self.suffix_length
    }

    /// Returns an id that is not taken in the store.
    ///
    /// # Behavior
    ///
    /// 1. An empty candidate yields a fresh UUID without consulting the store.
    /// 2. A candidate that is free is returned unchanged.
    /// 3. Otherwise `candidate + <random digits>` is tried, up to
    ///    `retry_limit` times.
    ///
    /// # Errors
    ///
    /// `ResolutionExhausted` once every suffixed attempt was taken.
    pub fn resolve(&self, candidate: &str) -> DocketResult<String> {
        if candidate.is_empty() {
            return Ok(new_document_id());
        }
        if !self.store.contains(candidate) {
            return Ok(candidate.to_string());
        }

        let mut rng = rand::thread_rng();
        for attempt in 1..=self.retry_limit {
            let suffixed = format!("{}{}", candidate, self.random_suffix(&mut rng));
            if !self.store.contains(&suffixed) {
                log::debug!(
                    "Resolved duplicate id {} to {} after {} attempt(s)",
                    candidate,
                    suffixed,
                    attempt
                );
                return Ok(suffixed);
            }
            log::trace!("Suffixed id {} is also taken", suffixed);
        }

        log::error!(
            "Could not find a free id for {} after {} attempts",
            candidate,
            self.retry_limit
        );
        Err(DocketError::new(
            &format!(
                "Could not find a free id for {} after {} attempts",
                candidate, self.retry_limit
            ),
            ErrorKind::ResolutionExhausted,
        ))
    }

    fn random_suffix<R: Rng>(&self, rng: &mut R) -> String {
        (0..self.suffix_length)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect()
    }
}

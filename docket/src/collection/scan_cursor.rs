use crate::collection::Document;
use crate::errors::{DocketError, DocketResult, ErrorKind};
use crate::filter::Filter;
use im::OrdMap;
use std::fmt::{Display, Formatter};
use std::ops::Bound::{Excluded, Unbounded};
use std::str::FromStr;

/// Marks where a scan stopped so a later scan can resume after it.
///
/// A token records the snapshot generation it was issued from and the
/// position of the last document returned. Tokens travel as strings of the
/// form `<generation>.<position>` in hex.
///
/// Resuming with a token from an older generation is allowed but weakly
/// consistent: documents written after the token was issued may be skipped
/// or seen twice relative to the first scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContinuationToken {
    generation: u64,
    position: u64,
}

impl ContinuationToken {
    pub(crate) fn new(generation: u64, position: u64) -> Self {
        ContinuationToken {
            generation,
            position,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn position(&self) -> u64 {
        self.position
    }
}

impl Display for ContinuationToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:x}.{:x}", self.generation, self.position)
    }
}

impl FromStr for ContinuationToken {
    type Err = DocketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (generation, position) = match s.split_once('.') {
            Some(parts) => parts,
            None => {
                log::error!("Malformed continuation token {}", s);
                return Err(DocketError::new(
                    &format!("Malformed continuation token {}", s),
                    ErrorKind::EncodingError,
                ));
            }
        };
        Ok(ContinuationToken {
            generation: u64::from_str_radix(generation, 16)?,
            position: u64::from_str_radix(position, 16)?,
        })
    }
}

/// One page of scan results.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    documents: Vec<Document>,
    continuation: Option<ContinuationToken>,
}

impl Page {
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn into_documents(self) -> Vec<Document> {
        self.documents
    }

    /// Token to resume after this page, `None` once the scan is exhausted.
    pub fn continuation(&self) -> Option<&ContinuationToken> {
        self.continuation.as_ref()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn has_more(&self) -> bool {
        self.continuation.is_some()
    }
}

/// A lazy, restartable, paginated scan over a store snapshot.
///
/// Each call to [ScanCursor::next_page] walks forward from where the previous
/// page stopped (or from the position in a presented token) and materializes
/// at most `page_size` matching documents. The returned page carries a
/// continuation token exactly when at least one more match remains in the
/// snapshot, so a `None` token always means the scan is complete.
///
/// The cursor never blocks: it holds its own immutable snapshot and does not
/// touch the store's locks after creation.
///
/// # Usage
///
/// ```rust
/// use docket::collection::DocumentStore;
/// use docket::filter::field;
/// use docket::doc;
///
/// let store = DocumentStore::new("orders");
/// for i in 0..5 {
///     store.create(doc! { n: i }).unwrap();
/// }
///
/// let mut cursor = store.scan(field("n").gte(1), 3).unwrap();
/// let first = cursor.next_page(None).unwrap();
/// assert_eq!(first.len(), 3);
/// let second = cursor.next_page(first.continuation()).unwrap();
/// assert_eq!(second.len(), 1);
/// assert!(!second.has_more());
/// ```
pub struct ScanCursor {
    entries: OrdMap<u64, Document>,
    generation: u64,
    filter: Filter,
    page_size: usize,
    resume_after: u64,
    exhausted: bool,
}

impl ScanCursor {
    pub(crate) fn new(
        entries: OrdMap<u64, Document>,
        generation: u64,
        filter: Filter,
        page_size: usize,
    ) -> Self {
        ScanCursor {
            entries,
            generation,
            filter,
            page_size,
            resume_after: 0,
            exhausted: false,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Generation of the snapshot this cursor reads.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Returns the next page of at most `page_size` matches.
    ///
    /// # Arguments
    ///
    /// * `token` - Resume after this token instead of after the cursor's own
    ///   last page.
    pub fn next_page(&mut self, token: Option<&ContinuationToken>) -> DocketResult<Page> {
        self.next_page_limited(token, self.page_size)
    }

    /// Like [ScanCursor::next_page], with a smaller page bound.
    ///
    /// The effective bound is `min(limit, page_size)`. A zero limit returns an
    /// empty page that resumes where this one would have started.
    pub fn next_page_limited(
        &mut self,
        token: Option<&ContinuationToken>,
        limit: usize,
    ) -> DocketResult<Page> {
        if let Some(token) = token {
            if token.generation != self.generation {
                log::warn!(
                    "Resuming scan with token {} from generation {}, snapshot is at {}",
                    token,
                    token.generation,
                    self.generation
                );
            }
            self.resume_after = token.position;
            self.exhausted = false;
        }

        if self.exhausted {
            return Ok(Page {
                documents: Vec::new(),
                continuation: None,
            });
        }

        let limit = limit.min(self.page_size);
        let mut documents = Vec::with_capacity(limit.min(self.entries.len()));
        let mut last_position = self.resume_after;
        let mut more_remaining = false;
        for (position, document) in self
            .entries
            .range((Excluded(self.resume_after), Unbounded))
        {
            if !self.filter.apply(document)? {
                continue;
            }
            if documents.len() == limit {
                more_remaining = true;
                break;
            }
            log::trace!("Scan matched {:?} at position {}", document.id(), position);
            documents.push(document.clone());
            last_position = *position;
        }

        self.resume_after = last_position;
        let continuation = if more_remaining {
            Some(ContinuationToken::new(self.generation, last_position))
        } else {
            self.exhausted = true;
            None
        };

        Ok(Page {
            documents,
            continuation,
        })
    }
}

impl Iterator for ScanCursor {
    type Item = DocketResult<Page>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        match self.next_page(None) {
            Ok(page) if page.is_empty() && !page.has_more() => None,
            Ok(page) => Some(Ok(page)),
            Err(err) => {
                self.exhausted = true;
                Some(Err(err))
            }
        }
    }
}

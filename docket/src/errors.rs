use backtrace::Backtrace;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::result::Result;
use std::sync::Arc;
use std::time::Duration;

/// Error kinds for Docket operations
///
/// Each kind names a category of failure so callers can match on it instead of
/// parsing messages. Store level failures (`DuplicateId`, `NotFound`, `Conflict`)
/// are always returned to the immediate caller.
///
/// # Examples
///
/// ```rust
/// use docket::errors::{DocketError, ErrorKind, DocketResult};
///
/// fn example() -> DocketResult<()> {
///     Err(DocketError::new("Document not found", ErrorKind::NotFound))
/// }
/// assert_eq!(example().unwrap_err().kind(), &ErrorKind::NotFound);
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrorKind {
    // Store Errors
    /// A document with the same id already exists in the collection
    DuplicateId,
    /// The requested document does not exist
    NotFound,
    /// The expected etag did not match the stored document
    Conflict,
    /// The request was rate limited, retry after the carried delay
    Throttled(Duration),

    // Id Errors
    /// The unique id resolver ran out of retries
    ResolutionExhausted,
    /// The provided id is malformed
    InvalidId,

    // Trigger Errors
    /// A pre-trigger aborted the write before it reached the store
    TriggerRejected,
    /// A post-trigger failed after the write was committed
    PostTriggerFailed,
    /// No trigger with the requested name and type is registered
    TriggerNotFound,

    // Procedure Errors
    /// No stored procedure with the requested name is registered
    ProcedureNotFound,

    // Database Errors
    /// The collection does not exist
    CollectionNotFound,

    // Operation Errors
    /// The operation is not valid in the current context
    InvalidOperation,
    /// Input failed validation
    ValidationError,
    /// A filter could not be built or evaluated
    FilterError,
    /// Error encoding or decoding data
    EncodingError,

    /// Internal error (usually indicates a bug)
    InternalError,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::DuplicateId => write!(f, "Duplicate id"),
            ErrorKind::NotFound => write!(f, "Not found"),
            ErrorKind::Conflict => write!(f, "Conflict"),
            ErrorKind::Throttled(delay) => write!(f, "Throttled (retry after {:?})", delay),
            ErrorKind::ResolutionExhausted => write!(f, "Resolution exhausted"),
            ErrorKind::InvalidId => write!(f, "Invalid id"),
            ErrorKind::TriggerRejected => write!(f, "Trigger rejected"),
            ErrorKind::PostTriggerFailed => write!(f, "Post-trigger failed"),
            ErrorKind::TriggerNotFound => write!(f, "Trigger not found"),
            ErrorKind::ProcedureNotFound => write!(f, "Procedure not found"),
            ErrorKind::CollectionNotFound => write!(f, "Collection not found"),
            ErrorKind::InvalidOperation => write!(f, "Invalid operation"),
            ErrorKind::ValidationError => write!(f, "Validation error"),
            ErrorKind::FilterError => write!(f, "Filter error"),
            ErrorKind::EncodingError => write!(f, "Encoding error"),
            ErrorKind::InternalError => write!(f, "Internal error"),
        }
    }
}

/// Custom Docket error type.
///
/// `DocketError` carries a message, an [ErrorKind] and an optional cause. A
/// backtrace is captured unresolved at construction and only symbolized when
/// the error is debug-printed.
///
/// # Examples
///
/// ```rust
/// use docket::errors::{DocketError, ErrorKind};
///
/// let cause = DocketError::new("Document not found", ErrorKind::NotFound);
/// let err = DocketError::new_with_cause("Trigger failed", ErrorKind::PostTriggerFailed, cause);
/// assert!(err.cause().is_some());
/// ```
#[derive(Clone)]
pub struct DocketError {
    message: String,
    error_kind: ErrorKind,
    cause: Option<Box<DocketError>>,
    backtrace: Arc<Backtrace>,
}

impl DocketError {
    /// Creates a new `DocketError` with the specified message and error kind.
    pub fn new(message: &str, error_kind: ErrorKind) -> Self {
        DocketError {
            message: message.to_string(),
            error_kind,
            cause: None,
            backtrace: Arc::new(Backtrace::new_unresolved()),
        }
    }

    /// Creates a new `DocketError` that keeps `cause` as its source.
    pub fn new_with_cause(message: &str, error_kind: ErrorKind, cause: DocketError) -> Self {
        DocketError {
            message: message.to_string(),
            error_kind,
            cause: Some(Box::new(cause)),
            backtrace: Arc::new(Backtrace::new_unresolved()),
        }
    }

    /// Creates a throttling error that asks the caller to back off for `delay`.
    pub fn throttled(delay: Duration) -> Self {
        DocketError::new(
            &format!("Request rate is large, retry after {:?}", delay),
            ErrorKind::Throttled(delay),
        )
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.error_kind
    }

    pub fn cause(&self) -> Option<&DocketError> {
        self.cause.as_deref()
    }

    /// Returns the delay the caller should wait before retrying, if this error
    /// is a throttling error.
    ///
    /// Only the top-level kind is consulted. A throttled error wrapped as the
    /// cause of another failure is not retryable as a whole.
    pub fn retry_after(&self) -> Option<Duration> {
        match self.error_kind {
            ErrorKind::Throttled(delay) => Some(delay),
            _ => None,
        }
    }
}

impl Display for DocketError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Debug for DocketError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // print error message with stack trace followed by cause
        match &self.cause {
            Some(cause) => write!(f, "{}\nCaused by: {:?}", self.message, cause),
            None => {
                let mut backtrace = (*self.backtrace).clone();
                backtrace.resolve();
                write!(f, "{}\n{:?}", self.message, backtrace)
            }
        }
    }
}

impl Error for DocketError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            Some(cause) => Some(cause.as_ref()),
            None => None,
        }
    }
}

/// A result type alias for Docket operations.
pub type DocketResult<T> = Result<T, DocketError>;

#[cfg(feature = "serde")]
impl From<serde_json::Error> for DocketError {
    fn from(err: serde_json::Error) -> Self {
        DocketError::new(&format!("JSON error: {}", err), ErrorKind::EncodingError)
    }
}

impl From<std::num::ParseIntError> for DocketError {
    fn from(err: std::num::ParseIntError) -> Self {
        DocketError::new(
            &format!("Integer parsing error: {}", err),
            ErrorKind::EncodingError,
        )
    }
}

impl From<regex::Error> for DocketError {
    fn from(err: regex::Error) -> Self {
        DocketError::new(&format!("Invalid pattern: {}", err), ErrorKind::FilterError)
    }
}

impl From<String> for DocketError {
    fn from(msg: String) -> Self {
        DocketError::new(&msg, ErrorKind::InternalError)
    }
}

impl From<&str> for DocketError {
    fn from(msg: &str) -> Self {
        DocketError::new(msg, ErrorKind::InternalError)
    }
}

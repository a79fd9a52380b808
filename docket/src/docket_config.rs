//! Configuration management for a Docket database.

use crate::common::{
    DEFAULT_BULK_BATCH_BUDGET, DEFAULT_MAX_COUNT_PER_INVOCATION, DEFAULT_PAGE_SIZE,
    DEFAULT_UNIQUE_ID_RETRY_LIMIT, DEFAULT_UNIQUE_ID_SUFFIX_LENGTH,
};
use crate::errors::{DocketError, DocketResult, ErrorKind};
use crate::procedure::Budget;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const MAX_SUFFIX_LENGTH: usize = 18;

/// Settings shared by every collection of a [crate::Docket].
///
/// Values can be changed until the database is opened; afterwards every
/// setter fails with `InvalidOperation`. Cloning is cheap and clones share
/// state.
///
/// # Examples
///
/// ```rust
/// use docket::Docket;
///
/// let db = Docket::builder()
///     .page_size(50)
///     .request_rate_limit(100)
///     .open()
///     .unwrap();
/// assert_eq!(db.config().page_size(), 50);
/// assert_eq!(db.config().request_rate_limit(), Some(100));
/// ```
#[derive(Clone)]
pub struct DocketConfig {
    inner: Arc<DocketConfigInner>,
}

impl Default for DocketConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl DocketConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        DocketConfig {
            inner: Arc::new(DocketConfigInner::new()),
        }
    }

    /// Number of documents per scan page.
    pub fn page_size(&self) -> usize {
        self.inner.page_size.load(Ordering::Relaxed)
    }

    /// Sets the scan page size.
    ///
    /// # Errors
    ///
    /// Returns error if already initialized or if `page_size` is zero.
    pub fn set_page_size(&self, page_size: usize) -> DocketResult<()> {
        self.inner.ensure_mutable("Page size")?;
        self.inner.ensure_positive("Page size", page_size as u64)?;
        self.inner.page_size.store(page_size, Ordering::Relaxed);
        Ok(())
    }

    /// Matches counted by one `spSelectCount` invocation.
    pub fn max_count_per_invocation(&self) -> usize {
        self.inner.max_count.load(Ordering::Relaxed)
    }

    pub fn set_max_count_per_invocation(&self, max_count: usize) -> DocketResult<()> {
        self.inner.ensure_mutable("Count cap")?;
        self.inner.ensure_positive("Count cap", max_count as u64)?;
        self.inner.max_count.store(max_count, Ordering::Relaxed);
        Ok(())
    }

    /// Suffix attempts before unique id resolution gives up.
    pub fn unique_id_retry_limit(&self) -> u32 {
        self.inner.retry_limit.load(Ordering::Relaxed)
    }

    pub fn set_unique_id_retry_limit(&self, retry_limit: u32) -> DocketResult<()> {
        self.inner.ensure_mutable("Unique id retry limit")?;
        self.inner
            .ensure_positive("Unique id retry limit", retry_limit as u64)?;
        self.inner.retry_limit.store(retry_limit, Ordering::Relaxed);
        Ok(())
    }

    /// Number of random digits appended to a taken id.
    pub fn unique_id_suffix_length(&self) -> usize {
        self.inner.suffix_length.load(Ordering::Relaxed)
    }

    /// Sets the suffix length.
    ///
    /// # Errors
    ///
    /// Returns error if already initialized or if `suffix_length` is not in
    /// `1..=18`.
    pub fn set_unique_id_suffix_length(&self, suffix_length: usize) -> DocketResult<()> {
        self.inner.ensure_mutable("Unique id suffix length")?;
        if !(1..=MAX_SUFFIX_LENGTH).contains(&suffix_length) {
            log::error!(
                "Unique id suffix length must be between 1 and {}, got {}",
                MAX_SUFFIX_LENGTH,
                suffix_length
            );
            return Err(DocketError::new(
                &format!(
                    "Unique id suffix length must be between 1 and {}, got {}",
                    MAX_SUFFIX_LENGTH, suffix_length
                ),
                ErrorKind::InvalidOperation,
            ));
        }
        self.inner
            .suffix_length
            .store(suffix_length, Ordering::Relaxed);
        Ok(())
    }

    /// Client requests allowed per throttle window and collection, if limited.
    pub fn request_rate_limit(&self) -> Option<u32> {
        match self.inner.rate_limit.load(Ordering::Relaxed) {
            0 => None,
            limit => Some(limit),
        }
    }

    /// Sets or clears the request rate limit.
    ///
    /// # Errors
    ///
    /// Returns error if already initialized or if the limit is `Some(0)`.
    pub fn set_request_rate_limit(&self, limit: Option<u32>) -> DocketResult<()> {
        self.inner.ensure_mutable("Request rate limit")?;
        if let Some(limit) = limit {
            self.inner
                .ensure_positive("Request rate limit", limit as u64)?;
        }
        self.inner
            .rate_limit
            .store(limit.unwrap_or(0), Ordering::Relaxed);
        Ok(())
    }

    pub fn throttle_window(&self) -> Duration {
        Duration::from_millis(self.inner.throttle_window_ms.load(Ordering::Relaxed))
    }

    /// Sets the throttle window. Sub-millisecond precision is dropped.
    pub fn set_throttle_window(&self, window: Duration) -> DocketResult<()> {
        self.inner.ensure_mutable("Throttle window")?;
        let millis = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        self.inner.ensure_positive("Throttle window", millis)?;
        self.inner
            .throttle_window_ms
            .store(millis, Ordering::Relaxed);
        Ok(())
    }

    /// Budget of one `spBulkInsert` call.
    pub fn bulk_batch_budget(&self) -> Budget {
        *self.inner.bulk_batch_budget.read()
    }

    pub fn set_bulk_batch_budget(&self, budget: Budget) -> DocketResult<()> {
        self.inner.ensure_mutable("Bulk batch budget")?;
        *self.inner.bulk_batch_budget.write() = budget;
        Ok(())
    }

    /// Whether new collections get the built-in triggers and procedures.
    pub fn register_builtins(&self) -> bool {
        self.inner.register_builtins.load(Ordering::Relaxed)
    }

    pub fn set_register_builtins(&self, register: bool) -> DocketResult<()> {
        self.inner.ensure_mutable("Built-in registration")?;
        self.inner
            .register_builtins
            .store(register, Ordering::Relaxed);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.configured.load(Ordering::Relaxed)
    }

    /// Freezes the configuration.
    pub(crate) fn initialize(&self) {
        self.inner.configured.store(true, Ordering::Relaxed);
    }
}

struct DocketConfigInner {
    configured: AtomicBool,
    page_size: AtomicUsize,
    max_count: AtomicUsize,
    retry_limit: AtomicU32,
    suffix_length: AtomicUsize,
    /// Zero means unlimited.
    rate_limit: AtomicU32,
    throttle_window_ms: AtomicU64,
    bulk_batch_budget: RwLock<Budget>,
    register_builtins: AtomicBool,
}

impl DocketConfigInner {
    fn new() -> Self {
        DocketConfigInner {
            configured: AtomicBool::from(false),
            page_size: AtomicUsize::new(DEFAULT_PAGE_SIZE),
            max_count: AtomicUsize::new(DEFAULT_MAX_COUNT_PER_INVOCATION),
            retry_limit: AtomicU32::new(DEFAULT_UNIQUE_ID_RETRY_LIMIT),
            suffix_length: AtomicUsize::new(DEFAULT_UNIQUE_ID_SUFFIX_LENGTH),
            rate_limit: AtomicU32::new(0),
            throttle_window_ms: AtomicU64::new(1000),
            bulk_batch_budget: RwLock::new(Budget::Operations(DEFAULT_BULK_BATCH_BUDGET)),
            register_builtins: AtomicBool::from(true),
        }
    }

    fn ensure_mutable(&self, setting: &str) -> DocketResult<()> {
        if self.configured.load(Ordering::Relaxed) {
            log::error!("{} cannot be changed after initialization", setting);
            return Err(DocketError::new(
                &format!("{} cannot be changed after initialization", setting),
                ErrorKind::InvalidOperation,
            ));
        }
        Ok(())
    }

    fn ensure_positive(&self, setting: &str, value: u64) -> DocketResult<()> {
        if value == 0 {
            log::error!("{} must be greater than zero", setting);
            return Err(DocketError::new(
                &format!("{} must be greater than zero", setting),
                ErrorKind::InvalidOperation,
            ));
        }
        Ok(())
    }
}

use crate::docket::Docket;
use crate::docket_config::DocketConfig;
use crate::errors::{DocketError, DocketResult};
use crate::procedure::Budget;
use std::time::Duration;

/// Builder for configuring and opening a [Docket] database.
///
/// Setters validate eagerly. The first invalid value is remembered and
/// returned by [DocketBuilder::open]; later setters are then ignored.
///
/// # Examples
///
/// ```rust
/// use docket::Docket;
/// use docket::procedure::Budget;
///
/// let db = Docket::builder()
///     .max_count_per_invocation(100)
///     .bulk_batch_budget(Budget::Operations(50))
///     .open()
///     .unwrap();
/// assert_eq!(db.config().max_count_per_invocation(), 100);
///
/// let err = Docket::builder().page_size(0).open();
/// assert!(err.is_err());
/// ```
#[derive(Default)]
pub struct DocketBuilder {
    error: Option<DocketError>,
    config: DocketConfig,
}

impl DocketBuilder {
    /// Creates a builder with the default configuration.
    pub fn new() -> Self {
        DocketBuilder {
            error: None,
            config: DocketConfig::new(),
        }
    }

    /// Sets the number of documents per scan page. Must be positive.
    pub fn page_size(self, page_size: usize) -> Self {
        self.apply(|config| config.set_page_size(page_size))
    }

    /// Sets how many matches one `spSelectCount` invocation counts before
    /// handing back a continuation token. Must be positive.
    pub fn max_count_per_invocation(self, max_count: usize) -> Self {
        self.apply(|config| config.set_max_count_per_invocation(max_count))
    }

    /// Sets how many suffixed candidates unique id resolution tries.
    pub fn unique_id_retry_limit(self, retry_limit: u32) -> Self {
        self.apply(|config| config.set_unique_id_retry_limit(retry_limit))
    }

    /// Sets the number of random digits appended to a taken id, `1..=18`.
    pub fn unique_id_suffix_length(self, suffix_length: usize) -> Self {
        self.apply(|config| config.set_unique_id_suffix_length(suffix_length))
    }

    /// Limits client requests per throttle window on each collection.
    pub fn request_rate_limit(self, limit: u32) -> Self {
        self.apply(|config| config.set_request_rate_limit(Some(limit)))
    }

    pub fn throttle_window(self, window: Duration) -> Self {
        self.apply(|config| config.set_throttle_window(window))
    }

    /// Sets the budget of a single `spBulkInsert` call.
    pub fn bulk_batch_budget(self, budget: Budget) -> Self {
        self.apply(|config| config.set_bulk_batch_budget(budget))
    }

    /// Controls whether new collections get the built-in triggers and
    /// procedures. Enabled by default.
    pub fn register_builtins(self, register: bool) -> Self {
        self.apply(|config| config.set_register_builtins(register))
    }

    /// Opens a database with the configured settings.
    ///
    /// # Errors
    ///
    /// Returns the first error captured by a setter.
    pub fn open(self) -> DocketResult<Docket> {
        if let Some(error) = self.error {
            return Err(error);
        }
        self.config.initialize();
        log::debug!("Opening docket database");
        Ok(Docket::new(self.config))
    }

    fn apply<F>(mut self, setter: F) -> Self
    where
        F: FnOnce(&DocketConfig) -> DocketResult<()>,
    {
        if self.error.is_none() {
            if let Err(e) = setter(&self.config) {
                self.error = Some(e);
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn test_open_with_defaults() {
        let db = DocketBuilder::new().open().unwrap();
        assert!(db.config().is_initialized());
        assert_eq!(db.config().page_size(), 200);
    }

    #[test]
    fn test_settings_are_applied() {
        let db = DocketBuilder::new()
            .page_size(10)
            .max_count_per_invocation(30)
            .unique_id_retry_limit(7)
            .unique_id_suffix_length(3)
            .request_rate_limit(20)
            .throttle_window(Duration::from_millis(250))
            .bulk_batch_budget(Budget::Unlimited)
            .register_builtins(false)
            .open()
            .unwrap();
        let config = db.config();
        assert_eq!(config.page_size(), 10);
        assert_eq!(config.max_count_per_invocation(), 30);
        assert_eq!(config.unique_id_retry_limit(), 7);
        assert_eq!(config.unique_id_suffix_length(), 3);
        assert_eq!(config.request_rate_limit(), Some(20));
        assert_eq!(config.throttle_window(), Duration::from_millis(250));
        assert_eq!(config.bulk_batch_budget(), Budget::Unlimited);
        assert!(!config.register_builtins());
    }

    #[test]
    fn test_first_error_wins() {
        let err = DocketBuilder::new()
            .page_size(5)
            .unique_id_suffix_length(0)
            .request_rate_limit(0)
            .open()
            .err()
            .unwrap();
        assert_eq!(err.kind(), &ErrorKind::InvalidOperation);
        assert!(err.message().contains("suffix length"));
    }

    #[test]
    fn test_config_frozen_after_open() {
        let db = DocketBuilder::new().open().unwrap();
        assert!(db.config().set_page_size(1).is_err());
    }
}

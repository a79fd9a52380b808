use crate::trigger::TriggerSelection;

/// Per-request options for document writes.
///
/// Triggers never run implicitly: a write opts into pre- and post-triggers by
/// name, or into every registered trigger with [RequestOptions::all_triggers].
///
/// # Examples
///
/// ```rust
/// use docket::collection::RequestOptions;
///
/// let options = RequestOptions::new()
///     .pre_trigger_include(vec!["trgEnsureUniqueId"])
///     .post_trigger_include(vec!["trgUpdateMetadata"]);
/// assert!(options.if_match_etag().is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    pre_triggers: TriggerSelection,
    post_triggers: TriggerSelection,
    if_match: Option<String>,
}

impl RequestOptions {
    /// Options that run no triggers and apply no etag condition.
    pub fn new() -> Self {
        RequestOptions::default()
    }

    /// Options that run every registered trigger.
    pub fn all_triggers() -> Self {
        RequestOptions {
            pre_triggers: TriggerSelection::All,
            post_triggers: TriggerSelection::All,
            if_match: None,
        }
    }

    /// Runs only the named pre-triggers, in registration order.
    pub fn pre_trigger_include<S: Into<String>>(mut self, names: Vec<S>) -> Self {
        self.pre_triggers = TriggerSelection::Named(names.into_iter().map(Into::into).collect());
        self
    }

    /// Runs only the named post-triggers, in registration order.
    pub fn post_trigger_include<S: Into<String>>(mut self, names: Vec<S>) -> Self {
        self.post_triggers = TriggerSelection::Named(names.into_iter().map(Into::into).collect());
        self
    }

    /// Makes a replace conditional on the stored etag.
    pub fn if_match(mut self, etag: &str) -> Self {
        self.if_match = Some(etag.to_string());
        self
    }

    pub fn pre_triggers(&self) -> &TriggerSelection {
        &self.pre_triggers
    }

    pub fn post_triggers(&self) -> &TriggerSelection {
        &self.post_triggers
    }

    pub fn if_match_etag(&self) -> Option<&str> {
        self.if_match.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_selects_nothing() {
        let options = RequestOptions::new();
        assert_eq!(options.pre_triggers(), &TriggerSelection::None);
        assert_eq!(options.post_triggers(), &TriggerSelection::None);
    }

    #[test]
    fn builders_set_fields() {
        let options = RequestOptions::new()
            .pre_trigger_include(vec!["a", "b"])
            .if_match("0000000000000001");
        assert_eq!(
            options.pre_triggers(),
            &TriggerSelection::Named(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(options.if_match_etag(), Some("0000000000000001"));
        assert_eq!(RequestOptions::all_triggers().post_triggers(), &TriggerSelection::All);
    }
}

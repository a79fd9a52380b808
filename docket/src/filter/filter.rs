use crate::collection::Document;
use crate::common::{Value, DOC_ID};
use crate::errors::{DocketError, DocketResult, ErrorKind};
use std::any::Any;
use std::fmt::Display;
use std::ops::Deref;
use std::sync::Arc;

use super::{
    field, AllFilter, AndFilter, EqualsFilter, NotFilter, OrFilter, PredicateFilter,
};

/// Trait for implementing custom filters.
///
/// A `FilterProvider` decides whether a document matches. Implementations
/// must be pure: the same document always yields the same answer, and
/// evaluating a filter never touches the store.
pub trait FilterProvider: Any + Send + Sync + Display {
    /// Applies the filter to a document and returns whether it matches.
    ///
    /// # Arguments
    ///
    /// * `entry` - The document to evaluate
    ///
    /// # Returns
    ///
    /// `Ok(true)` if the document matches the filter, `Ok(false)` otherwise
    fn apply(&self, entry: &Document) -> DocketResult<bool>;

    fn as_any(&self) -> &dyn Any;
}

/// A cloneable handle to a [FilterProvider].
#[derive(Clone)]
pub struct Filter {
    inner: Arc<dyn FilterProvider>,
}

#[cfg(test)]
impl std::fmt::Debug for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Filter").finish_non_exhaustive()
    }
}

impl Filter {
    /// Creates a new filter from a filter provider implementation.
    pub fn new<T: FilterProvider + 'static>(inner: T) -> Self {
        Filter {
            inner: Arc::new(inner),
        }
    }

    /// Combines this filter with another using logical AND.
    pub fn and(&self, filter: Filter) -> Self {
        Filter::new(AndFilter::new(vec![self.clone(), filter]))
    }

    /// Combines this filter with another using logical OR.
    pub fn or(&self, filter: Filter) -> Self {
        Filter::new(OrFilter::new(vec![self.clone(), filter]))
    }

    /// Negates this filter using logical NOT.
    pub fn not(&self) -> Self {
        Filter::new(NotFilter::new(self.clone()))
    }

    /// Decodes a filter from its value description.
    ///
    /// Stored procedures take their predicate as an argument value, which is
    /// decoded here.
    ///
    /// # Accepted forms
    ///
    /// * `Null` - matches every document
    /// * `{field, op, value}` - a single comparison, where `op` is one of
    ///   `eq`, `ne`, `startsWith`, `gt`, `gte`, `lt` or `lte`. `op` defaults to
    ///   `eq` when omitted.
    /// * an array of the above - all of them must match
    ///
    /// # Errors
    ///
    /// `FilterError` for any other shape, an unknown operator, a missing
    /// `field`, or a `startsWith` value that is not a string.
    pub fn from_value(value: &Value) -> DocketResult<Filter> {
        match value {
            Value::Null => Ok(all()),
            Value::Array(values) => {
                let filters = values
                    .iter()
                    .map(Filter::from_value)
                    .collect::<DocketResult<Vec<_>>>()?;
                Ok(and(filters))
            }
            Value::Document(description) => decode_comparison(description),
            other => {
                log::error!("Cannot build a filter from a {}", other.type_name());
                Err(DocketError::new(
                    &format!("Cannot build a filter from a {}", other.type_name()),
                    ErrorKind::FilterError,
                ))
            }
        }
    }
}

fn decode_comparison(description: &Document) -> DocketResult<Filter> {
    let field_name = match description.get("field").and_then(|v| v.as_str()) {
        Some(name) if !name.is_empty() => name,
        _ => {
            log::error!("Filter description {} has no field name", description);
            return Err(DocketError::new(
                "Filter description has no field name",
                ErrorKind::FilterError,
            ));
        }
    };
    let op = description
        .get("op")
        .and_then(|v| v.as_str())
        .unwrap_or("eq");
    let value = description.get("value").cloned().unwrap_or(Value::Null);

    let filter = match op {
        "eq" => field(field_name).eq(value),
        "ne" => field(field_name).ne(value),
        "gt" => field(field_name).gt(value),
        "gte" => field(field_name).gte(value),
        "lt" => field(field_name).lt(value),
        "lte" => field(field_name).lte(value),
        "startsWith" => match value.as_str() {
            Some(prefix) => field(field_name).starts_with(prefix),
            None => {
                log::error!("startsWith on {} needs a string value", field_name);
                return Err(DocketError::new(
                    &format!("startsWith on {} needs a string value", field_name),
                    ErrorKind::FilterError,
                ));
            }
        },
        unknown => {
            log::error!("Unknown filter operator {}", unknown);
            return Err(DocketError::new(
                &format!("Unknown filter operator {}", unknown),
                ErrorKind::FilterError,
            ));
        }
    };
    Ok(filter)
}

impl Display for Filter {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl Deref for Filter {
    type Target = Arc<dyn FilterProvider>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Creates a filter that matches all documents.
pub fn all() -> Filter {
    Filter::new(AllFilter)
}

/// Creates a filter that matches the document with the given id.
pub fn by_id(id: &str) -> Filter {
    Filter::new(EqualsFilter::new(DOC_ID.to_string(), Value::from(id)))
}

/// Wraps a closure as a filter.
///
/// The closure must be a pure function of the document.
pub fn where_fn<F>(description: &str, predicate: F) -> Filter
where
    F: Fn(&Document) -> bool + Send + Sync + 'static,
{
    Filter::new(PredicateFilter::new(description.to_string(), predicate))
}

/// Combines multiple filters using logical AND.
pub fn and(filters: Vec<Filter>) -> Filter {
    Filter::new(AndFilter::new(filters))
}

/// Combines multiple filters using logical OR.
pub fn or(filters: Vec<Filter>) -> Filter {
    Filter::new(OrFilter::new(filters))
}

/// Negates a filter using logical NOT.
pub fn not(filter: Filter) -> Filter {
    Filter::new(NotFilter::new(filter))
}

pub(crate) fn is_all_filter(filter: &Filter) -> bool {
    filter.as_any().is::<AllFilter>()
}

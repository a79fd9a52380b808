use regex::Regex;

use crate::common::Value;
use crate::errors::DocketResult;

use super::{
    ComparisonFilter, ComparisonMode, EqualsFilter, ExistsFilter, Filter, InFilter,
    NotEqualsFilter, RegexFilter, StartsWithFilter,
};

/// Creates a fluent filter builder for the specified field name.
///
/// # Arguments
///
/// * `field_name` - A field name or dotted path
///
/// # Returns
///
/// A `FluentFilter` builder for constructing field-specific filters
pub fn field(field_name: &str) -> FluentFilter {
    FluentFilter {
        field_name: field_name.to_string(),
    }
}

/// A fluent builder for filters on one field.
pub struct FluentFilter {
    field_name: String,
}

impl FluentFilter {
    /// Matches documents where the field equals `value`.
    #[inline]
    pub fn eq<T: Into<Value>>(self, value: T) -> Filter {
        Filter::new(EqualsFilter::new(self.field_name, value.into()))
    }

    /// Matches documents where the field differs from `value`, including
    /// documents that lack the field.
    #[inline]
    pub fn ne<T: Into<Value>>(self, value: T) -> Filter {
        Filter::new(NotEqualsFilter::new(self.field_name, value.into()))
    }

    pub fn gt<T: Into<Value>>(self, value: T) -> Filter {
        self.compare(value.into(), ComparisonMode::Greater)
    }

    pub fn gte<T: Into<Value>>(self, value: T) -> Filter {
        self.compare(value.into(), ComparisonMode::GreaterEqual)
    }

    pub fn lt<T: Into<Value>>(self, value: T) -> Filter {
        self.compare(value.into(), ComparisonMode::Lesser)
    }

    pub fn lte<T: Into<Value>>(self, value: T) -> Filter {
        self.compare(value.into(), ComparisonMode::LesserEqual)
    }

    /// Matches documents whose string field starts with `prefix`.
    pub fn starts_with(self, prefix: &str) -> Filter {
        Filter::new(StartsWithFilter::new(self.field_name, prefix.to_string()))
    }

    /// Matches documents whose field equals any of `values`.
    pub fn in_array<T: Into<Value>>(self, values: Vec<T>) -> Filter {
        Filter::new(InFilter::new(
            self.field_name,
            values.into_iter().map(Into::into).collect(),
        ))
    }

    /// Matches documents where the field is present and not null.
    pub fn exists(self) -> Filter {
        Filter::new(ExistsFilter::new(self.field_name))
    }

    /// Matches documents whose string field matches `pattern`.
    ///
    /// # Errors
    ///
    /// `FilterError` if the pattern does not compile.
    pub fn regex(self, pattern: &str) -> DocketResult<Filter> {
        let compiled = Regex::new(pattern).map_err(|err| {
            log::error!("Invalid pattern {} for field {}: {}", pattern, self.field_name, err);
            err
        })?;
        Ok(Filter::new(RegexFilter::new(self.field_name, compiled)))
    }

    fn compare(self, value: Value, mode: ComparisonMode) -> Filter {
        Filter::new(ComparisonFilter::new(self.field_name, value, mode))
    }
}

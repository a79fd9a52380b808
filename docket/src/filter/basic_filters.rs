use std::any::Any;
use std::cmp::Ordering;
use std::fmt::Display;

use regex::Regex;

use crate::collection::Document;
use crate::common::Value;
use crate::errors::DocketResult;

use super::FilterProvider;

/// A filter that matches all documents.
pub(crate) struct AllFilter;

impl FilterProvider for AllFilter {
    fn apply(&self, _entry: &Document) -> DocketResult<bool> {
        Ok(true)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Display for AllFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AllFilter")
    }
}

/// Matches documents whose field equals a value.
///
/// A missing field only equals `Value::Null`.
pub(crate) struct EqualsFilter {
    field_name: String,
    field_value: Value,
}

impl EqualsFilter {
    #[inline]
    pub(crate) fn new(field_name: String, field_value: Value) -> Self {
        EqualsFilter {
            field_name,
            field_value,
        }
    }
}

impl Display for EqualsFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({} == {:?})", self.field_name, self.field_value)
    }
}

impl FilterProvider for EqualsFilter {
    #[inline]
    fn apply(&self, entry: &Document) -> DocketResult<bool> {
        let value = entry.get(&self.field_name).unwrap_or(&Value::Null);
        Ok(value == &self.field_value)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub(crate) struct NotEqualsFilter {
    field_name: String,
    field_value: Value,
}

impl NotEqualsFilter {
    #[inline]
    pub(crate) fn new(field_name: String, field_value: Value) -> Self {
        NotEqualsFilter {
            field_name,
            field_value,
        }
    }
}

impl Display for NotEqualsFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({} != {:?})", self.field_name, self.field_value)
    }
}

impl FilterProvider for NotEqualsFilter {
    #[inline]
    fn apply(&self, entry: &Document) -> DocketResult<bool> {
        let value = entry.get(&self.field_name).unwrap_or(&Value::Null);
        Ok(value != &self.field_value)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Relational operator used by [ComparisonFilter].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ComparisonMode {
    Greater,
    GreaterEqual,
    Lesser,
    LesserEqual,
}

impl ComparisonMode {
    fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            ComparisonMode::Greater => ordering == Ordering::Greater,
            ComparisonMode::GreaterEqual => ordering != Ordering::Less,
            ComparisonMode::Lesser => ordering == Ordering::Less,
            ComparisonMode::LesserEqual => ordering != Ordering::Greater,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            ComparisonMode::Greater => ">",
            ComparisonMode::GreaterEqual => ">=",
            ComparisonMode::Lesser => "<",
            ComparisonMode::LesserEqual => "<=",
        }
    }
}

/// Matches documents whose field orders against a value.
///
/// Values of kinds that cannot be ordered against each other never match.
pub(crate) struct ComparisonFilter {
    field_name: String,
    field_value: Value,
    mode: ComparisonMode,
}

impl ComparisonFilter {
    pub(crate) fn new(field_name: String, field_value: Value, mode: ComparisonMode) -> Self {
        ComparisonFilter {
            field_name,
            field_value,
            mode,
        }
    }
}

impl Display for ComparisonFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({} {} {:?})",
            self.field_name,
            self.mode.symbol(),
            self.field_value
        )
    }
}

impl FilterProvider for ComparisonFilter {
    fn apply(&self, entry: &Document) -> DocketResult<bool> {
        Ok(entry
            .get(&self.field_name)
            .and_then(|value| value.compare(&self.field_value))
            .map(|ordering| self.mode.accepts(ordering))
            .unwrap_or(false))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Matches documents whose string field starts with a prefix.
pub(crate) struct StartsWithFilter {
    field_name: String,
    prefix: String,
}

impl StartsWithFilter {
    pub(crate) fn new(field_name: String, prefix: String) -> Self {
        StartsWithFilter { field_name, prefix }
    }
}

impl Display for StartsWithFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({} startsWith {:?})", self.field_name, self.prefix)
    }
}

impl FilterProvider for StartsWithFilter {
    fn apply(&self, entry: &Document) -> DocketResult<bool> {
        Ok(entry
            .get(&self.field_name)
            .and_then(|value| value.as_str())
            .map(|s| s.starts_with(&self.prefix))
            .unwrap_or(false))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Matches documents whose field equals any of the given values.
pub(crate) struct InFilter {
    field_name: String,
    values: Vec<Value>,
}

impl InFilter {
    pub(crate) fn new(field_name: String, values: Vec<Value>) -> Self {
        InFilter { field_name, values }
    }
}

impl Display for InFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({} in {:?})", self.field_name, self.values)
    }
}

impl FilterProvider for InFilter {
    fn apply(&self, entry: &Document) -> DocketResult<bool> {
        Ok(match entry.get(&self.field_name) {
            Some(value) => self.values.contains(value),
            None => false,
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Matches documents where a field path resolves to a non-null value.
pub(crate) struct ExistsFilter {
    field_name: String,
}

impl ExistsFilter {
    pub(crate) fn new(field_name: String) -> Self {
        ExistsFilter { field_name }
    }
}

impl Display for ExistsFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({} exists)", self.field_name)
    }
}

impl FilterProvider for ExistsFilter {
    fn apply(&self, entry: &Document) -> DocketResult<bool> {
        Ok(matches!(entry.get(&self.field_name), Some(v) if !v.is_null()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Matches documents whose string field matches a regular expression.
pub(crate) struct RegexFilter {
    field_name: String,
    pattern: Regex,
}

impl RegexFilter {
    pub(crate) fn new(field_name: String, pattern: Regex) -> Self {
        RegexFilter {
            field_name,
            pattern,
        }
    }
}

impl Display for RegexFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({} =~ /{}/)", self.field_name, self.pattern)
    }
}

impl FilterProvider for RegexFilter {
    fn apply(&self, entry: &Document) -> DocketResult<bool> {
        Ok(entry
            .get(&self.field_name)
            .and_then(|value| value.as_str())
            .map(|s| self.pattern.is_match(s))
            .unwrap_or(false))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

type Predicate = Box<dyn Fn(&Document) -> bool + Send + Sync>;

/// Wraps an arbitrary closure.
pub(crate) struct PredicateFilter {
    description: String,
    predicate: Predicate,
}

impl PredicateFilter {
    pub(crate) fn new<F>(description: String, predicate: F) -> Self
    where
        F: Fn(&Document) -> bool + Send + Sync + 'static,
    {
        PredicateFilter {
            description,
            predicate: Box::new(predicate),
        }
    }
}

impl Display for PredicateFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({})", self.description)
    }
}

impl FilterProvider for PredicateFilter {
    fn apply(&self, entry: &Document) -> DocketResult<bool> {
        Ok((self.predicate)(entry))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

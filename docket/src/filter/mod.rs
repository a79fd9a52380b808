//! Predicates for selecting documents in scans, counts and bulk deletes.
//!
//! Filters are pure functions over a document body. They are built with the
//! fluent API and combined with logical operators:
//!
//! - `field("address.countryRegionName").eq("Germany")` - equality
//! - `field("name").starts_with("Bulk inserted doc")` - prefix match
//! - `field("age").gt(30)` - comparison
//! - `all()` - match every document
//! - `by_id("Andersen.1")` - match one id
//! - `field("a").eq(1).and(field("b").ne(2))` - logical combination
//!
//! Procedures receive filters as [crate::common::Value] descriptions, decoded
//! with [Filter::from_value].
//!
//! # Examples
//!
//! ```rust
//! use docket::doc;
//! use docket::filter::{field, all};
//!
//! let doc = doc! { name: "Bulk inserted doc 3", size: 3 };
//! let filter = field("name").starts_with("Bulk").and(field("size").lte(5));
//! assert!(filter.apply(&doc).unwrap());
//! assert!(all().apply(&doc).unwrap());
//! ```

mod basic_filters;
mod filter;
mod fluent;
mod logical_filters;

pub use basic_filters::*;
pub use filter::*;
pub use fluent::*;
pub use logical_filters::*;

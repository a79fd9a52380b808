//! # Docket - Embedded Document Collections
//!
//! Docket is an in-memory document collection engine with the server-side
//! programming model of a hosted document database: pre- and post-write
//! triggers, stored procedures, resumable scans and budgeted bulk work.
//!
//! ## Key Features
//!
//! - **Documents**: JSON-like bodies keyed by a string `id`, with etags for
//!   optimistic concurrency
//! - **Snapshot scans**: paged queries that resume from a continuation token
//! - **Triggers**: named pre- and post-write hooks, opted into per request
//! - **Stored procedures**: built-in and user-registered, run under the
//!   collection write gate
//! - **Bounded work**: bulk writes and counts that stop at a budget and hand
//!   back how to continue
//! - **Throttling**: an optional per-collection request rate limit and a
//!   retry hook for callers
//!
//! ## Quick Start
//!
//! ```rust
//! use docket::Docket;
//! use docket::collection::RequestOptions;
//! use docket::common::Value;
//! use docket::doc;
//!
//! let db = Docket::builder().open().unwrap();
//! let families = db.collection("families").unwrap();
//!
//! let options = RequestOptions::new()
//!     .pre_trigger_include(vec!["trgEnsureUniqueId"])
//!     .post_trigger_include(vec!["trgUpdateMetadata"]);
//! families
//!     .create_document(doc! { id: "AndersenFamily", lastName: "Andersen" }, &options)
//!     .unwrap();
//!
//! let greeting = families.execute_procedure("spHelloWorld", &[]).unwrap();
//! assert_eq!(greeting, Value::from("Hello, World"));
//! ```
//!
//! ## Module Organization
//!
//! - [`collection`] - Documents, the document store, scans and the collection facade
//! - [`common`] - Values, constants, throttling and retry
//! - [`errors`] - Error types and result definitions
//! - [`filter`] - Document predicates
//! - [`procedure`] - Stored procedures, bulk operations and counting
//! - [`trigger`] - Pre- and post-write triggers

pub mod collection;
pub mod common;
pub mod errors;
pub mod filter;
pub mod procedure;
pub mod trigger;

mod docket;
mod docket_builder;
mod docket_config;

pub use docket::*;
pub use docket_builder::*;
pub use docket_config::*;

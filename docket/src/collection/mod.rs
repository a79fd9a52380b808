//! Documents and the collections that hold them.
//!
//! # Documents
//!
//! A [Document] is an insertion-ordered map of field names to
//! [crate::common::Value]s. Nested fields are reached with dotted paths.
//! Every persisted document carries a string `id` plus the store-assigned
//! system fields `_etag`, `_ts` and `_self`.
//!
//! ```rust
//! use docket::collection::Document;
//!
//! let mut doc = Document::new();
//! doc.put("id", "WakefieldFamily").unwrap();
//! doc.put("address.countryRegionName", "United States").unwrap();
//! assert_eq!(doc.id(), Some("WakefieldFamily"));
//! ```
//!
//! # Storage
//!
//! A [DocumentStore] is the in-memory, snapshot-consistent document map of
//! one collection. Scans run over an immutable snapshot through a
//! [ScanCursor] and hand out [ContinuationToken]s to resume later.
//! [UniqueIdResolver] finds a free id for a document whose id is taken.
//!
//! # Collections
//!
//! A [Collection] is the client-facing facade over a store, its trigger
//! pipeline and its stored procedures, obtained from [crate::Docket].

mod docket_collection;
mod document;
mod document_store;
mod feed_options;
mod request_options;
mod scan_cursor;
mod unique_id;
mod write_result;

pub use docket_collection::*;
pub use document::*;
pub use document_store::*;
pub use feed_options::*;
pub use request_options::*;
pub use scan_cursor::*;
pub use unique_id::*;
pub use write_result::*;

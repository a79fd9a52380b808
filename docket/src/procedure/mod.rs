//! Stored procedures and the bounded-work helpers they are built on.
//!
//! A [StoredProcedure] runs inside a collection with a [ProcedureContext]
//! and returns a single [crate::common::Value]. Long workloads are split into
//! resumable invocations:
//!
//! - [BulkOperationDriver] applies writes in order under a [Budget] and hands
//!   back whatever it did not get to
//! - [CountAggregator] counts at most a fixed number of matches per call and
//!   hands back a continuation token
//!
//! The built-in procedures (`spHelloWorld`, `spSetNorthAmerica`,
//! `spEnsureUniqueId`, `spBulkInsert`, `spBulkDelete`, `spSelectCount`) are
//! registered on every collection unless disabled through
//! [crate::DocketBuilder::register_builtins].

mod builtin;
mod bulk;
mod count;
mod procedure;

pub use builtin::*;
pub use bulk::*;
pub use count::*;
pub use procedure::*;

//! Pre- and post-write hooks.
//!
//! A [Trigger] is a named body bound to a [TriggerType] (before or after the
//! store write) and a [TriggerOperation] (which writes it applies to).
//! Triggers are registered on a collection's [TriggerPipeline] and run only
//! when a request opts into them through
//! [crate::collection::RequestOptions].
//!
//! Two triggers ship with the crate:
//!
//! - [EnsureUniqueIdTrigger] (`trgEnsureUniqueId`): pre-create, rewrites a
//!   taken id to `<id><5 digits>`
//! - [UpdateMetadataTrigger] (`trgUpdateMetadata`): post-create, records the
//!   last created id in the `_metadata` document

mod builtin;
mod pipeline;
mod trigger;

pub use builtin::*;
pub use pipeline::*;
pub use trigger::*;

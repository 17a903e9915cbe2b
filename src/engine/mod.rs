//! Aggregation and reconciliation engine.
//!
//! Raw samples are folded into calendar buckets ([`bucket`], [`aggregate`]),
//! compared against observations already in the catalog ([`existing`],
//! [`reconcile`]), and the resulting creates and updates are sent in bounded
//! batches ([`dispatch`]).

pub mod aggregate;
pub mod bucket;
pub mod dispatch;
pub mod existing;
pub mod reconcile;
pub mod types;

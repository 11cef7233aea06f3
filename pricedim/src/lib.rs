//! Incremental load engine for slowly changing product dimensions.
//!
//! The crate is organized around two cooperating mechanisms: fingerprint
//! based change detection feeding an SCD-2 dimension synchronizer, and a run
//! ledger that gates, brackets and audits every pipeline stage execution.

pub mod concurrency;
pub mod detect;
pub mod error;
pub mod failpoints;
pub mod fingerprint;
pub mod ledger;
mod macros;
pub mod metrics;
pub mod pipeline;
pub mod store;
pub mod sync;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;

//! Raw Postgres queries for the pricedim dimension store and run ledger.
//!
//! SQL lives here so that the core crate only deals in typed operations. All
//! tables reside in the `etl` schema; dimension table names are configured
//! per pipeline and quoted before interpolation.

pub mod dimension;
pub mod ledger;
pub mod types;

//! Storage abstractions for the dimension table and the run ledger.

mod dimension;
mod ledger;
pub mod memory;
pub mod postgres;

pub use dimension::{AttributeColumn, DimensionStore};
pub use ledger::LedgerStore;

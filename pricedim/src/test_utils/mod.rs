//! Testing utilities for the incremental load engine.
//!
//! Provides staged-record builders and pipeline configuration helpers so
//! tests can exercise synchronization and ledger behavior against the
//! in-memory store without touching a database, plus failpoint scenario
//! management for fault-injection tests.

#[cfg(feature = "failpoints")]
pub mod failpoints;
pub mod record;

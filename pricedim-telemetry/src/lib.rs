//! Telemetry initialization for pricedim binaries and tests.

pub mod tracing;

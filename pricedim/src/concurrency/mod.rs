//! Concurrency primitives shared by the pipeline driver.

pub mod shutdown;

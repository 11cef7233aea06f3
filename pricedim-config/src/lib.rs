//! Configuration loading and shared settings for the pricedim pipeline.
//!
//! Connection credentials are always injected through configuration files or
//! environment variables; no crate in this workspace embeds connection
//! literals.

mod load;
pub mod shared;

pub use load::{Config, Environment, LoadConfigError, load_config};

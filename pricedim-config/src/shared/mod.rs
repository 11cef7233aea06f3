//! Shared configuration types for the pricedim pipeline.

mod connection;
mod pipeline;

pub use connection::{
    DIMENSION_STORE_OPTIONS, IntoConnectOptions, PgConnectionConfig, PgConnectionOptions,
    RUN_LEDGER_OPTIONS, TlsConfig,
};
pub use pipeline::{
    NormalizationErrorPolicy, PipelineConfig, PipelineId, SyncMode, ValidationError,
};

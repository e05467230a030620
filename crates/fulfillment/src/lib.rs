//! Order fulfillment pipeline for per-site imagery orders.
//!
//! Resolves an order's status, fetches its result artifacts, summarizes each
//! surface reflectance clip into a statistics row, and publishes the raw clips
//! and the site's summary table to object storage.
//!
//! # Architecture
//!
//! - [`OrderStatusClient`]: order state and result listing
//! - [`ArtifactFetcher`]: idempotent, retrying, integrity-checked downloads
//! - [`SummaryTable`]: append-only CSV with durable per-row writes
//! - [`Publisher`]: uploads with public read and deterministic URLs
//! - [`Pipeline`]: wires the above together for one invocation
//! - [`write_rollup`]: cross-site table over many invocations' outputs

pub mod config;
pub mod error;
pub mod fetch;
pub mod metrics;
pub mod order;
pub mod pipeline;
pub mod publish;
pub mod rollup;
pub mod table;

// Re-exports
pub use config::{FetchSettings, PipelineConfig, DEFAULT_PROVIDER, DEFAULT_RASTER_SUFFIX};
pub use error::{ConfigError, ConfigResult};
pub use fetch::{ArtifactFetcher, FetchConfig, FetchReport, FetchedArtifact};
pub use order::{OrderStatus, OrderStatusClient};
pub use pipeline::{build_http_client, Pipeline, RunReport};
pub use publish::Publisher;
pub use rollup::{render_rollup, write_rollup, RollupReport, ROLLUP_HEADER};
pub use table::SummaryTable;

//! # Gramline Runtime
//!
//! Orchestration layer of the Gramline bot API client.
//!
//! - **Polling**: [`PollingLoop`] long-polls `getUpdates`, routes each batch
//!   in order and tracks the acknowledgment offset
//! - **Recovery**: [`Backoff`] spaces out retries; [`ReportingApi`] turns
//!   retry hints into `rate_limit` events
//! - **Client**: [`Client`] wires the bus, transport, router and loop
//! - **Configuration**: layered figment loading ([`config`])
//! - **Logging**: tracing-subscriber setup ([`logging`])
//!
//! ```rust,ignore
//! use gramline_runtime::Client;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // gramline.toml, GRAMLINE_BOT__TOKEN, ...
//!     let client = Client::load()?;
//!     let _log = client.on("update", |event| {
//!         if let Some(ctx) = event.context() {
//!             tracing::info!(update_id = ctx.update_id(), "update");
//!         }
//!     });
//!     client.run_until_ctrl_c().await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod backoff;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod polling;

pub use api::ReportingApi;
pub use backoff::Backoff;
pub use client::{Client, ClientBuilder};
pub use config::{ConfigError, ConfigLoader, ConfigResult, GramlineConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use polling::{PollOutcome, PollingLoop, PollingOptions};

/// Prelude for common imports.
pub mod prelude {
    pub use super::client::{Client, ClientBuilder};
    pub use super::config::{ConfigLoader, GramlineConfig};
    pub use super::error::{RuntimeError, RuntimeResult};
    pub use super::polling::PollingOptions;
}

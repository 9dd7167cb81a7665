//! # Gramline
//!
//! An event-driven client for the Telegram Bot API.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌─────────────┐   ┌─────────────┐   ┌──────────────────────────┐
//! │ Transport  │──▶│ PollingLoop │──▶│ EventRouter │──▶│ EventBus                 │
//! │ (HTTP,     │   │ (offset,    │   │ (variant,   │   │ ├─ app listeners         │
//! │ multipart) │   │  backoff)   │   │  sub-events)│   │ └─ collectors (bounded)  │
//! └────────────┘   └─────────────┘   └─────────────┘   └──────────────────────────┘
//! ```
//!
//! - **Transport**: one `request(method, params)` call; JSON or multipart
//!   bodies, envelope decoding
//! - **Polling**: ordered batches, offset bookkeeping, rate-limit aware retries
//! - **Routing**: `update`, then `<variant>`, `<variant>:<field>` and
//!   `reply_message`
//! - **Collectors**: time, idle and count limited subscriptions that clean up
//!   after themselves
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gramline::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = Client::new(std::env::var("BOT_TOKEN")?)?;
//!
//!     let _echo = client.on_async("message:text", |event| async move {
//!         if let Some(ctx) = event.context() {
//!             let _ = ctx.reply(ctx.text().unwrap_or_default()).await;
//!         }
//!     });
//!
//!     client.run_until_ctrl_c().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: TOML configuration files
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use gramline_core as core;
pub use gramline_framework as framework;
pub use gramline_runtime as runtime;
pub use gramline_transport as transport;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use gramline::prelude::*;
/// ```
pub mod prelude {
    // Client - main entry point
    pub use gramline_runtime::{Client, ClientBuilder, GramlineConfig, PollingOptions};

    // Events and context
    pub use gramline_core::{
        ApiClient, ApiClientExt, ApiError, BotEvent, BoxedApi, Context, EventBus, InputFile,
        InputMedia, Params, Subscription, Update, UpdateTag,
    };

    // Collectors
    pub use gramline_framework::{
        CollectorOptions, EndReason, InlineKeyboardCollector, MessageCollector, ReactionCollector,
    };
}

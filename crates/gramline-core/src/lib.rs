//! # Gramline Core
//!
//! Foundation types for the Gramline bot API client.
//!
//! - **Update model**: a closed, typed decode of the update stream
//!   ([`Update`], [`UpdateKind`], [`UpdateTag`])
//! - **Events**: names and payloads emitted while routing ([`BotEvent`])
//! - **Subscription broker**: the shared listener registry ([`EventBus`],
//!   [`Subscription`])
//! - **Context**: an update composed with the client that can act on it
//!   ([`Context`])
//! - **Transport contract**: the single call every API method funnels into
//!   ([`ApiClient`], [`Params`], [`InputFile`])
//!
//! ## Data Flow
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌──────────────┐   ┌─────────────────────┐
//! │ ApiClient │──▶│ PollingLoop  │──▶│ EventRouter  │──▶│ EventBus listeners  │
//! │(transport)│   │  (runtime)   │   │ (framework)  │   │ (app code, collectors)│
//! └───────────┘   └──────────────┘   └──────────────┘   └─────────────────────┘
//! ```

pub mod api;
pub mod bus;
pub mod context;
pub mod error;
pub mod event;
pub mod model;
pub mod params;

pub use api::{ApiClient, ApiClientExt, BoxedApi};
pub use bus::{EventBus, Listener, Subscription};
pub use context::Context;
pub use error::{ApiError, ApiResult, DecodeError, TransportError, TransportResult};
pub use event::{BotEvent, RateLimitSignal, sub_event_name};
pub use model::{Update, UpdateKind, UpdateTag};
pub use params::{InputFile, InputMedia, ParamValue, Params};

/// Prelude for common imports.
pub mod prelude {
    pub use super::api::{ApiClient, ApiClientExt, BoxedApi};
    pub use super::bus::{EventBus, Subscription};
    pub use super::context::Context;
    pub use super::error::{ApiError, ApiResult};
    pub use super::event::BotEvent;
    pub use super::model::*;
    pub use super::params::{InputFile, InputMedia, Params};
}

//! # Gramline Framework
//!
//! Everything between a decoded update and application code.
//!
//! - **Routing**: [`EventRouter`] fans each update out as a canonical event,
//!   its sub-events and `reply_message`, synchronously and in order.
//! - **Collectors**: [`Collector`] gathers matching items for a bounded time
//!   or count, then releases its subscriptions. Ready-made specializations
//!   cover messages, reactions and inline keyboard presses.
//!
//! ```rust,ignore
//! use gramline_framework::{CollectorOptions, MessageCollector};
//!
//! let collector = MessageCollector::in_chat(
//!     &bus,
//!     chat_id,
//!     CollectorOptions::builder()
//!         .max(3)
//!         .time(Duration::from_secs(30))
//!         .build()?,
//! )?;
//! let (reason, messages) = collector.wait().await;
//! ```

pub mod collector;
pub mod error;
pub mod router;

#[cfg(test)]
pub(crate) mod testing;

pub use collector::{
    CollectFilter, Collected, Collector, CollectorOptions, CollectorOptionsBuilder,
    CollectorSource, EndReason, InlineKeyboardCollector, InlineKeyboardSource, ItemStream,
    MessageCollector, MessageSource, ReactionCollector, ReactionSource,
};
pub use error::{CollectorError, CollectorResult};
pub use router::{EventRouter, Routed};

/// Prelude for common imports.
pub mod prelude {
    pub use super::collector::{
        Collector, CollectorOptions, CollectorSource, EndReason, InlineKeyboardCollector,
        MessageCollector, ReactionCollector,
    };
    pub use super::router::EventRouter;
}

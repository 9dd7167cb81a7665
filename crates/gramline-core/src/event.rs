//! Event names and payloads emitted on the [`EventBus`](crate::EventBus).
//!
//! | Name | Payload | Emitted by |
//! |------|---------|------------|
//! | `ready` | [`BotEvent::Ready`] | client, after `getMe` |
//! | `update` | [`BotEvent::Update`] | router, for every update |
//! | `<variant>` | [`BotEvent::Update`] | router, canonical event |
//! | `<variant>:<field>` | [`BotEvent::Update`] | router, per present sub-field |
//! | `reply_message` | [`BotEvent::Update`] | router, message-like replies |
//! | `rate_limit` | [`BotEvent::RateLimit`] | transport wrapper |
//! | `error` | [`BotEvent::Error`] | polling loop, recoverable errors |
//! | `disconnect` | [`BotEvent::Disconnect`] | client, when polling stops |

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde_json::Value;

use crate::context::Context;
use crate::error::ApiError;
use crate::model::{UpdateTag, User};

pub const READY: &str = "ready";
pub const UPDATE: &str = "update";
pub const RATE_LIMIT: &str = "rate_limit";
pub const DISCONNECT: &str = "disconnect";
pub const ERROR: &str = "error";
pub const REPLY_MESSAGE: &str = "reply_message";

/// Returns the `<variant>:<field>` name of a sub-event.
pub fn sub_event_name(tag: UpdateTag, field: &str) -> String {
    format!("{}:{}", tag.field_name(), field)
}

/// A soft rate-limit report: the platform asked us to slow down.
///
/// Reporting does not pause anything by itself.
#[derive(Debug, Clone)]
pub struct RateLimitSignal {
    /// The API method that was throttled.
    pub method: String,
    /// When the throttled response was received.
    pub timestamp: SystemTime,
    /// How long the platform asked us to wait.
    pub retry_after: Duration,
    /// The parameters of the throttled call, JSON fields only.
    pub parameters: Value,
}

impl RateLimitSignal {
    /// Builds a signal from an error, if it carries a retry hint.
    pub fn from_error(method: &str, error: &ApiError, parameters: Value) -> Option<Self> {
        error.retry_after().map(|retry_after| Self {
            method: method.to_string(),
            timestamp: SystemTime::now(),
            retry_after,
            parameters,
        })
    }
}

/// Payload of an emitted event.
#[derive(Debug, Clone)]
pub enum BotEvent {
    /// The bot is authenticated and about to start polling.
    Ready(Arc<User>),
    /// An update, or a narrower view of one.
    Update(Context),
    /// The platform throttled a call.
    RateLimit(RateLimitSignal),
    /// A recoverable error occurred while polling.
    Error(Arc<ApiError>),
    /// Polling stopped.
    Disconnect,
}

impl BotEvent {
    /// Returns the update context for update events.
    pub fn context(&self) -> Option<&Context> {
        match self {
            Self::Update(ctx) => Some(ctx),
            _ => None,
        }
    }
}

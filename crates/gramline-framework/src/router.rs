//! Update routing.
//!
//! The [`EventRouter`] turns one decoded [`Update`] into a fixed sequence of
//! bus emissions:
//!
//! ```text
//! update ──▶ "update"
//!        ──▶ "<variant>"                 canonical, always
//!        ──▶ "<variant>:<field>" ...     one per present declared sub-field
//!        ──▶ "reply_message"             message-like replies only
//! ```
//!
//! Emission is synchronous and depth-first: every listener of one name runs
//! before the next name is emitted, and `route` returns only after the last
//! one. The polling loop therefore never starts the next update while
//! listeners of the previous one are still running (async listeners excepted,
//! see [`EventBus::on_async`]).

use std::sync::Arc;

use serde_json::Value;
use tracing::{Level, span, trace};

use gramline_core::event::{REPLY_MESSAGE, UPDATE};
use gramline_core::{
    BotEvent, BoxedApi, Context, DecodeError, EventBus, Update, UpdateTag, sub_event_name,
};

/// What routing one update emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routed {
    /// The update's variant.
    pub tag: UpdateTag,
    /// Canonical, sub-event and `reply_message` names, in emission order.
    pub events: Vec<String>,
}

/// Fans decoded updates out to bus listeners.
#[derive(Clone)]
pub struct EventRouter {
    bus: EventBus,
    api: BoxedApi,
}

impl EventRouter {
    /// Creates a router emitting on `bus`; contexts act through `api`.
    pub fn new(bus: EventBus, api: BoxedApi) -> Self {
        Self { bus, api }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn api(&self) -> &BoxedApi {
        &self.api
    }

    /// Routes one update.
    pub fn route(&self, update: Update) -> Routed {
        let tag = update.tag();
        let span = span!(Level::DEBUG, "route", update_id = update.update_id, tag = %tag);
        let _enter = span.enter();

        let sub_fields: Vec<&'static str> = update.present_sub_fields().collect();
        let is_reply =
            tag.is_message_like() && update.message().is_some_and(|m| m.is_reply());

        let event = BotEvent::Update(Context::new(Arc::new(update), Arc::clone(&self.api)));
        self.emit(UPDATE, &event);

        let mut events = Vec::with_capacity(sub_fields.len() + 2);
        events.push(tag.field_name().to_string());
        events.extend(sub_fields.into_iter().map(|field| sub_event_name(tag, field)));
        if is_reply {
            events.push(REPLY_MESSAGE.to_string());
        }

        for name in &events {
            self.emit(name, &event);
        }
        Routed { tag, events }
    }

    /// Decodes and routes one raw update object.
    ///
    /// # Errors
    /// Returns the [`DecodeError`] when the object is not a known update;
    /// nothing is emitted in that case.
    pub fn route_value(&self, value: Value) -> Result<Routed, DecodeError> {
        Update::from_value(value).map(|update| self.route(update))
    }

    fn emit(&self, name: &str, event: &BotEvent) {
        let listeners = self.bus.emit(name, event);
        trace!(event = name, listeners, "Emitted");
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::NoopApi;
    use parking_lot::Mutex;
    use serde_json::json;

    const WATCHED: &[&str] = &[
        "update",
        "message",
        "message:text",
        "message:caption",
        "message:photo",
        "callback_query",
        "callback_query:data",
        "callback_query:game_short_name",
        "reply_message",
    ];

    fn recording_router() -> (EventRouter, Arc<Mutex<Vec<String>>>, Vec<gramline_core::Subscription>) {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let tokens = WATCHED
            .iter()
            .map(|name| {
                let log = Arc::clone(&log);
                let name = name.to_string();
                bus.on(name.clone(), move |_| log.lock().push(name.clone()))
            })
            .collect();
        (EventRouter::new(bus, Arc::new(NoopApi)), log, tokens)
    }

    #[test]
    fn test_emission_order_for_mixed_batch() {
        let (router, log, _tokens) = recording_router();

        let batch = [
            json!({"update_id": 1, "message": {"chat": {"id": 9}, "text": "a"}}),
            json!({"update_id": 2, "message": {"chat": {"id": 9}, "caption": "b"}}),
            json!({"update_id": 3, "callback_query": {"id": "q1", "data": "x"}}),
        ];
        for raw in batch {
            router.route_value(raw).unwrap();
        }

        let emitted: Vec<String> = log
            .lock()
            .iter()
            .filter(|name| name.as_str() != "update")
            .cloned()
            .collect();
        assert_eq!(
            emitted,
            vec![
                "message",
                "message:text",
                "message",
                "message:caption",
                "callback_query",
                "callback_query:data",
            ]
        );
    }

    #[test]
    fn test_update_event_precedes_canonical() {
        let (router, log, _tokens) = recording_router();
        let routed = tokio_test::assert_ok!(router.route_value(
            json!({"update_id": 5, "message": {"chat": {"id": 1}, "text": "hi"}})
        ));

        assert_eq!(routed.tag, UpdateTag::Message);
        assert_eq!(routed.events, vec!["message", "message:text"]);
        assert_eq!(*log.lock(), vec!["update", "message", "message:text"]);
    }

    #[test]
    fn test_caption_only_never_emits_text() {
        let (router, log, _tokens) = recording_router();
        router
            .route_value(json!({
                "update_id": 7,
                "message": {"chat": {"id": 1}, "caption": "c", "photo": [{"file_id": "p"}]}
            }))
            .unwrap();

        let log = log.lock();
        assert!(log.contains(&"message:caption".to_string()));
        assert!(log.contains(&"message:photo".to_string()));
        assert!(!log.contains(&"message:text".to_string()));
    }

    #[test]
    fn test_reply_message_follows_sub_events() {
        let (router, _log, _tokens) = recording_router();
        let routed = router
            .route_value(json!({
                "update_id": 8,
                "message": {
                    "chat": {"id": 1},
                    "text": "yes",
                    "reply_to_message": {"message_id": 3, "chat": {"id": 1}, "text": "?"}
                }
            }))
            .unwrap();
        assert_eq!(
            routed.events,
            vec!["message", "message:text", "reply_message"]
        );
    }

    #[test]
    fn test_listener_sees_typed_context() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = Arc::clone(&seen);
        let _token = bus.on("callback_query:data", move |event| {
            let ctx = event.context().unwrap();
            *seen_clone.lock() = ctx.callback_query().and_then(|q| q.data.clone());
        });

        let router = EventRouter::new(bus, Arc::new(NoopApi));
        router
            .route_value(json!({"update_id": 1, "callback_query": {"id": "q", "data": "pressed"}}))
            .unwrap();
        assert_eq!(seen.lock().as_deref(), Some("pressed"));
    }

    #[test]
    fn test_unknown_variant_emits_nothing() {
        let (router, log, _tokens) = recording_router();
        let err = router
            .route_value(json!({"update_id": 9, "business_message": {}}))
            .unwrap_err();
        assert!(matches!(err, DecodeError::UnknownVariant { update_id: 9 }));
        assert!(log.lock().is_empty());
    }
}

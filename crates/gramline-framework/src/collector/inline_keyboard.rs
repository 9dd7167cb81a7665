//! Inline keyboard collector.

use gramline_core::{BotEvent, Context, EventBus};

use super::{Collector, CollectorOptions, CollectorSource};
use crate::error::CollectorResult;

/// Collects inline keyboard button presses, keyed by callback query id.
///
/// Presses from any chat are collected unless the source is restricted to
/// the keyboard of one message.
#[derive(Debug, Clone, Default)]
pub struct InlineKeyboardSource {
    message_id: Option<i64>,
}

impl InlineKeyboardSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the source to presses on the keyboard of one message.
    pub fn on_message(mut self, message_id: i64) -> Self {
        self.message_id = Some(message_id);
        self
    }

    pub fn message_id(&self) -> Option<i64> {
        self.message_id
    }
}

impl CollectorSource for InlineKeyboardSource {
    type Key = String;
    type Value = Context;

    fn collect_events(&self) -> &'static [&'static str] {
        &["callback_query"]
    }

    fn collect(&self, event: &BotEvent) -> Option<(String, Context)> {
        let ctx = event.context()?;
        let query = ctx.callback_query()?;
        if let Some(expected) = self.message_id {
            let pressed_on = query.message.as_ref().map(|m| m.message_id);
            if pressed_on != Some(expected) {
                return None;
            }
        }
        Some((query.id.clone(), ctx.clone()))
    }
}

/// A collector of inline keyboard presses.
pub type InlineKeyboardCollector = Collector<InlineKeyboardSource>;

impl Collector<InlineKeyboardSource> {
    /// Starts collecting presses, on the keyboard of `message_id` only if
    /// given.
    pub fn for_keyboard(
        bus: &EventBus,
        message_id: Option<i64>,
        options: CollectorOptions<String, Context>,
    ) -> CollectorResult<Self> {
        let source = match message_id {
            Some(message_id) => InlineKeyboardSource::new().on_message(message_id),
            None => InlineKeyboardSource::new(),
        };
        Self::start(bus, source, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::emit;
    use futures::StreamExt;
    use serde_json::{Value, json};

    fn press(update_id: i64, id: &str, message_id: i64, data: &str) -> Value {
        json!({
            "update_id": update_id,
            "callback_query": {
                "id": id,
                "from": {"id": 1},
                "message": {"message_id": message_id, "chat": {"id": 9}},
                "data": data
            }
        })
    }

    #[tokio::test]
    async fn test_collects_presses_by_query_id() {
        let bus = EventBus::new();
        let collector =
            InlineKeyboardCollector::for_keyboard(&bus, None, CollectorOptions::builder().build().unwrap())
                .unwrap();

        emit(&bus, "callback_query", press(1, "q1", 10, "yes"));
        emit(&bus, "callback_query", press(2, "q2", 11, "no"));

        let collected = collector.collected();
        assert_eq!(collected.len(), 2);
        let data = collected["q2"].callback_query().and_then(|q| q.data.as_deref());
        assert_eq!(data, Some("no"));
        collector.stop();
    }

    #[tokio::test]
    async fn test_restricted_to_one_keyboard() {
        let bus = EventBus::new();
        let collector = InlineKeyboardCollector::for_keyboard(
            &bus,
            Some(10),
            CollectorOptions::builder()
                .filter(|ctx: &Context, _| {
                    ctx.callback_query().and_then(|q| q.data.as_deref()) == Some("yes")
                })
                .build()
                .unwrap(),
        )
        .unwrap();

        let mut presses = collector.stream();
        emit(&bus, "callback_query", press(1, "q1", 11, "yes"));
        emit(&bus, "callback_query", press(2, "q2", 10, "no"));
        emit(&bus, "callback_query", press(3, "q3", 10, "yes"));
        collector.stop();

        let keys: Vec<String> = presses.by_ref().map(|(key, _)| key).collect().await;
        assert_eq!(keys, vec!["q3"]);
        assert_eq!(collector.processed(), 2);
    }
}

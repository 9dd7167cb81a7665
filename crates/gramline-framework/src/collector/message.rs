//! Message collector.

use gramline_core::{BotEvent, Context, EventBus};

use super::{Collector, CollectorOptions, CollectorSource};
use crate::error::CollectorResult;

/// Collects messages and channel posts of one chat, keyed by message id.
///
/// With disposal enabled, an edit of a collected message removes it.
#[derive(Debug, Clone)]
pub struct MessageSource {
    chat_id: i64,
}

impl MessageSource {
    pub fn new(chat_id: i64) -> Self {
        Self { chat_id }
    }

    pub fn chat_id(&self) -> i64 {
        self.chat_id
    }

    fn in_chat<'a>(&self, event: &'a BotEvent) -> Option<&'a Context> {
        event
            .context()
            .filter(|ctx| ctx.message().is_some_and(|m| m.chat.id == self.chat_id))
    }
}

impl CollectorSource for MessageSource {
    type Key = i64;
    type Value = Context;

    fn collect_events(&self) -> &'static [&'static str] {
        &["message", "channel_post"]
    }

    fn dispose_events(&self) -> &'static [&'static str] {
        &["edited_message", "edited_channel_post"]
    }

    fn collect(&self, event: &BotEvent) -> Option<(i64, Context)> {
        let ctx = self.in_chat(event)?;
        Some((ctx.message()?.message_id, ctx.clone()))
    }

    fn dispose(&self, event: &BotEvent) -> Option<i64> {
        self.in_chat(event)?.message().map(|m| m.message_id)
    }
}

/// A collector of one chat's messages.
pub type MessageCollector = Collector<MessageSource>;

impl Collector<MessageSource> {
    /// Starts collecting messages of `chat_id`.
    pub fn in_chat(
        bus: &EventBus,
        chat_id: i64,
        options: CollectorOptions<i64, Context>,
    ) -> CollectorResult<Self> {
        Self::start(bus, MessageSource::new(chat_id), options)
    }

    pub fn chat_id(&self) -> i64 {
        self.source().chat_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::EndReason;
    use crate::testing::emit;
    use serde_json::{Value, json};

    fn message(update_id: i64, chat: i64, message_id: i64, text: &str) -> Value {
        json!({
            "update_id": update_id,
            "message": {"message_id": message_id, "chat": {"id": chat}, "text": text}
        })
    }

    #[tokio::test]
    async fn test_collects_only_its_chat() {
        let bus = EventBus::new();
        let collector = MessageCollector::in_chat(
            &bus,
            9,
            CollectorOptions::builder().max(2).build().unwrap(),
        )
        .unwrap();

        emit(&bus, "message", message(1, 9, 10, "a"));
        emit(&bus, "message", message(2, 7, 11, "elsewhere"));
        assert_eq!(collector.processed(), 1);

        emit(
            &bus,
            "channel_post",
            json!({"update_id": 3, "channel_post": {"message_id": 12, "chat": {"id": 9}, "text": "b"}}),
        );

        let (reason, collected) = collector.wait().await;
        assert_eq!(reason, EndReason::Limit);
        let texts: Vec<_> = collected.values().filter_map(|ctx| ctx.text()).collect();
        assert_eq!(texts, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_edit_disposes_when_enabled() {
        let bus = EventBus::new();
        let collector = MessageCollector::in_chat(
            &bus,
            9,
            CollectorOptions::builder().dispose(true).build().unwrap(),
        )
        .unwrap();

        emit(&bus, "message", message(1, 9, 10, "a"));
        emit(
            &bus,
            "edited_message",
            json!({"update_id": 2, "edited_message": {"message_id": 10, "chat": {"id": 9}, "text": "a!"}}),
        );
        assert!(collector.is_empty());
        assert_eq!(collector.chat_id(), 9);
    }

    #[tokio::test]
    async fn test_filter_by_author() {
        let bus = EventBus::new();
        let collector = MessageCollector::in_chat(
            &bus,
            9,
            CollectorOptions::builder()
                .filter(|ctx: &Context, _| ctx.from_id() == Some(5))
                .build()
                .unwrap(),
        )
        .unwrap();

        emit(
            &bus,
            "message",
            json!({"update_id": 1, "message": {"message_id": 1, "chat": {"id": 9}, "from": {"id": 5}, "text": "mine"}}),
        );
        emit(
            &bus,
            "message",
            json!({"update_id": 2, "message": {"message_id": 2, "chat": {"id": 9}, "from": {"id": 6}, "text": "theirs"}}),
        );

        assert_eq!(collector.len(), 1);
        assert_eq!(collector.processed(), 2);
        collector.stop();
    }
}

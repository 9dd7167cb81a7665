//! Reaction collector.

use std::collections::HashMap;

use parking_lot::Mutex;

use gramline_core::{BotEvent, Context, EventBus};

use super::{Collector, CollectorOptions, CollectorSource};
use crate::error::CollectorResult;

/// Collects reaction changes in one chat, optionally on one message.
///
/// Items are keyed by the reaction they are about: the emoji, or the custom
/// emoji id, of the first new reaction, falling back to the first removed
/// one. Accepted items are also indexed by who reacted.
#[derive(Debug)]
pub struct ReactionSource {
    chat_id: i64,
    message_id: Option<i64>,
    users: Mutex<HashMap<i64, Vec<Context>>>,
}

impl ReactionSource {
    pub fn new(chat_id: i64) -> Self {
        Self {
            chat_id,
            message_id: None,
            users: Mutex::new(HashMap::new()),
        }
    }

    /// Restricts the source to reactions on one message.
    pub fn on_message(mut self, message_id: i64) -> Self {
        self.message_id = Some(message_id);
        self
    }

    pub fn chat_id(&self) -> i64 {
        self.chat_id
    }

    pub fn message_id(&self) -> Option<i64> {
        self.message_id
    }

    /// Accepted reaction updates by user (or anonymous actor chat) id.
    pub fn users(&self) -> HashMap<i64, Vec<Context>> {
        self.users.lock().clone()
    }
}

impl CollectorSource for ReactionSource {
    type Key = String;
    type Value = Context;

    fn collect_events(&self) -> &'static [&'static str] {
        &["message_reaction"]
    }

    fn collect(&self, event: &BotEvent) -> Option<(String, Context)> {
        let ctx = event.context()?;
        let reaction = ctx.reaction()?;
        if reaction.chat.id != self.chat_id {
            return None;
        }
        if self.message_id.is_some_and(|id| id != reaction.message_id) {
            return None;
        }
        let key = reaction.primary_reaction()?.key().to_string();
        Some((key, ctx.clone()))
    }

    fn accepted(&self, _key: &String, value: &Context) {
        if let Some(actor) = value.reaction().and_then(|r| r.actor_id()) {
            self.users
                .lock()
                .entry(actor)
                .or_default()
                .push(value.clone());
        }
    }
}

/// A collector of reactions in one chat.
pub type ReactionCollector = Collector<ReactionSource>;

impl Collector<ReactionSource> {
    /// Starts collecting reactions in `chat_id`, on `message_id` only if given.
    pub fn in_chat(
        bus: &EventBus,
        chat_id: i64,
        message_id: Option<i64>,
        options: CollectorOptions<String, Context>,
    ) -> CollectorResult<Self> {
        let source = match message_id {
            Some(message_id) => ReactionSource::new(chat_id).on_message(message_id),
            None => ReactionSource::new(chat_id),
        };
        Self::start(bus, source, options)
    }

    /// Accepted reaction updates by user (or anonymous actor chat) id.
    pub fn users(&self) -> HashMap<i64, Vec<Context>> {
        self.source().users()
    }
}

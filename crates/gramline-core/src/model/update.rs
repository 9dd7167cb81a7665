//! Updates and the discriminated-union decoder.
//!
//! An update is a JSON object carrying an `update_id` and exactly one variant
//! field. Decoding walks the static [`UpdateTag::ALL`] table (never the
//! object's own keys), so the set of recognised variants is closed and the
//! resulting [`UpdateKind`] is exhaustive.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use super::chat::{ChatJoinRequest, ChatMemberUpdated};
use super::message::Message;
use super::poll::{Poll, PollAnswer};
use super::query::{CallbackQuery, ChosenInlineResult, InlineQuery, PreCheckoutQuery, ShippingQuery};
use super::reaction::{MessageReactionCountUpdated, MessageReactionUpdated};
use crate::error::DecodeError;

// =============================================================================
// UpdateTag
// =============================================================================

/// Fieldless discriminant of an update's variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateTag {
    Message,
    EditedMessage,
    ChannelPost,
    EditedChannelPost,
    InlineQuery,
    ChosenInlineResult,
    CallbackQuery,
    ShippingQuery,
    PreCheckoutQuery,
    Poll,
    PollAnswer,
    MyChatMember,
    ChatMember,
    ChatJoinRequest,
    MessageReaction,
    MessageReactionCount,
}

/// Optional sub-fields declared by message-like variants.
const MESSAGE_SUB_FIELDS: &[&str] = &[
    "text",
    "caption",
    "photo",
    "video",
    "audio",
    "document",
    "animation",
    "sticker",
    "voice",
    "video_note",
    "contact",
    "location",
    "venue",
    "dice",
    "poll",
    "new_chat_members",
    "left_chat_member",
    "pinned_message",
];

impl UpdateTag {
    /// Every variant, in decode priority order.
    pub const ALL: [UpdateTag; 16] = [
        Self::Message,
        Self::EditedMessage,
        Self::ChannelPost,
        Self::EditedChannelPost,
        Self::InlineQuery,
        Self::ChosenInlineResult,
        Self::CallbackQuery,
        Self::ShippingQuery,
        Self::PreCheckoutQuery,
        Self::Poll,
        Self::PollAnswer,
        Self::MyChatMember,
        Self::ChatMember,
        Self::ChatJoinRequest,
        Self::MessageReaction,
        Self::MessageReactionCount,
    ];

    /// The wire field carrying this variant, which is also its canonical
    /// event name.
    pub const fn field_name(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::EditedMessage => "edited_message",
            Self::ChannelPost => "channel_post",
            Self::EditedChannelPost => "edited_channel_post",
            Self::InlineQuery => "inline_query",
            Self::ChosenInlineResult => "chosen_inline_result",
            Self::CallbackQuery => "callback_query",
            Self::ShippingQuery => "shipping_query",
            Self::PreCheckoutQuery => "pre_checkout_query",
            Self::Poll => "poll",
            Self::PollAnswer => "poll_answer",
            Self::MyChatMember => "my_chat_member",
            Self::ChatMember => "chat_member",
            Self::ChatJoinRequest => "chat_join_request",
            Self::MessageReaction => "message_reaction",
            Self::MessageReactionCount => "message_reaction_count",
        }
    }

    /// Looks a tag up by its wire field name.
    pub fn from_field(field: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.field_name() == field)
    }

    /// Optional sub-fields that produce `<variant>:<field>` sub-events.
    pub const fn sub_fields(self) -> &'static [&'static str] {
        match self {
            Self::Message | Self::EditedMessage | Self::ChannelPost | Self::EditedChannelPost => {
                MESSAGE_SUB_FIELDS
            }
            Self::CallbackQuery => &["data", "game_short_name"],
            Self::InlineQuery => &["location"],
            Self::ChosenInlineResult => &["inline_message_id", "location"],
            Self::PollAnswer => &["user", "voter_chat"],
            Self::MessageReaction => &["user", "actor_chat"],
            Self::MyChatMember | Self::ChatMember => &["invite_link"],
            Self::ShippingQuery
            | Self::PreCheckoutQuery
            | Self::Poll
            | Self::ChatJoinRequest
            | Self::MessageReactionCount => &[],
        }
    }

    /// Returns `true` for variants whose payload is a [`Message`].
    pub const fn is_message_like(self) -> bool {
        matches!(
            self,
            Self::Message | Self::EditedMessage | Self::ChannelPost | Self::EditedChannelPost
        )
    }
}

impl std::fmt::Display for UpdateTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.field_name())
    }
}

// =============================================================================
// UpdateKind
// =============================================================================

/// The typed payload of an update.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateKind {
    Message(Message),
    EditedMessage(Message),
    ChannelPost(Message),
    EditedChannelPost(Message),
    InlineQuery(InlineQuery),
    ChosenInlineResult(ChosenInlineResult),
    CallbackQuery(CallbackQuery),
    ShippingQuery(ShippingQuery),
    PreCheckoutQuery(PreCheckoutQuery),
    Poll(Poll),
    PollAnswer(PollAnswer),
    MyChatMember(ChatMemberUpdated),
    ChatMember(ChatMemberUpdated),
    ChatJoinRequest(ChatJoinRequest),
    MessageReaction(MessageReactionUpdated),
    MessageReactionCount(MessageReactionCountUpdated),
}

impl UpdateKind {
    /// Returns the discriminant.
    pub fn tag(&self) -> UpdateTag {
        match self {
            Self::Message(_) => UpdateTag::Message,
            Self::EditedMessage(_) => UpdateTag::EditedMessage,
            Self::ChannelPost(_) => UpdateTag::ChannelPost,
            Self::EditedChannelPost(_) => UpdateTag::EditedChannelPost,
            Self::InlineQuery(_) => UpdateTag::InlineQuery,
            Self::ChosenInlineResult(_) => UpdateTag::ChosenInlineResult,
            Self::CallbackQuery(_) => UpdateTag::CallbackQuery,
            Self::ShippingQuery(_) => UpdateTag::ShippingQuery,
            Self::PreCheckoutQuery(_) => UpdateTag::PreCheckoutQuery,
            Self::Poll(_) => UpdateTag::Poll,
            Self::PollAnswer(_) => UpdateTag::PollAnswer,
            Self::MyChatMember(_) => UpdateTag::MyChatMember,
            Self::ChatMember(_) => UpdateTag::ChatMember,
            Self::ChatJoinRequest(_) => UpdateTag::ChatJoinRequest,
            Self::MessageReaction(_) => UpdateTag::MessageReaction,
            Self::MessageReactionCount(_) => UpdateTag::MessageReactionCount,
        }
    }

    fn decode(tag: UpdateTag, update_id: i64, payload: &Value) -> Result<Self, DecodeError> {
        fn parse<T: DeserializeOwned>(
            tag: UpdateTag,
            update_id: i64,
            payload: &Value,
        ) -> Result<T, DecodeError> {
            T::deserialize(payload).map_err(|e| DecodeError::Payload {
                update_id,
                field: tag.field_name(),
                reason: e.to_string(),
            })
        }

        Ok(match tag {
            UpdateTag::Message => Self::Message(parse(tag, update_id, payload)?),
            UpdateTag::EditedMessage => Self::EditedMessage(parse(tag, update_id, payload)?),
            UpdateTag::ChannelPost => Self::ChannelPost(parse(tag, update_id, payload)?),
            UpdateTag::EditedChannelPost => {
                Self::EditedChannelPost(parse(tag, update_id, payload)?)
            }
            UpdateTag::InlineQuery => Self::InlineQuery(parse(tag, update_id, payload)?),
            UpdateTag::ChosenInlineResult => {
                Self::ChosenInlineResult(parse(tag, update_id, payload)?)
            }
            UpdateTag::CallbackQuery => Self::CallbackQuery(parse(tag, update_id, payload)?),
            UpdateTag::ShippingQuery => Self::ShippingQuery(parse(tag, update_id, payload)?),
            UpdateTag::PreCheckoutQuery => Self::PreCheckoutQuery(parse(tag, update_id, payload)?),
            UpdateTag::Poll => Self::Poll(parse(tag, update_id, payload)?),
            UpdateTag::PollAnswer => Self::PollAnswer(parse(tag, update_id, payload)?),
            UpdateTag::MyChatMember => Self::MyChatMember(parse(tag, update_id, payload)?),
            UpdateTag::ChatMember => Self::ChatMember(parse(tag, update_id, payload)?),
            UpdateTag::ChatJoinRequest => Self::ChatJoinRequest(parse(tag, update_id, payload)?),
            UpdateTag::MessageReaction => Self::MessageReaction(parse(tag, update_id, payload)?),
            UpdateTag::MessageReactionCount => {
                Self::MessageReactionCount(parse(tag, update_id, payload)?)
            }
        })
    }
}

// =============================================================================
// Update
// =============================================================================

/// One decoded item from the update stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    /// Monotonically increasing id assigned by the platform.
    pub update_id: i64,
    /// The typed variant payload.
    pub kind: UpdateKind,
    /// The variant payload exactly as received.
    raw: Arc<Value>,
}

impl Update {
    /// Decodes a raw update object.
    pub fn from_value(value: Value) -> Result<Self, DecodeError> {
        let Value::Object(mut object) = value else {
            return Err(DecodeError::NotAnObject);
        };
        let update_id = object
            .get("update_id")
            .and_then(Value::as_i64)
            .ok_or(DecodeError::MissingUpdateId)?;

        let mut present = UpdateTag::ALL
            .into_iter()
            .filter(|tag| object.get(tag.field_name()).is_some_and(|v| !v.is_null()));
        let tag = present
            .next()
            .ok_or(DecodeError::UnknownVariant { update_id })?;
        if let Some(extra) = present.next() {
            warn!(
                update_id,
                chosen = %tag,
                ignored = %extra,
                "Update carries more than one variant field"
            );
        }

        let payload = object.remove(tag.field_name()).unwrap_or(Value::Null);
        let kind = UpdateKind::decode(tag, update_id, &payload)?;
        Ok(Self {
            update_id,
            kind,
            raw: Arc::new(payload),
        })
    }

    /// Returns the variant discriminant.
    pub fn tag(&self) -> UpdateTag {
        self.kind.tag()
    }

    /// Returns the variant payload as received.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Returns `true` if the payload has a non-null field with this name.
    pub fn has_field(&self, name: &str) -> bool {
        self.raw.get(name).is_some_and(|v| !v.is_null())
    }

    /// Sub-fields declared by this variant that are present on the payload,
    /// in declaration order.
    pub fn present_sub_fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.tag()
            .sub_fields()
            .iter()
            .copied()
            .filter(|field| self.has_field(field))
    }

    /// Returns the message for message-like variants.
    pub fn message(&self) -> Option<&Message> {
        match &self.kind {
            UpdateKind::Message(m)
            | UpdateKind::EditedMessage(m)
            | UpdateKind::ChannelPost(m)
            | UpdateKind::EditedChannelPost(m) => Some(m),
            _ => None,
        }
    }

    /// Returns the chat this update belongs to, when it has one.
    pub fn chat_id(&self) -> Option<i64> {
        match &self.kind {
            UpdateKind::Message(m)
            | UpdateKind::EditedMessage(m)
            | UpdateKind::ChannelPost(m)
            | UpdateKind::EditedChannelPost(m) => Some(m.chat.id),
            UpdateKind::CallbackQuery(q) => q.message.as_ref().map(|m| m.chat.id),
            UpdateKind::MyChatMember(u) | UpdateKind::ChatMember(u) => Some(u.chat.id),
            UpdateKind::ChatJoinRequest(r) => Some(r.chat.id),
            UpdateKind::MessageReaction(r) => Some(r.chat.id),
            UpdateKind::MessageReactionCount(r) => Some(r.chat.id),
            UpdateKind::PollAnswer(a) => a.voter_chat.as_ref().map(|c| c.id),
            UpdateKind::InlineQuery(_)
            | UpdateKind::ChosenInlineResult(_)
            | UpdateKind::ShippingQuery(_)
            | UpdateKind::PreCheckoutQuery(_)
            | UpdateKind::Poll(_) => None,
        }
    }

    /// Returns the id of the user who caused this update, when known.
    pub fn from_id(&self) -> Option<i64> {
        match &self.kind {
            UpdateKind::Message(m)
            | UpdateKind::EditedMessage(m)
            | UpdateKind::ChannelPost(m)
            | UpdateKind::EditedChannelPost(m) => m.from.as_ref().map(|u| u.id),
            UpdateKind::InlineQuery(q) => Some(q.from.id),
            UpdateKind::ChosenInlineResult(r) => Some(r.from.id),
            UpdateKind::CallbackQuery(q) => Some(q.from.id),
            UpdateKind::ShippingQuery(q) => Some(q.from.id),
            UpdateKind::PreCheckoutQuery(q) => Some(q.from.id),
            UpdateKind::PollAnswer(a) => a.user.as_ref().map(|u| u.id),
            UpdateKind::MyChatMember(u) | UpdateKind::ChatMember(u) => Some(u.from.id),
            UpdateKind::ChatJoinRequest(r) => Some(r.from.id),
            UpdateKind::MessageReaction(r) => r.actor_id(),
            UpdateKind::Poll(_) | UpdateKind::MessageReactionCount(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_message_with_minimal_fields() {
        let update =
            Update::from_value(json!({"update_id": 1, "message": {"chat": {"id": 9}, "text": "a"}}))
                .unwrap();
        assert_eq!(update.update_id, 1);
        assert_eq!(update.tag(), UpdateTag::Message);
        assert_eq!(update.chat_id(), Some(9));
        assert_eq!(update.message().and_then(|m| m.text.as_deref()), Some("a"));
    }

    #[test]
    fn test_decode_callback_query() {
        let update =
            Update::from_value(json!({"update_id": 3, "callback_query": {"id": "q1", "data": "x"}}))
                .unwrap();
        let UpdateKind::CallbackQuery(query) = &update.kind else {
            panic!("expected callback query, got {:?}", update.tag());
        };
        assert_eq!(query.id, "q1");
        assert_eq!(query.data.as_deref(), Some("x"));
    }

    #[test]
    fn test_present_sub_fields_only_lists_populated_fields() {
        let update = Update::from_value(
            json!({"update_id": 2, "message": {"chat": {"id": 9}, "caption": "b", "text": null}}),
        )
        .unwrap();
        let fields: Vec<_> = update.present_sub_fields().collect();
        assert_eq!(fields, vec!["caption"]);
    }

    #[test]
    fn test_unknown_variant_is_rejected() {
        let err = Update::from_value(json!({"update_id": 5, "business_message": {}})).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownVariant { update_id: 5 }));
    }

    #[test]
    fn test_missing_update_id_is_rejected() {
        let err = Update::from_value(json!({"message": {"chat": {"id": 1}}})).unwrap_err();
        assert!(matches!(err, DecodeError::MissingUpdateId));
        assert!(matches!(
            Update::from_value(json!([1, 2])).unwrap_err(),
            DecodeError::NotAnObject
        ));
    }

    #[test]
    fn test_malformed_payload_is_reported() {
        let err = Update::from_value(json!({"update_id": 7, "message": {"text": "no chat"}}))
            .unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Payload {
                update_id: 7,
                field: "message",
                ..
            }
        ));
    }

    #[test]
    fn test_field_name_round_trips_through_table() {
        for tag in UpdateTag::ALL {
            assert_eq!(UpdateTag::from_field(tag.field_name()), Some(tag));
        }
        assert_eq!(UpdateTag::from_field("business_message"), None);
    }

    #[test]
    fn test_reaction_actor_falls_back_to_actor_chat() {
        let update = Update::from_value(json!({
            "update_id": 9,
            "message_reaction": {
                "chat": {"id": -100},
                "message_id": 4,
                "actor_chat": {"id": -200},
                "new_reaction": [{"type": "emoji", "emoji": "👍"}]
            }
        }))
        .unwrap();
        assert_eq!(update.from_id(), Some(-200));
        assert_eq!(update.chat_id(), Some(-100));
    }
}

//! Reaction payloads.

use serde::{Deserialize, Serialize};

use super::chat::{Chat, User};

/// A single reaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReactionType {
    /// A standard emoji reaction.
    Emoji { emoji: String },
    /// A custom emoji reaction.
    CustomEmoji { custom_emoji_id: String },
    /// A paid (star) reaction.
    Paid,
}

impl ReactionType {
    /// Returns the identity used to key reactions: the emoji literal, the
    /// custom emoji id, or `"paid"`.
    pub fn key(&self) -> &str {
        match self {
            Self::Emoji { emoji } => emoji,
            Self::CustomEmoji { custom_emoji_id } => custom_emoji_id,
            Self::Paid => "paid",
        }
    }

    /// Creates a standard emoji reaction.
    pub fn emoji(emoji: impl Into<String>) -> Self {
        Self::Emoji {
            emoji: emoji.into(),
        }
    }
}

/// Payload of `message_reaction` updates: one user changed their reactions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageReactionUpdated {
    pub chat: Chat,
    #[serde(default)]
    pub message_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_chat: Option<Chat>,
    #[serde(default)]
    pub date: i64,
    #[serde(default)]
    pub old_reaction: Vec<ReactionType>,
    #[serde(default)]
    pub new_reaction: Vec<ReactionType>,
}

impl MessageReactionUpdated {
    /// Id of whoever reacted: the user, or the anonymous actor chat.
    pub fn actor_id(&self) -> Option<i64> {
        self.user
            .as_ref()
            .map(|u| u.id)
            .or_else(|| self.actor_chat.as_ref().map(|c| c.id))
    }

    /// The reaction this update is about: the first new reaction, or the
    /// first removed one when the user cleared their reactions.
    pub fn primary_reaction(&self) -> Option<&ReactionType> {
        self.new_reaction.first().or_else(|| self.old_reaction.first())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionCount {
    #[serde(rename = "type")]
    pub reaction: ReactionType,
    pub total_count: u32,
}

/// Payload of `message_reaction_count` updates on anonymous reactions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageReactionCountUpdated {
    pub chat: Chat,
    #[serde(default)]
    pub message_id: i64,
    #[serde(default)]
    pub date: i64,
    #[serde(default)]
    pub reactions: Vec<ReactionCount>,
}

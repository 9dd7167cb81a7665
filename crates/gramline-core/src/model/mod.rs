//! Typed data model for the bot API.
//!
//! Only the fields the library itself reads are typed; every payload is
//! still available verbatim through [`Update::raw`].
//!
//! ```text
//! Update { update_id, kind: UpdateKind, raw }
//! ├── Message            (message, edited_message, channel_post, edited_channel_post)
//! ├── InlineQuery / ChosenInlineResult / CallbackQuery
//! ├── ShippingQuery / PreCheckoutQuery
//! ├── Poll / PollAnswer
//! ├── ChatMemberUpdated  (my_chat_member, chat_member) / ChatJoinRequest
//! └── MessageReactionUpdated / MessageReactionCountUpdated
//! ```

pub mod chat;
pub mod message;
pub mod poll;
pub mod query;
pub mod reaction;
pub mod response;
pub mod update;

pub use chat::{Chat, ChatInviteLink, ChatJoinRequest, ChatMemberUpdated, User};
pub use message::{Message, MessageEntity};
pub use poll::{Poll, PollAnswer, PollOption};
pub use query::{CallbackQuery, ChosenInlineResult, InlineQuery, PreCheckoutQuery, ShippingQuery};
pub use reaction::{MessageReactionCountUpdated, MessageReactionUpdated, ReactionCount, ReactionType};
pub use response::{ApiResponse, ResponseParameters};
pub use update::{Update, UpdateKind, UpdateTag};

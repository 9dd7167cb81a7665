//! Update context handed to listeners.
//!
//! A [`Context`] composes the decoded [`Update`] with the
//! [`ApiClient`](crate::ApiClient) it arrived through, so listeners can act
//! on an update (reply, delete, react, answer) without threading chat and
//! message ids around by hand. Helpers
//! read the ids they need from the update and forward a single
//! [`ApiClient::request`](crate::ApiClient::request) call.

use std::sync::Arc;

use serde_json::{Value, json};

use crate::api::{ApiClientExt, BoxedApi};
use crate::error::{ApiError, ApiResult};
use crate::model::{
    CallbackQuery, Message, MessageReactionUpdated, ReactionType, Update, UpdateKind, UpdateTag,
};
use crate::params::{InputFile, Params};

/// A decoded update plus the client that can act on it.
#[derive(Clone)]
pub struct Context {
    update: Arc<Update>,
    api: BoxedApi,
}

impl Context {
    /// Creates a context.
    pub fn new(update: Arc<Update>, api: BoxedApi) -> Self {
        Self { update, api }
    }

    /// Returns the update.
    pub fn update(&self) -> &Update {
        &self.update
    }

    /// Returns a shared handle to the update.
    pub fn update_arc(&self) -> Arc<Update> {
        Arc::clone(&self.update)
    }

    /// Returns the API client.
    pub fn api(&self) -> &BoxedApi {
        &self.api
    }

    pub fn update_id(&self) -> i64 {
        self.update.update_id
    }

    pub fn tag(&self) -> UpdateTag {
        self.update.tag()
    }

    /// The message of message-like updates.
    pub fn message(&self) -> Option<&Message> {
        self.update.message()
    }

    pub fn callback_query(&self) -> Option<&CallbackQuery> {
        match &self.update.kind {
            UpdateKind::CallbackQuery(q) => Some(q),
            _ => None,
        }
    }

    pub fn reaction(&self) -> Option<&MessageReactionUpdated> {
        match &self.update.kind {
            UpdateKind::MessageReaction(r) => Some(r),
            _ => None,
        }
    }

    pub fn chat_id(&self) -> Option<i64> {
        self.update.chat_id()
    }

    pub fn from_id(&self) -> Option<i64> {
        self.update.from_id()
    }

    /// The message this update is about: the message itself, the message a
    /// pressed button belongs to, or the message that was reacted to.
    pub fn message_id(&self) -> Option<i64> {
        match &self.update.kind {
            UpdateKind::CallbackQuery(q) => q.message.as_ref().map(|m| m.message_id),
            UpdateKind::MessageReaction(r) => Some(r.message_id),
            UpdateKind::MessageReactionCount(r) => Some(r.message_id),
            _ => self.message().map(|m| m.message_id),
        }
    }

    /// Text or caption of message-like updates.
    pub fn text(&self) -> Option<&str> {
        self.message().and_then(Message::text_or_caption)
    }

    fn require_chat(&self) -> ApiResult<i64> {
        self.chat_id().ok_or(ApiError::MissingContext("chat"))
    }

    fn require_message(&self) -> ApiResult<i64> {
        self.message_id().ok_or(ApiError::MissingContext("message"))
    }

    /// Sends a text message to this update's chat.
    pub async fn send_message(&self, text: impl Into<String>) -> ApiResult<Message> {
        let text: String = text.into();
        let params = Params::new()
            .with("chat_id", self.require_chat()?)
            .with("text", text);
        self.api.call("sendMessage", params).await
    }

    /// Sends a text message replying to this update's message.
    pub async fn reply(&self, text: impl Into<String>) -> ApiResult<Message> {
        let text: String = text.into();
        let params = Params::new()
            .with("chat_id", self.require_chat()?)
            .with("text", text)
            .with(
                "reply_parameters",
                json!({ "message_id": self.require_message()? }),
            );
        self.api.call("sendMessage", params).await
    }

    /// Sends a photo to this update's chat.
    pub async fn send_photo(&self, photo: InputFile, caption: Option<&str>) -> ApiResult<Message> {
        let params = Params::new()
            .with("chat_id", self.require_chat()?)
            .file("photo", photo)
            .with("caption", caption);
        self.api.call("sendPhoto", params).await
    }

    /// Edits the text of this update's message.
    pub async fn edit_message_text(&self, text: impl Into<String>) -> ApiResult<Value> {
        let text: String = text.into();
        let params = Params::new()
            .with("chat_id", self.require_chat()?)
            .with("message_id", self.require_message()?)
            .with("text", text);
        self.api.request("editMessageText", params).await
    }

    /// Deletes this update's message.
    pub async fn delete_message(&self) -> ApiResult<bool> {
        let params = Params::new()
            .with("chat_id", self.require_chat()?)
            .with("message_id", self.require_message()?);
        self.api.call("deleteMessage", params).await
    }

    /// Sets the bot's reaction on this update's message.
    pub async fn react(&self, reaction: ReactionType) -> ApiResult<bool> {
        let params = Params::new()
            .with("chat_id", self.require_chat()?)
            .with("message_id", self.require_message()?)
            .with("reaction", serde_json::to_value(vec![reaction])?);
        self.api.call("setMessageReaction", params).await
    }

    /// Answers the pressed button of a callback query update.
    pub async fn answer_callback_query(&self, text: Option<&str>) -> ApiResult<bool> {
        let query = self
            .callback_query()
            .ok_or(ApiError::MissingContext("callback query"))?;
        let params = Params::new()
            .with("callback_query_id", query.id.as_str())
            .with("text", text);
        self.api.call("answerCallbackQuery", params).await
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("update_id", &self.update.update_id)
            .field("tag", &self.update.tag())
            .finish_non_exhaustive()
    }
}

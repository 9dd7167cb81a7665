//! Request body encoding.
//!
//! Most API calls travel as a plain JSON body. As soon as a parameter carries
//! media that has to be uploaded (bytes, a local path, or a remote URL the
//! platform cannot fetch on its own), the whole call switches to
//! `multipart/form-data`:
//!
//! ```text
//! Params { chat_id: 9, photo: Bytes(..) }
//!
//!   ──▶ field  "chat_id" = "9"
//!       field  "photo"   = "attach://3f2c..."
//!       file   "3f2c..."  (photo.jpg, image/jpeg)
//! ```
//!
//! Every uploaded file becomes a binary part named by a fresh attachment id,
//! and the field that referenced it is replaced by `attach://<id>`. Media
//! groups repeat this per item (and per thumbnail) and then travel as one
//! JSON text field.
//!
//! Parameters built from raw JSON may describe media by shape instead of by
//! type: `{"source": "<path>"}`, `{"source": [<bytes>]}` or `{"url": "..."}`,
//! with an optional `"filename"`. Those shapes are recognised at the top level
//! and one level into arrays of `{"media": {...}}` items.

use std::time::Duration;

use serde_json::{Map, Value};
use tracing::debug;

use gramline_core::{InputFile, InputMedia, ParamValue, Params, TransportError, TransportResult};

/// Fields that may carry binary media.
pub const MEDIA_FIELDS: &[&str] = &[
    "photo",
    "video",
    "audio",
    "document",
    "animation",
    "voice",
    "video_note",
    "sticker",
    "thumbnail",
    "certificate",
    "media",
    "png_sticker",
    "tgs_sticker",
    "webm_sticker",
];

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const MULTIPART_CONTENT_TYPE: &str = "multipart/form-data";

/// Default extension for a file uploaded without a name.
pub fn default_extension(field: &str) -> &'static str {
    match field {
        "photo" | "thumbnail" => "jpg",
        "video" | "animation" | "video_note" => "mp4",
        "audio" => "mp3",
        "voice" => "ogg",
        "sticker" => "webp",
        "certificate" => "pem",
        _ => "bin",
    }
}

/// Guesses a MIME type from a file name's extension.
pub fn guess_mime_type(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "ogg" | "oga" => "audio/ogg",
        "m4a" => "audio/mp4",
        "wav" => "audio/wav",
        "tgs" => "application/x-tgsticker",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "txt" => "text/plain",
        "json" => "application/json",
        "pem" => "application/x-pem-file",
        _ => "application/octet-stream",
    }
}

// =============================================================================
// Encoded bodies
// =============================================================================

/// One binary part of a multipart body.
#[derive(Debug, Clone, PartialEq)]
pub struct FilePart {
    /// Part name: the attachment id.
    pub name: String,
    pub file_name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// A multipart body before it is handed to reqwest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultipartBody {
    /// Text fields, in parameter order.
    pub fields: Vec<(String, String)>,
    /// Binary parts, in attachment order.
    pub files: Vec<FilePart>,
}

impl MultipartBody {
    /// Returns the value of a text field.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }

    /// Builds the reqwest form.
    pub fn into_form(self) -> TransportResult<reqwest::multipart::Form> {
        let mut form = reqwest::multipart::Form::new();
        for (name, value) in self.fields {
            form = form.text(name, value);
        }
        for file in self.files {
            let part = reqwest::multipart::Part::bytes(file.data)
                .file_name(file.file_name)
                .mime_str(&file.mime_type)
                .map_err(|e| TransportError::Media {
                    field: file.name.clone(),
                    reason: format!("invalid MIME type: {e}"),
                })?;
            form = form.part(file.name, part);
        }
        Ok(form)
    }
}

/// An encoded request body.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodedBody {
    Json(Value),
    Multipart(MultipartBody),
}

impl EncodedBody {
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Json(_) => JSON_CONTENT_TYPE,
            Self::Multipart(_) => MULTIPART_CONTENT_TYPE,
        }
    }

    pub fn is_multipart(&self) -> bool {
        matches!(self, Self::Multipart(_))
    }
}

// =============================================================================
// Strategy
// =============================================================================

/// Returns `true` if `params` must be sent as `multipart/form-data`.
pub fn needs_multipart(params: &Params) -> bool {
    params.iter().any(|(name, value)| match value {
        ParamValue::File(file) => file.needs_upload(),
        ParamValue::Media(items) => items.iter().any(InputMedia::needs_upload),
        ParamValue::Json(value) => {
            (MEDIA_FIELDS.contains(&name) && shaped_file(value).is_some_and(|f| f.needs_upload()))
                || matches!(
                    shaped_media_group(value),
                    Some(Ok(items)) if items.iter().any(InputMedia::needs_upload)
                )
        }
    })
}

/// Reads a `{source|url}`-shaped JSON value as a file.
fn shaped_file(value: &Value) -> Option<InputFile> {
    let object = value.as_object()?;
    let file_name = object
        .get("filename")
        .and_then(Value::as_str)
        .map(str::to_string);

    if let Some(url) = object.get("url").and_then(Value::as_str) {
        return Some(InputFile::Url(url.to_string()));
    }
    match object.get("source")? {
        Value::String(path) => Some(InputFile::path(path)),
        Value::Array(bytes) => {
            let data = bytes
                .iter()
                .map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect::<Option<Vec<u8>>>()?;
            Some(InputFile::Bytes { data, file_name })
        }
        _ => None,
    }
}

/// Reads an array of `{type, media: {source|url}, ...}` items as a media group.
///
/// Returns `None` unless at least one item carries a shaped media source.
/// Once one does, every item must be a media object; the first that is not
/// is reported by index.
fn shaped_media_group(value: &Value) -> Option<Result<Vec<InputMedia>, String>> {
    let items = value.as_array()?;
    if !items
        .iter()
        .any(|item| item.get("media").and_then(shaped_file).is_some())
    {
        return None;
    }

    let group = items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            shaped_media_item(item).ok_or_else(|| {
                format!("media group item {index} is not an object with a readable `media`")
            })
        })
        .collect();
    Some(group)
}

fn shaped_media_item(item: &Value) -> Option<InputMedia> {
    let mut fields = item.as_object()?.clone();
    let kind = fields
        .remove("type")
        .and_then(|t| t.as_str().map(str::to_string))
        .unwrap_or_else(|| "document".to_string());
    let media = match fields.remove("media")? {
        Value::String(id) => InputFile::Id(id),
        shaped => shaped_file(&shaped)?,
    };
    let thumbnail = match fields.remove("thumbnail") {
        Some(Value::String(id)) => Some(InputFile::Id(id)),
        Some(shaped) => Some(shaped_file(&shaped)?),
        None => None,
    };
    Some(InputMedia {
        kind,
        media,
        thumbnail,
        fields,
    })
}

/// Rewrites JSON values that describe media by shape into typed values.
///
/// # Errors
/// Returns [`TransportError::Media`] for a shaped media group with an item
/// that cannot be read.
fn normalize(params: Params) -> TransportResult<Params> {
    let mut normalized = Params::new();
    for (name, value) in params {
        let value = match value {
            ParamValue::Json(json) => {
                if let Some(file) = shaped_file(&json).filter(|_| MEDIA_FIELDS.contains(&name.as_str())) {
                    ParamValue::File(file)
                } else if let Some(group) = shaped_media_group(&json) {
                    let items = group.map_err(|reason| TransportError::Media {
                        field: name.clone(),
                        reason,
                    })?;
                    ParamValue::Media(items)
                } else {
                    ParamValue::Json(json)
                }
            }
            other => other,
        };
        normalized.insert(name, value);
    }
    Ok(normalized)
}

/// Renders a JSON value as a multipart text field.
fn form_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn file_name_from_url(url: &str) -> Option<String> {
    let url = url.split(['?', '#']).next().unwrap_or(url);
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let (_, path) = rest.split_once('/')?;
    let last = path.rsplit('/').next()?;
    last.contains('.').then(|| last.to_string())
}

// =============================================================================
// Encoder
// =============================================================================

/// Chooses between JSON and multipart and builds the body.
#[derive(Debug, Clone)]
pub struct MultipartEncoder {
    http: reqwest::Client,
    fetch_timeout: Duration,
}

impl MultipartEncoder {
    /// Creates an encoder that downloads URL media with `http`.
    pub fn new(http: reqwest::Client, fetch_timeout: Duration) -> Self {
        Self {
            http,
            fetch_timeout,
        }
    }

    /// Encodes `params`.
    ///
    /// # Errors
    /// Returns [`TransportError::Media`] when a file cannot be read or fetched,
    /// or when a media group mixes uploads with malformed items.
    pub async fn encode(&self, params: Params) -> TransportResult<EncodedBody> {
        let params = normalize(params)?;
        if !needs_multipart(&params) {
            return Ok(EncodedBody::Json(Self::encode_json(params)));
        }

        let mut body = MultipartBody::default();
        for (name, value) in params {
            let text = match value {
                ParamValue::Json(json) => form_text(json),
                ParamValue::File(file) => self.attach(&mut body, &name, file).await?,
                ParamValue::Media(items) => {
                    let mut group = Vec::with_capacity(items.len());
                    for item in items {
                        group.push(self.attach_media(&mut body, item).await?);
                    }
                    Value::Array(group).to_string()
                }
            };
            body.fields.push((name, text));
        }

        debug!(
            fields = body.fields.len(),
            files = body.files.len(),
            "Encoded multipart body"
        );
        Ok(EncodedBody::Multipart(body))
    }

    fn encode_json(params: Params) -> Value {
        let mut object = Map::new();
        for (name, value) in params {
            let json = match value {
                ParamValue::Json(json) => json,
                ParamValue::File(file) => file_json(file),
                ParamValue::Media(items) => Value::Array(
                    items
                        .into_iter()
                        .map(|item| {
                            let mut fields = item.fields;
                            fields.insert("type".into(), Value::String(item.kind));
                            fields.insert("media".into(), file_json(item.media));
                            if let Some(thumbnail) = item.thumbnail {
                                fields.insert("thumbnail".into(), file_json(thumbnail));
                            }
                            Value::Object(fields)
                        })
                        .collect(),
                ),
            };
            object.insert(name, json);
        }
        Value::Object(object)
    }

    /// Uploads `file` if needed and returns the text that references it.
    async fn attach(
        &self,
        body: &mut MultipartBody,
        field: &str,
        file: InputFile,
    ) -> TransportResult<String> {
        if let InputFile::Id(id) = file {
            return Ok(id);
        }
        let id = uuid::Uuid::new_v4().simple().to_string();
        let (file_name, data) = self.load(field, file).await?;
        body.files.push(FilePart {
            name: id.clone(),
            mime_type: guess_mime_type(&file_name).to_string(),
            file_name,
            data,
        });
        Ok(format!("attach://{id}"))
    }

    async fn attach_media(
        &self,
        body: &mut MultipartBody,
        item: InputMedia,
    ) -> TransportResult<Value> {
        let mut fields = item.fields;
        let media = self.attach(body, &item.kind, item.media).await?;
        fields.insert("type".into(), Value::String(item.kind));
        fields.insert("media".into(), Value::String(media));
        if let Some(thumbnail) = item.thumbnail {
            let thumbnail = self.attach(body, "thumbnail", thumbnail).await?;
            fields.insert("thumbnail".into(), Value::String(thumbnail));
        }
        Ok(Value::Object(fields))
    }

    /// Reads the bytes of an uploadable file and picks its file name.
    async fn load(&self, field: &str, file: InputFile) -> TransportResult<(String, Vec<u8>)> {
        let fallback = || format!("{field}.{}", default_extension(field));
        let media_error = |reason: String| TransportError::Media {
            field: field.to_string(),
            reason,
        };

        match file {
            InputFile::Bytes { data, file_name } => Ok((file_name.unwrap_or_else(fallback), data)),
            InputFile::Path(path) => {
                let data = tokio::fs::read(&path)
                    .await
                    .map_err(|e| media_error(format!("{}: {e}", path.display())))?;
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(fallback);
                Ok((name, data))
            }
            InputFile::Url(url) => {
                debug!(field, "Fetching remote media");
                let response = self
                    .http
                    .get(&url)
                    .timeout(self.fetch_timeout)
                    .send()
                    .await
                    .and_then(reqwest::Response::error_for_status)
                    .map_err(|e| media_error(e.to_string()))?;
                let data = response
                    .bytes()
                    .await
                    .map_err(|e| media_error(e.to_string()))?;
                let name = file_name_from_url(&url).unwrap_or_else(fallback);
                Ok((name, data.to_vec()))
            }
            InputFile::Id(id) => Err(media_error(format!("file id '{id}' is not uploadable"))),
        }
    }
}

/// JSON rendering of a file that needs no upload.
fn file_json(file: InputFile) -> Value {
    match file {
        InputFile::Id(id) | InputFile::Url(id) => Value::String(id),
        // needs_multipart routes every other source to the multipart path.
        InputFile::Bytes { .. } | InputFile::Path(_) => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encoder() -> MultipartEncoder {
        MultipartEncoder::new(reqwest::Client::new(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_plain_payload_is_json() {
        let params = Params::from(json!({
            "chat_id": 9,
            "text": "hello",
            "photo": "AgACAgIAAx0",
            "reply_markup": {"inline_keyboard": []}
        }));
        assert!(!needs_multipart(&params));

        let body = encoder().encode(params).await.unwrap();
        assert_eq!(body.content_type(), "application/json");
        let EncodedBody::Json(value) = body else {
            panic!("expected a JSON body");
        };
        assert_eq!(value["photo"], "AgACAgIAAx0");
        assert_eq!(value["reply_markup"], json!({"inline_keyboard": []}));
    }

    #[tokio::test]
    async fn test_buffer_source_becomes_one_attachment() {
        let params = Params::from(json!({
            "chat_id": 9,
            "photo": {"source": [1, 2, 3]}
        }));
        assert!(needs_multipart(&params));

        let body = encoder().encode(params).await.unwrap();
        assert_eq!(body.content_type(), "multipart/form-data");
        let EncodedBody::Multipart(body) = body else {
            panic!("expected a multipart body");
        };

        assert_eq!(body.files.len(), 1);
        let part = &body.files[0];
        assert_eq!(part.data, vec![1, 2, 3]);
        assert_eq!(part.file_name, "photo.jpg");
        assert_eq!(part.mime_type, "image/jpeg");

        let attach: Vec<_> = body
            .fields
            .iter()
            .filter(|(_, value)| value.starts_with("attach://"))
            .collect();
        assert_eq!(attach.len(), 1);
        assert_eq!(attach[0].0, "photo");
        assert_eq!(attach[0].1, format!("attach://{}", part.name));
        assert_eq!(body.field("chat_id"), Some("9"));
    }

    #[tokio::test]
    async fn test_structured_fields_are_serialized() {
        let params = Params::new()
            .with("chat_id", 9)
            .with("caption", "look")
            .with("reply_markup", json!({"inline_keyboard": [[{"text": "a", "callback_data": "a"}]]}))
            .file("document", InputFile::bytes_named(b"%PDF".to_vec(), "report.pdf"));

        let EncodedBody::Multipart(body) = encoder().encode(params).await.unwrap() else {
            panic!("expected a multipart body");
        };
        assert_eq!(body.field("caption"), Some("look"));
        let markup: Value = serde_json::from_str(body.field("reply_markup").unwrap()).unwrap();
        assert_eq!(markup["inline_keyboard"][0][0]["text"], "a");
        assert_eq!(body.files[0].file_name, "report.pdf");
        assert_eq!(body.files[0].mime_type, "application/pdf");
    }

    #[tokio::test]
    async fn test_media_group_attaches_each_upload() {
        let params = Params::new().with("chat_id", 9).media(
            "media",
            vec![
                InputMedia::photo(InputFile::bytes(vec![0xff])).caption("first"),
                InputMedia::photo(InputFile::id("AgAD")),
                InputMedia::video(InputFile::bytes(vec![0x00]))
                    .thumbnail(InputFile::bytes(vec![0x01])),
            ],
        );

        let EncodedBody::Multipart(body) = encoder().encode(params).await.unwrap() else {
            panic!("expected a multipart body");
        };
        assert_eq!(body.files.len(), 3);

        let group: Value = serde_json::from_str(body.field("media").unwrap()).unwrap();
        assert_eq!(group[0]["type"], "photo");
        assert_eq!(group[0]["caption"], "first");
        assert_eq!(group[0]["media"], format!("attach://{}", body.files[0].name));
        assert_eq!(group[1]["media"], "AgAD");
        assert_eq!(group[2]["thumbnail"], format!("attach://{}", body.files[2].name));
        assert_eq!(body.files[1].file_name, "video.mp4");
        assert_eq!(body.files[2].file_name, "thumbnail.jpg");
    }

    #[tokio::test]
    async fn test_shaped_media_group_is_detected() {
        let params = Params::from(json!({
            "chat_id": 9,
            "media": [
                {"type": "photo", "media": {"source": [7], "filename": "cat.png"}},
                {"type": "photo", "media": "AgAD"}
            ]
        }));
        assert!(needs_multipart(&params));

        let EncodedBody::Multipart(body) = encoder().encode(params).await.unwrap() else {
            panic!("expected a multipart body");
        };
        assert_eq!(body.files.len(), 1);
        assert_eq!(body.files[0].file_name, "cat.png");
        assert_eq!(body.files[0].mime_type, "image/png");
    }

    #[tokio::test]
    async fn test_malformed_item_in_shaped_media_group_is_rejected() {
        let params = Params::from(json!({
            "chat_id": 9,
            "media": [
                {"type": "photo", "media": {"source": [7]}},
                {"type": "photo"},
                "AgAD"
            ]
        }));
        assert!(!needs_multipart(&params));

        let err = encoder().encode(params).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::Media { ref field, ref reason }
                if field == "media" && reason.contains("item 1")
        ));
    }

    #[tokio::test]
    async fn test_unshaped_array_stays_json() {
        let params = Params::from(json!({
            "chat_id": 9,
            "media": [{"type": "photo", "media": "AgAD"}, "loose"]
        }));
        let EncodedBody::Json(value) = encoder().encode(params).await.unwrap() else {
            panic!("expected a JSON body");
        };
        assert_eq!(value["media"][1], "loose");
    }

    #[tokio::test]
    async fn test_missing_path_is_media_error() {
        let params = Params::new().file("audio", InputFile::path("/nonexistent/track.mp3"));
        let err = encoder().encode(params).await.unwrap_err();
        assert!(matches!(err, TransportError::Media { ref field, .. } if field == "audio"));
    }

    #[test]
    fn test_file_name_from_url() {
        assert_eq!(
            file_name_from_url("https://cdn.example.org/a/b/cat.gif?size=2"),
            Some("cat.gif".to_string())
        );
        assert_eq!(file_name_from_url("https://cdn.example.org/a/b/"), None);
        assert_eq!(file_name_from_url("https://cdn.example.org/blob"), None);
        assert_eq!(file_name_from_url("https://cdn.example.org"), None);
    }

    #[test]
    fn test_default_extension_table() {
        assert_eq!(default_extension("voice"), "ogg");
        assert_eq!(default_extension("sticker"), "webp");
        assert_eq!(default_extension("document"), "bin");
        assert_eq!(guess_mime_type("song.MP3"), "audio/mpeg");
        assert_eq!(guess_mime_type("noext"), "application/octet-stream");
    }
}

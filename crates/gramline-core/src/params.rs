//! Request parameters.
//!
//! A [`Params`] is what every API call hands to the transport. Most values
//! are plain JSON; media values are [`InputFile`]s, which may need uploading,
//! and media groups are lists of [`InputMedia`].

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_json::{Map, Value};

// =============================================================================
// InputFile
// =============================================================================

/// A media source for an API call.
#[derive(Debug, Clone, PartialEq)]
pub enum InputFile {
    /// In-memory bytes to upload.
    Bytes {
        /// File contents.
        data: Vec<u8>,
        /// File name to report, if known.
        file_name: Option<String>,
    },
    /// A local file to upload.
    Path(PathBuf),
    /// A remote file that is downloaded, then uploaded.
    Url(String),
    /// A file already known to the platform (file id), sent as a string.
    Id(String),
}

impl InputFile {
    /// Creates an upload from in-memory bytes.
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        Self::Bytes {
            data: data.into(),
            file_name: None,
        }
    }

    /// Creates an upload from in-memory bytes with a file name.
    pub fn bytes_named(data: impl Into<Vec<u8>>, file_name: impl Into<String>) -> Self {
        Self::Bytes {
            data: data.into(),
            file_name: Some(file_name.into()),
        }
    }

    /// Creates an upload from a local path.
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    /// Creates an upload from a remote URL.
    pub fn url(url: impl Into<String>) -> Self {
        Self::Url(url.into())
    }

    /// References an already uploaded file.
    pub fn id(file_id: impl Into<String>) -> Self {
        Self::Id(file_id.into())
    }

    /// Returns `true` if this source must travel as a multipart file part.
    pub fn needs_upload(&self) -> bool {
        !matches!(self, Self::Id(_))
    }
}

// =============================================================================
// InputMedia
// =============================================================================

/// One item of a media group (`sendMediaGroup`, `editMessageMedia`).
#[derive(Debug, Clone, PartialEq)]
pub struct InputMedia {
    /// Media type: "photo", "video", "audio", "document" or "animation".
    pub kind: String,
    /// The media itself.
    pub media: InputFile,
    /// Optional thumbnail.
    pub thumbnail: Option<InputFile>,
    /// Remaining JSON fields (caption, parse_mode, ...).
    pub fields: Map<String, Value>,
}

impl InputMedia {
    /// Creates a media item of the given type.
    pub fn new(kind: impl Into<String>, media: InputFile) -> Self {
        Self {
            kind: kind.into(),
            media,
            thumbnail: None,
            fields: Map::new(),
        }
    }

    /// Creates a photo item.
    pub fn photo(media: InputFile) -> Self {
        Self::new("photo", media)
    }

    /// Creates a video item.
    pub fn video(media: InputFile) -> Self {
        Self::new("video", media)
    }

    /// Creates a document item.
    pub fn document(media: InputFile) -> Self {
        Self::new("document", media)
    }

    /// Sets the caption.
    pub fn caption(self, caption: impl Into<String>) -> Self {
        let caption: String = caption.into();
        self.field("caption", caption)
    }

    /// Sets the thumbnail.
    pub fn thumbnail(mut self, thumbnail: InputFile) -> Self {
        self.thumbnail = Some(thumbnail);
        self
    }

    /// Sets an arbitrary JSON field.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Returns `true` if the media or its thumbnail must be uploaded.
    pub fn needs_upload(&self) -> bool {
        self.media.needs_upload() || self.thumbnail.as_ref().is_some_and(InputFile::needs_upload)
    }
}

// =============================================================================
// Params
// =============================================================================

/// A single parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Plain JSON.
    Json(Value),
    /// A media source.
    File(InputFile),
    /// A media group.
    Media(Vec<InputMedia>),
}

impl From<Value> for ParamValue {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<InputFile> for ParamValue {
    fn from(file: InputFile) -> Self {
        Self::File(file)
    }
}

impl From<Vec<InputMedia>> for ParamValue {
    fn from(media: Vec<InputMedia>) -> Self {
        Self::Media(media)
    }
}

/// Parameters for one API call, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: BTreeMap<String, ParamValue>,
}

impl Params {
    /// Creates empty parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a JSON field (builder pattern).
    ///
    /// `null` values are skipped, so optional fields can be passed as-is.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value.into());
        self
    }

    /// Adds a media field (builder pattern).
    pub fn file(mut self, name: impl Into<String>, file: InputFile) -> Self {
        self.insert(name, file);
        self
    }

    /// Adds a media group field (builder pattern).
    pub fn media(mut self, name: impl Into<String>, media: Vec<InputMedia>) -> Self {
        self.insert(name, media);
        self
    }

    /// Inserts a value, replacing any previous value for the field.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        let value = value.into();
        if matches!(value, ParamValue::Json(Value::Null)) {
            return;
        }
        self.values.insert(name.into(), value);
    }

    /// Returns the value of a field.
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    /// Returns `true` if no field is set.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the number of fields.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Iterates over fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns `true` if any field carries a file that must be uploaded.
    pub fn has_uploads(&self) -> bool {
        self.values.values().any(|v| match v {
            ParamValue::Json(_) => false,
            ParamValue::File(file) => file.needs_upload(),
            ParamValue::Media(items) => items.iter().any(InputMedia::needs_upload),
        })
    }
}

impl IntoIterator for Params {
    type Item = (String, ParamValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, ParamValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl From<Map<String, Value>> for Params {
    fn from(map: Map<String, Value>) -> Self {
        let mut params = Self::new();
        for (name, value) in map {
            params.insert(name, value);
        }
        params
    }
}

impl From<Value> for Params {
    /// Converts a JSON object; any other value yields empty parameters.
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => map.into(),
            _ => Self::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_object_skips_nulls() {
        let params = Params::from(json!({"chat_id": 9, "text": "hi", "reply_markup": null}));
        assert_eq!(params.len(), 2);
        assert_eq!(params.get("chat_id"), Some(&ParamValue::Json(json!(9))));
        assert!(params.get("reply_markup").is_none());
    }

    #[test]
    fn test_has_uploads() {
        let by_id = Params::new().file("photo", InputFile::id("AgAD"));
        assert!(!by_id.has_uploads());

        let bytes = Params::new().file("photo", InputFile::bytes(vec![1, 2, 3]));
        assert!(bytes.has_uploads());

        let group = Params::new().media(
            "media",
            vec![
                InputMedia::photo(InputFile::id("a")),
                InputMedia::photo(InputFile::id("b")).thumbnail(InputFile::path("t.jpg")),
            ],
        );
        assert!(group.has_uploads());
    }
}

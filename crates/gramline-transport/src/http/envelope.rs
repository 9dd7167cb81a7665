//! Response envelope decoding.

use serde_json::Value;

use gramline_core::model::ApiResponse;
use gramline_core::{ApiError, ApiResult, TransportError};

/// Longest body quoted in a [`TransportError::Status`].
const MAX_QUOTED_BODY: usize = 512;

/// Decodes a response body received with `status` for `method`.
///
/// The envelope is tried first whatever the status, so 4xx answers keep the
/// platform's description. Only a body that is not an envelope falls back to
/// the HTTP status.
pub fn decode_envelope(method: &str, status: u16, body: &str) -> ApiResult<Value> {
    let envelope: ApiResponse<Value> = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(e) if (200..300).contains(&status) => {
            return Err(TransportError::Decode(format!("{method}: {e}")).into());
        }
        Err(_) => {
            return Err(TransportError::Status {
                status,
                body: quote(body),
            }
            .into());
        }
    };

    if envelope.ok {
        return Ok(envelope.result.unwrap_or(Value::Null));
    }

    Err(ApiError::Api {
        method: method.to_string(),
        code: envelope.error_code.unwrap_or_else(|| i64::from(status)),
        description: envelope
            .description
            .unwrap_or_else(|| "no description".to_string()),
        parameters: envelope.parameters,
    })
}

fn quote(body: &str) -> String {
    if body.len() <= MAX_QUOTED_BODY {
        return body.to_string();
    }
    let mut end = MAX_QUOTED_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_ok_envelope_returns_result() {
        let value = decode_envelope("getMe", 200, r#"{"ok":true,"result":{"id":1}}"#).unwrap();
        assert_eq!(value["id"], 1);
    }

    #[test]
    fn test_error_envelope_keeps_method_and_description() {
        let err = decode_envelope(
            "sendMessage",
            400,
            r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#,
        )
        .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("sendMessage"));
        assert!(message.contains("Bad Request: chat not found"));
        assert_eq!(err.code(), Some(400));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_rate_limited_envelope_carries_retry_hint() {
        let err = decode_envelope(
            "getUpdates",
            429,
            r#"{"ok":false,"error_code":429,"description":"Too Many Requests: retry after 3","parameters":{"retry_after":3}}"#,
        )
        .unwrap_err();
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_non_envelope_body_falls_back_to_status() {
        let err = decode_envelope("getUpdates", 502, "<html>Bad Gateway</html>").unwrap_err();
        assert!(matches!(
            err,
            ApiError::Transport(TransportError::Status { status: 502, .. })
        ));
        assert!(!err.is_fatal());

        let err = decode_envelope("getMe", 200, "not json").unwrap_err();
        assert!(matches!(err, ApiError::Transport(TransportError::Decode(_))));
    }

    #[test]
    fn test_quote_truncates_long_bodies() {
        let long = "é".repeat(600);
        let quoted = quote(&long);
        assert!(quoted.ends_with("..."));
        assert!(quoted.len() <= MAX_QUOTED_BODY + 3);
    }
}

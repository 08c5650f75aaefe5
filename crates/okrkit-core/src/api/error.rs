use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("{message}")]
    Http { status: u16, message: String },

    #[error("Authentication failed. Please login again.")]
    AuthenticationExpired,

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid cache pattern: {0}")]
    InvalidPattern(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Network(err.to_string())
    }
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid surfacing excessive data
    fn truncate_body(body: &str) -> String {
        match body.char_indices().nth(MAX_ERROR_BODY_LENGTH) {
            None => body.to_string(),
            Some((cut, _)) => format!(
                "{}... (truncated, {} total bytes)",
                &body[..cut],
                body.len()
            ),
        }
    }

    /// Best human-readable message for a failed response.
    ///
    /// A JSON body contributes its `message` field, then `detail`, or the
    /// body itself when it is a bare JSON string. Non-string fields are
    /// rendered as JSON. A JSON body with none of those yields the generic
    /// fallback. A body that is not JSON at all is used as raw text.
    pub fn extract_message(status: u16, body: &str) -> String {
        let fallback = format!("Request failed: {}", status);
        let trimmed = body.trim();
        if trimmed.is_empty() {
            return fallback;
        }

        match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::Object(map)) => ["message", "detail"]
                .iter()
                .find_map(|field| map.get(*field).and_then(Self::field_text))
                .unwrap_or(fallback),
            Ok(Value::String(s)) if !s.is_empty() => s,
            Ok(_) => fallback,
            Err(_) => Self::truncate_body(trimmed),
        }
    }

    /// Text of a message field. Empty strings, `0`, `false` and `null` carry
    /// no message; other non-string values are rendered as JSON.
    fn field_text(value: &Value) -> Option<String> {
        match value {
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            Value::Null | Value::Bool(false) => None,
            Value::Number(n) if n.as_f64() == Some(0.0) => None,
            other => Some(other.to_string()),
        }
    }

    pub fn from_status(status: u16, body: &str) -> Self {
        ApiError::Http {
            status,
            message: Self::extract_message(status, body),
        }
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when the caller has to sign in again
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            ApiError::AuthenticationExpired | ApiError::RefreshFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_field_wins_over_detail() {
        let body = r#"{"message": "Objective not found", "detail": "id=42"}"#;
        assert_eq!(ApiError::extract_message(404, body), "Objective not found");
    }

    #[test]
    fn test_detail_used_when_message_missing() {
        let body = r#"{"detail": "Quarter is required"}"#;
        assert_eq!(ApiError::extract_message(400, body), "Quarter is required");
    }

    #[test]
    fn test_bare_json_string_body() {
        assert_eq!(ApiError::extract_message(409, r#""Already archived""#), "Already archived");
    }

    #[test]
    fn test_json_without_known_fields_falls_back() {
        let body = r#"{"error": "Bad Request"}"#;
        assert_eq!(ApiError::extract_message(400, body), "Request failed: 400");
    }

    #[test]
    fn test_non_string_message_fields() {
        assert_eq!(ApiError::extract_message(400, r#"{"message": 4001}"#), "4001");
        assert_eq!(
            ApiError::extract_message(422, r#"{"detail": {"title": "too long"}}"#),
            r#"{"title":"too long"}"#
        );
        assert_eq!(
            ApiError::extract_message(400, r#"{"message": 0, "detail": "Quarter is required"}"#),
            "Quarter is required"
        );
        assert_eq!(ApiError::extract_message(400, r#"{"message": null}"#), "Request failed: 400");
    }

    #[test]
    fn test_raw_text_body() {
        assert_eq!(
            ApiError::extract_message(502, "upstream unavailable"),
            "upstream unavailable"
        );
    }

    #[test]
    fn test_empty_body_falls_back() {
        assert_eq!(ApiError::extract_message(500, "   "), "Request failed: 500");
    }

    #[test]
    fn test_long_raw_body_is_truncated() {
        let body = "x".repeat(800);
        let message = ApiError::extract_message(500, &body);
        assert!(message.starts_with(&"x".repeat(500)));
        assert!(message.ends_with("(truncated, 800 total bytes)"));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let body = "é".repeat(600);
        let message = ApiError::truncate_body(&body);
        assert!(message.starts_with(&"é".repeat(500)));
    }

    #[test]
    fn test_display_uses_extracted_message() {
        let err = ApiError::from_status(422, r#"{"message": "Title too long"}"#);
        assert_eq!(err.to_string(), "Title too long");
        assert_eq!(err.status(), Some(422));
        assert!(!err.requires_login());
        assert!(ApiError::AuthenticationExpired.requires_login());
    }
}

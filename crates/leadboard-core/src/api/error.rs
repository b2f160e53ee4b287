use serde_json::Value;
use thiserror::Error;

/// Failure of a single API call.
///
/// `Clone` so one failed request can be handed to every caller that joined it.
/// A missing credential is not represented here; callers skip the request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("{message}")]
    RequestFailed { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Request cancelled")]
    Cancelled,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    pub fn default_message(status: u16) -> String {
        format!("Request failed ({})", status)
    }

    /// Build a `RequestFailed` from a non-success response.
    /// Uses the body's `message` field, as sent, when the body is JSON and
    /// carries one.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|json| {
                json.get("message")
                    .and_then(Value::as_str)
                    .filter(|m| !m.is_empty())
                    .map(str::to_owned)
            })
            .unwrap_or_else(|| Self::default_message(status));

        ApiError::RequestFailed { status, message }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::RequestFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The message the server sent, if the failure carried one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::RequestFailed { status, message }
                if *message != Self::default_message(*status) =>
            {
                Some(message)
            }
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if err.is_decode() {
            ApiError::InvalidResponse(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_uses_body_message() {
        let err = ApiError::from_status(403, r#"{"message": "Admin access required"}"#);
        assert_eq!(
            err,
            ApiError::RequestFailed {
                status: 403,
                message: "Admin access required".to_string()
            }
        );
        assert_eq!(err.to_string(), "Admin access required");
        assert_eq!(err.server_message(), Some("Admin access required"));
    }

    #[test]
    fn test_from_status_falls_back_to_generic_message() {
        let err = ApiError::from_status(502, "<html>Bad Gateway</html>");
        assert_eq!(err.to_string(), "Request failed (502)");
        assert_eq!(err.status(), Some(502));
        assert_eq!(err.server_message(), None);

        // JSON without a usable message
        let err = ApiError::from_status(500, r#"{"message": ""}"#);
        assert_eq!(err.to_string(), "Request failed (500)");
        let err = ApiError::from_status(500, r#"{"message": 42}"#);
        assert_eq!(err.to_string(), "Request failed (500)");
    }

    #[test]
    fn test_long_message_is_kept_whole() {
        let long = "é".repeat(400);
        let body = serde_json::json!({ "message": long }).to_string();
        let err = ApiError::from_status(400, &body);
        assert_eq!(err.to_string(), long);
        assert_eq!(err.server_message(), Some(long.as_str()));
    }

    #[test]
    fn test_is_unauthorized() {
        assert!(ApiError::from_status(401, "").is_unauthorized());
        assert!(!ApiError::Timeout.is_unauthorized());
    }
}

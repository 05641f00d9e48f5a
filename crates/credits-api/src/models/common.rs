//! Common DTOs shared across multiple resources

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Standard error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        error: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: Some(details),
        }
    }
}

pub(crate) fn default_limit() -> i64 {
    20
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_new() {
        let err = ErrorResponse::new("not_found", "Payment order not found");
        assert_eq!(err.error, "not_found");
        assert!(err.details.is_none());
    }

    #[test]
    fn test_error_response_serialization() {
        let err = ErrorResponse::new("invalid_code", "Invalid promotion code");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("invalid_code"));
        // details should not be in output since it's None
        assert!(!json.contains("details"));
    }

    #[test]
    fn test_error_response_serialization_with_details() {
        let err = ErrorResponse::with_details(
            "insufficient_credits",
            "Not enough credits",
            serde_json::json!({"required": 5, "available": 2}),
        );
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"required\":5"));
    }
}

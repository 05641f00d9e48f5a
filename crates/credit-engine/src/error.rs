//! Error taxonomy for the credit engine
//!
//! Expected business outcomes (insufficient credits, rejected promotion
//! codes, illegal order transitions) are explicit variants so callers must
//! handle them. Storage failures carry the repository's `anyhow` context.

use thiserror::Error;

use crate::models::OrderStatus;

/// Result type alias using the engine's error type
pub type CreditResult<T> = std::result::Result<T, CreditError>;

/// Credit engine errors
#[derive(Debug, Error)]
pub enum CreditError {
    /// Malformed request (empty account id, unknown package, bad amount)
    #[error("Validation error: {0}")]
    Validation(String),

    /// The account cannot afford the requested debit
    #[error("Insufficient credits: required {required}, available {available}")]
    InsufficientCredits { required: i64, available: i64 },

    /// Any promotion rejection. The real reason is only logged.
    #[error("Invalid promotion code")]
    InvalidPromotionCode,

    /// Unknown entity
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Order lifecycle violation
    #[error("Invalid order transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// Webhook signature or timestamp did not verify
    #[error("Invalid webhook signature")]
    InvalidSignature,

    /// Payment provider unreachable or returned a malformed response
    #[error("Payment provider error: {0}")]
    Provider(String),

    /// Missing or invalid configuration (e.g. webhook signing secret)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Database or storage failure
    #[error("Storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl CreditError {
    /// Create a Validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a NotFound error
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Create a Provider error
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    /// Create a Configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Stable machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::InsufficientCredits { .. } => "insufficient_credits",
            Self::InvalidPromotionCode => "invalid_code",
            Self::NotFound { .. } => "not_found",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::InvalidSignature => "invalid_signature",
            Self::Provider(_) => "payment_provider_error",
            Self::Configuration(_) => "configuration_error",
            Self::Storage(_) => "internal_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_credits_message() {
        let err = CreditError::InsufficientCredits {
            required: 5,
            available: 2,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient credits: required 5, available 2"
        );
        assert_eq!(err.code(), "insufficient_credits");
    }

    #[test]
    fn test_promotion_error_hides_reason() {
        let err = CreditError::InvalidPromotionCode;
        assert_eq!(err.to_string(), "Invalid promotion code");
        assert_eq!(err.code(), "invalid_code");
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = CreditError::InvalidTransition {
            from: OrderStatus::Completed,
            to: OrderStatus::Cancelled,
        };
        assert_eq!(
            err.to_string(),
            "Invalid order transition from completed to cancelled"
        );
    }

    #[test]
    fn test_storage_error_from_anyhow() {
        let err: CreditError = anyhow::anyhow!("connection reset").into();
        assert!(matches!(err, CreditError::Storage(_)));
        assert_eq!(err.code(), "internal_error");
    }
}

//! Common handler helpers
//!
//! Every helper returns `Result<T, HttpResponse>` so handlers can bail out with
//! `match helper(..) { Ok(v) => v, Err(resp) => return resp }`.

use actix_web::{HttpRequest, HttpResponse};
use credit_engine::{CreditError, CreditResult};
use serde_json::json;
use tracing::{error, warn};
use validator::Validate;

use crate::middleware::{get_account_id, verify_admin_token, AdminAuthError, AdminToken};
use crate::models::ErrorResponse;

// ============================================================================
// Authentication Helpers
// ============================================================================

/// Account id forwarded by the gateway, or 401
pub fn extract_account_id_or_unauthorized(req: &HttpRequest) -> Result<String, HttpResponse> {
    get_account_id(req).map_err(|reason| {
        warn!(path = %req.path(), reason, "Request without a usable account id");
        unauthorized("Authentication required")
    })
}

/// Operator bearer token check: 503 when disabled, 401 otherwise
pub fn require_admin(req: &HttpRequest, token: &AdminToken) -> Result<(), HttpResponse> {
    verify_admin_token(req, token).map_err(|e| match e {
        AdminAuthError::Disabled => HttpResponse::ServiceUnavailable().json(ErrorResponse::new(
            "service_unavailable",
            "Admin endpoints are not configured",
        )),
        AdminAuthError::Missing | AdminAuthError::Invalid => unauthorized("Invalid admin token"),
    })
}

// ============================================================================
// Validation Helpers
// ============================================================================

/// Validate a request struct or return 400
pub fn validate_request<T: Validate>(req: &T) -> Result<(), HttpResponse> {
    req.validate().map_err(|e| {
        HttpResponse::BadRequest().json(ErrorResponse::new(
            "validation_error",
            format!("Validation failed: {}", e),
        ))
    })
}

// ============================================================================
// Error Handling Helpers
// ============================================================================

/// Map an engine error onto its HTTP response
///
/// Storage and provider details are logged, never returned.
pub fn engine_error_response(err: &CreditError, context: &str) -> HttpResponse {
    let code = err.code();
    match err {
        CreditError::Validation(msg) => {
            HttpResponse::BadRequest().json(ErrorResponse::new(code, msg.as_str()))
        }
        CreditError::InvalidPromotionCode => {
            HttpResponse::BadRequest().json(ErrorResponse::new(code, "Invalid promotion code"))
        }
        CreditError::InsufficientCredits {
            required,
            available,
        } => HttpResponse::PaymentRequired().json(ErrorResponse::with_details(
            code,
            "Insufficient credits",
            json!({ "required": required, "available": available }),
        )),
        CreditError::NotFound { entity, .. } => HttpResponse::NotFound()
            .json(ErrorResponse::new(code, format!("{} not found", entity))),
        CreditError::InvalidTransition { .. } => {
            HttpResponse::Conflict().json(ErrorResponse::new(code, err.to_string()))
        }
        CreditError::InvalidSignature => HttpResponse::Unauthorized()
            .json(ErrorResponse::new(code, "Webhook signature verification failed")),
        CreditError::Provider(detail) => {
            error!(context, detail = %detail, "Payment provider error");
            HttpResponse::BadGateway().json(ErrorResponse::new(
                code,
                "Payment provider is unavailable. Please try again later.",
            ))
        }
        CreditError::Configuration(detail) => {
            error!(context, detail = %detail, "Service misconfigured");
            HttpResponse::ServiceUnavailable().json(ErrorResponse::new(
                code,
                "Payment service not configured",
            ))
        }
        CreditError::Storage(e) => {
            error!(context, error = %format!("{:#}", e), "Storage error");
            HttpResponse::InternalServerError().json(ErrorResponse::new(
                code,
                format!("Failed to {}", context),
            ))
        }
    }
}

/// Unwrap an engine result or convert its error to a response
pub fn handle_engine_error<T>(result: CreditResult<T>, context: &str) -> Result<T, HttpResponse> {
    result.map_err(|e| engine_error_response(&e, context))
}

/// 400 with a custom message
pub fn bad_request(message: &str) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorResponse::new("bad_request", message))
}

/// 401 with a custom message
pub fn unauthorized(message: &str) -> HttpResponse {
    HttpResponse::Unauthorized().json(ErrorResponse::new("unauthorized", message))
}

//! Caller identity
//!
//! The service sits behind the platform gateway, which authenticates users
//! and forwards the account id in `X-Account-Id`. Operator endpoints are
//! guarded by a static bearer token compared in constant time.

use actix_web::HttpRequest;
use subtle::ConstantTimeEq;
use tracing::warn;

/// Header carrying the authenticated account id
pub const ACCOUNT_HEADER: &str = "X-Account-Id";

const MAX_ACCOUNT_ID_LEN: usize = 255;

/// Operator token held in app data. `None` disables the admin endpoints.
///
/// Both the configured and the presented token are trimmed before comparison.
#[derive(Clone)]
pub struct AdminToken(Option<String>);

impl AdminToken {
    pub fn new(token: Option<String>) -> Self {
        Self(
            token
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminAuthError {
    /// No admin token configured
    Disabled,
    Missing,
    Invalid,
}

/// Read the forwarded account id
pub fn get_account_id(req: &HttpRequest) -> Result<String, &'static str> {
    let raw = req
        .headers()
        .get(ACCOUNT_HEADER)
        .ok_or("Missing account header")?
        .to_str()
        .map_err(|_| "Account header is not valid text")?;

    let account_id = raw.trim();
    if account_id.is_empty() {
        return Err("Account header is empty");
    }
    if account_id.len() > MAX_ACCOUNT_ID_LEN || account_id.chars().any(char::is_control) {
        return Err("Account header is malformed");
    }
    Ok(account_id.to_string())
}

/// Check `Authorization: Bearer <token>` against the configured operator token
pub fn verify_admin_token(req: &HttpRequest, expected: &AdminToken) -> Result<(), AdminAuthError> {
    let expected = expected.0.as_deref().ok_or(AdminAuthError::Disabled)?;

    let provided = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or(AdminAuthError::Missing)?;

    if provided.len() == expected.len() && bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        warn!(path = %req.path(), "Admin request rejected: invalid token");
        Err(AdminAuthError::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_account_header_extracted() {
        let req = TestRequest::default()
            .insert_header((ACCOUNT_HEADER, " acct_42 "))
            .to_http_request();
        assert_eq!(get_account_id(&req).unwrap(), "acct_42");
    }

    #[test]
    fn test_missing_or_blank_account_header() {
        let req = TestRequest::default().to_http_request();
        assert!(get_account_id(&req).is_err());

        let req = TestRequest::default()
            .insert_header((ACCOUNT_HEADER, "   "))
            .to_http_request();
        assert!(get_account_id(&req).is_err());
    }

    #[test]
    fn test_overlong_account_header_rejected() {
        let req = TestRequest::default()
            .insert_header((ACCOUNT_HEADER, "a".repeat(256)))
            .to_http_request();
        assert!(get_account_id(&req).is_err());
    }

    #[test]
    fn test_admin_token() {
        let token = AdminToken::new(Some("op-secret".to_string()));

        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer op-secret"))
            .to_http_request();
        assert_eq!(verify_admin_token(&req, &token), Ok(()));

        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer op-secreT"))
            .to_http_request();
        assert_eq!(verify_admin_token(&req, &token), Err(AdminAuthError::Invalid));

        let req = TestRequest::default().to_http_request();
        assert_eq!(verify_admin_token(&req, &token), Err(AdminAuthError::Missing));
    }

    #[test]
    fn test_admin_token_whitespace_ignored_on_both_sides() {
        let token = AdminToken::new(Some("  op-secret\n".to_string()));

        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer op-secret"))
            .to_http_request();
        assert_eq!(verify_admin_token(&req, &token), Ok(()));

        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer  op-secret "))
            .to_http_request();
        assert_eq!(verify_admin_token(&req, &token), Ok(()));
    }

    #[test]
    fn test_admin_disabled_without_token() {
        let token = AdminToken::new(Some("  ".to_string()));
        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer anything"))
            .to_http_request();
        assert_eq!(verify_admin_token(&req, &token), Err(AdminAuthError::Disabled));
    }
}

//! CORS configuration
//!
//! - `CORS_ALLOWED_ORIGINS`: comma-separated origins. Development falls back
//!   to local frontends; production must set it and only HTTPS is accepted.
//! - `ENVIRONMENT`: `production` enables the strict rules.
//!
//! The payment webhook is called server-to-server and is unaffected.

use actix_cors::Cors;
use actix_web::http::header::{self, HeaderName};
use std::env;
use tracing::{debug, warn};

use super::account::ACCOUNT_HEADER;

const DEV_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

/// Build the CORS middleware from the environment
pub fn cors() -> Cors {
    let is_production = env::var("ENVIRONMENT")
        .map(|e| e.eq_ignore_ascii_case("production"))
        .unwrap_or(false);

    let raw = env::var("CORS_ALLOWED_ORIGINS").unwrap_or_else(|_| {
        if is_production {
            warn!("CORS_ALLOWED_ORIGINS not set in production; cross-origin requests are blocked");
            String::new()
        } else {
            DEV_ORIGINS.to_string()
        }
    });

    let origins = parse_allowed_origins(&raw, is_production);
    debug!(count = origins.len(), "CORS origins configured");

    let mut cors = Cors::default();
    for origin in &origins {
        cors = cors.allowed_origin(origin);
    }

    cors.allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
        .allowed_headers(vec![
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static("x-account-id"),
        ])
        .expose_headers(vec![header::CONTENT_TYPE])
        .max_age(3600)
}

/// Split and filter the configured origin list
///
/// Wildcards and non-http(s) values are dropped; production also drops
/// plain `http://` origins.
pub fn parse_allowed_origins(raw: &str, is_production: bool) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter(|origin| {
            if *origin == "*" {
                warn!("Wildcard CORS origin ignored");
                return false;
            }
            if !origin.starts_with("http://") && !origin.starts_with("https://") {
                warn!(origin = %origin, "Invalid CORS origin ignored");
                return false;
            }
            if is_production && !origin.starts_with("https://") {
                warn!(origin = %origin, "Non-HTTPS CORS origin ignored in production");
                return false;
            }
            true
        })
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::{call_service, init_service, TestRequest};
    use actix_web::{web, App, HttpResponse};

    #[test]
    fn test_parse_origins_development() {
        let origins = parse_allowed_origins("http://localhost:3000, https://app.example.com,,", false);
        assert_eq!(origins, vec!["http://localhost:3000", "https://app.example.com"]);
    }

    #[test]
    fn test_parse_origins_production_requires_https() {
        let origins = parse_allowed_origins("http://localhost:3000,https://app.example.com", true);
        assert_eq!(origins, vec!["https://app.example.com"]);
    }

    #[test]
    fn test_parse_origins_rejects_wildcard_and_garbage() {
        assert!(parse_allowed_origins("*,ftp://files.example.com,example.com", false).is_empty());
    }

    #[test]
    fn test_account_header_name_matches() {
        assert!(ACCOUNT_HEADER.eq_ignore_ascii_case("x-account-id"));
    }

    #[actix_web::test]
    async fn test_cors_blocks_unknown_origin() {
        let app = init_service(
            App::new()
                .wrap(cors())
                .route("/test", web::get().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;

        let req = TestRequest::get()
            .uri("/test")
            .insert_header(("Origin", "http://evil.example"))
            .to_request();
        let resp = call_service(&app, req).await;
        assert!(!resp.headers().contains_key("access-control-allow-origin"));
    }
}

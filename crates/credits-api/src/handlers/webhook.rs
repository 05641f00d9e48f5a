//! Payment provider webhook
//!
//! `POST /api/v1/payments/webhook`
//!
//! The raw body is verified against `X-Payment-Signature` and
//! `X-Payment-Timestamp` before it is parsed. Every verified delivery is
//! acknowledged with 200, including duplicates and unknown orders, so the
//! provider stops retrying. Storage failures return 500 so it retries.

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use credit_engine::CreditEngine;
use tracing::{debug, info};

use crate::{
    handlers::helpers::handle_engine_error,
    models::{ErrorResponse, WebhookAck},
};

pub const SIGNATURE_HEADER: &str = "X-Payment-Signature";
pub const TIMESTAMP_HEADER: &str = "X-Payment-Timestamp";

fn header<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|h| h.to_str().ok())
}

/// Receive a payment provider notification
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    tag = "Payments",
    params(
        ("X-Payment-Signature" = String, Header, description = "v1=<hex HMAC-SHA256>, comma-separated during key rotation"),
        ("X-Payment-Timestamp" = String, Header, description = "Milliseconds since the epoch")
    ),
    request_body(content = String, description = "Provider event JSON", content_type = "application/json"),
    responses(
        (status = 200, description = "Delivery acknowledged", body = WebhookAck),
        (status = 400, description = "Malformed payload", body = ErrorResponse),
        (status = 401, description = "Signature verification failed", body = ErrorResponse),
        (status = 503, description = "Webhook secret not configured", body = ErrorResponse)
    )
)]
pub async fn handle_payment_webhook(
    engine: web::Data<CreditEngine>,
    req_http: HttpRequest,
    payload: web::Bytes,
) -> impl Responder {
    debug!(bytes = payload.len(), "Payment webhook received");

    let outcome = match handle_engine_error(
        engine
            .payments
            .ingest_webhook(
                &payload,
                header(&req_http, SIGNATURE_HEADER),
                header(&req_http, TIMESTAMP_HEADER),
            )
            .await,
        "process payment webhook",
    ) {
        Ok(o) => o,
        Err(resp) => return resp,
    };

    info!(status = outcome.label(), "Payment webhook acknowledged");
    HttpResponse::Ok().json(WebhookAck {
        received: true,
        status: outcome.label().to_string(),
    })
}

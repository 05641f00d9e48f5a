//! Credit package and payment order handlers
//!
//! # Endpoints
//!
//! - `GET /api/v1/packages` - purchasable bundles (public)
//! - `POST /api/v1/orders` - create an order with the payment provider
//! - `GET /api/v1/orders` - list the caller's orders
//! - `GET /api/v1/orders/{id}` - one order
//! - `POST /api/v1/orders/{id}/cancel` - cancel a pending order
//! - `GET /api/v1/orders/{id}/events` - audit trail of an order
//!
//! Credits are granted only by the provider webhook, never by these calls.

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use credit_engine::models::CREDIT_PACKAGES;
use credit_engine::CreditEngine;
use uuid::Uuid;

use crate::{
    handlers::helpers::{extract_account_id_or_unauthorized, handle_engine_error, validate_request},
    models::{
        CreateOrderRequest, CreateOrderResponse, ErrorResponse, OrderListQuery, OrderResponse,
        PackageResponse, PaymentEventResponse,
    },
};

/// List purchasable credit packages
#[utoipa::path(
    get,
    path = "/api/v1/packages",
    tag = "Orders",
    responses(
        (status = 200, description = "Credit packages", body = Vec<PackageResponse>)
    )
)]
pub async fn list_packages(engine: web::Data<CreditEngine>) -> impl Responder {
    let currency = engine.payments.currency();
    let packages: Vec<PackageResponse> = CREDIT_PACKAGES
        .iter()
        .map(|p| PackageResponse::new(p, currency))
        .collect();
    HttpResponse::Ok().json(packages)
}

/// Create a payment order
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    tag = "Orders",
    request_body = CreateOrderRequest,
    security(("account_id" = [])),
    responses(
        (status = 201, description = "Order created", body = CreateOrderResponse),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 502, description = "Payment provider error", body = ErrorResponse),
        (status = 503, description = "Payments not configured", body = ErrorResponse)
    )
)]
pub async fn create_order(
    engine: web::Data<CreditEngine>,
    req_http: HttpRequest,
    req: web::Json<CreateOrderRequest>,
) -> impl Responder {
    let account_id = match extract_account_id_or_unauthorized(&req_http) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    if let Err(resp) = validate_request(&*req) {
        return resp;
    }

    match handle_engine_error(
        engine
            .payments
            .create_order(&account_id, &req.bundle_requests())
            .await,
        "create payment order",
    ) {
        Ok(created) => HttpResponse::Created().json(CreateOrderResponse::from(created)),
        Err(resp) => resp,
    }
}

/// List the caller's orders, newest first
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    tag = "Orders",
    params(("limit" = Option<i64>, Query, description = "Maximum items to return (1-100)")),
    security(("account_id" = [])),
    responses(
        (status = 200, description = "Orders", body = Vec<OrderResponse>),
        (status = 400, description = "Validation error", body = ErrorResponse)
    )
)]
pub async fn list_orders(
    engine: web::Data<CreditEngine>,
    req_http: HttpRequest,
    query: web::Query<OrderListQuery>,
) -> impl Responder {
    let account_id = match extract_account_id_or_unauthorized(&req_http) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    if let Err(resp) = validate_request(&*query) {
        return resp;
    }

    match handle_engine_error(
        engine.payments.list_orders(&account_id, query.limit).await,
        "list payment orders",
    ) {
        Ok(orders) => {
            let response: Vec<OrderResponse> = orders.into_iter().map(Into::into).collect();
            HttpResponse::Ok().json(response)
        }
        Err(resp) => resp,
    }
}

/// Get one of the caller's orders
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    tag = "Orders",
    params(("id" = Uuid, Path, description = "Order ID")),
    security(("account_id" = [])),
    responses(
        (status = 200, description = "Order", body = OrderResponse),
        (status = 404, description = "Order not found", body = ErrorResponse)
    )
)]
pub async fn get_order(
    engine: web::Data<CreditEngine>,
    req_http: HttpRequest,
    path: web::Path<Uuid>,
) -> impl Responder {
    let account_id = match extract_account_id_or_unauthorized(&req_http) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match handle_engine_error(
        engine.payments.get_order(&account_id, path.into_inner()).await,
        "get payment order",
    ) {
        Ok(order) => HttpResponse::Ok().json(OrderResponse::from(order)),
        Err(resp) => resp,
    }
}

/// Cancel a pending or processing order
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/cancel",
    tag = "Orders",
    params(("id" = Uuid, Path, description = "Order ID")),
    security(("account_id" = [])),
    responses(
        (status = 200, description = "Order cancelled", body = OrderResponse),
        (status = 404, description = "Order not found", body = ErrorResponse),
        (status = 409, description = "Order can no longer be cancelled", body = ErrorResponse)
    )
)]
pub async fn cancel_order(
    engine: web::Data<CreditEngine>,
    req_http: HttpRequest,
    path: web::Path<Uuid>,
) -> impl Responder {
    let account_id = match extract_account_id_or_unauthorized(&req_http) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match handle_engine_error(
        engine
            .payments
            .cancel_order(&account_id, path.into_inner())
            .await,
        "cancel payment order",
    ) {
        Ok(order) => HttpResponse::Ok().json(OrderResponse::from(order)),
        Err(resp) => resp,
    }
}

/// Audit events recorded for an order
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}/events",
    tag = "Orders",
    params(("id" = Uuid, Path, description = "Order ID")),
    security(("account_id" = [])),
    responses(
        (status = 200, description = "Order events", body = Vec<PaymentEventResponse>),
        (status = 404, description = "Order not found", body = ErrorResponse)
    )
)]
pub async fn order_events(
    engine: web::Data<CreditEngine>,
    req_http: HttpRequest,
    path: web::Path<Uuid>,
) -> impl Responder {
    let account_id = match extract_account_id_or_unauthorized(&req_http) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match handle_engine_error(
        engine
            .payments
            .order_events(&account_id, path.into_inner())
            .await,
        "list order events",
    ) {
        Ok(events) => {
            let response: Vec<PaymentEventResponse> = events.into_iter().map(Into::into).collect();
            HttpResponse::Ok().json(response)
        }
        Err(resp) => resp,
    }
}

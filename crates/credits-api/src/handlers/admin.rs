//! Operator endpoints
//!
//! Guarded by `Authorization: Bearer <ADMIN_API_TOKEN>`. Without a configured
//! token every route answers 503.
//!
//! - pricing catalog: list, upsert, activate/deactivate
//! - promotion codes: create, get, deactivate
//! - refunds and balance audits for any account

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use credit_engine::models::ServiceCode;
use credit_engine::CreditEngine;
use tracing::info;

use crate::{
    handlers::helpers::{bad_request, handle_engine_error, require_admin, validate_request},
    middleware::AdminToken,
    models::{
        BalanceCheckResponse, CreatePromotionRequest, ErrorResponse, LedgerEntryResponse,
        PriceListQuery, PriceResponse, PromotionResponse, RefundRequest, SetActiveRequest,
        UpsertPriceRequest,
    },
};

// ============================================================================
// Pricing
// ============================================================================

/// List catalog prices
#[utoipa::path(
    get,
    path = "/api/v1/admin/pricing",
    tag = "Admin",
    params(("include_inactive" = Option<bool>, Query, description = "Include deactivated services")),
    security(("admin_token" = [])),
    responses(
        (status = 200, description = "Prices", body = Vec<PriceResponse>),
        (status = 401, description = "Invalid admin token", body = ErrorResponse)
    )
)]
pub async fn list_prices(
    engine: web::Data<CreditEngine>,
    admin: web::Data<AdminToken>,
    req_http: HttpRequest,
    query: web::Query<PriceListQuery>,
) -> impl Responder {
    if let Err(resp) = require_admin(&req_http, &admin) {
        return resp;
    }

    match handle_engine_error(
        engine.pricing.list_prices(query.include_inactive).await,
        "list prices",
    ) {
        Ok(prices) => {
            let response: Vec<PriceResponse> = prices.into_iter().map(Into::into).collect();
            HttpResponse::Ok().json(response)
        }
        Err(resp) => resp,
    }
}

/// Set the credit cost of a service
#[utoipa::path(
    put,
    path = "/api/v1/admin/pricing/{service_code}",
    tag = "Admin",
    params(("service_code" = String, Path, description = "Catalog service code")),
    request_body = UpsertPriceRequest,
    security(("admin_token" = [])),
    responses(
        (status = 200, description = "Price saved", body = PriceResponse),
        (status = 400, description = "Validation error", body = ErrorResponse)
    )
)]
pub async fn upsert_price(
    engine: web::Data<CreditEngine>,
    admin: web::Data<AdminToken>,
    req_http: HttpRequest,
    path: web::Path<String>,
    req: web::Json<UpsertPriceRequest>,
) -> impl Responder {
    if let Err(resp) = require_admin(&req_http, &admin) {
        return resp;
    }
    if let Err(resp) = validate_request(&*req) {
        return resp;
    }

    let code = path.into_inner();
    if ServiceCode::parse(&code).is_none() {
        return bad_request(&format!("Unknown service: {}", code));
    }

    match handle_engine_error(
        engine.pricing.upsert_price(&code, req.credits).await,
        "save price",
    ) {
        Ok(entry) => {
            info!(service_code = %code, credits = entry.credits, "Price updated by operator");
            HttpResponse::Ok().json(PriceResponse::from(entry))
        }
        Err(resp) => resp,
    }
}

/// Activate or deactivate a service
#[utoipa::path(
    put,
    path = "/api/v1/admin/pricing/{service_code}/active",
    tag = "Admin",
    params(("service_code" = String, Path, description = "Catalog service code")),
    request_body = SetActiveRequest,
    security(("admin_token" = [])),
    responses(
        (status = 200, description = "Price updated", body = PriceResponse),
        (status = 404, description = "Service not in catalog", body = ErrorResponse)
    )
)]
pub async fn set_price_active(
    engine: web::Data<CreditEngine>,
    admin: web::Data<AdminToken>,
    req_http: HttpRequest,
    path: web::Path<String>,
    req: web::Json<SetActiveRequest>,
) -> impl Responder {
    if let Err(resp) = require_admin(&req_http, &admin) {
        return resp;
    }

    match handle_engine_error(
        engine.pricing.set_active(&path, req.is_active).await,
        "update price",
    ) {
        Ok(entry) => HttpResponse::Ok().json(PriceResponse::from(entry)),
        Err(resp) => resp,
    }
}

// ============================================================================
// Promotions
// ============================================================================

/// Create a promotion code
#[utoipa::path(
    post,
    path = "/api/v1/admin/promotions",
    tag = "Admin",
    request_body = CreatePromotionRequest,
    security(("admin_token" = [])),
    responses(
        (status = 201, description = "Promotion created", body = PromotionResponse),
        (status = 400, description = "Validation error", body = ErrorResponse)
    )
)]
pub async fn create_promotion(
    engine: web::Data<CreditEngine>,
    admin: web::Data<AdminToken>,
    req_http: HttpRequest,
    req: web::Json<CreatePromotionRequest>,
) -> impl Responder {
    if let Err(resp) = require_admin(&req_http, &admin) {
        return resp;
    }
    if let Err(resp) = validate_request(&*req) {
        return resp;
    }

    match handle_engine_error(
        engine
            .promotions
            .create_promotion(req.into_inner().into())
            .await,
        "create promotion",
    ) {
        Ok(promotion) => HttpResponse::Created().json(PromotionResponse::from(promotion)),
        Err(resp) => resp,
    }
}

/// Get a promotion code
#[utoipa::path(
    get,
    path = "/api/v1/admin/promotions/{code}",
    tag = "Admin",
    params(("code" = String, Path, description = "Promotion code (case-insensitive)")),
    security(("admin_token" = [])),
    responses(
        (status = 200, description = "Promotion", body = PromotionResponse),
        (status = 404, description = "Promotion not found", body = ErrorResponse)
    )
)]
pub async fn get_promotion(
    engine: web::Data<CreditEngine>,
    admin: web::Data<AdminToken>,
    req_http: HttpRequest,
    path: web::Path<String>,
) -> impl Responder {
    if let Err(resp) = require_admin(&req_http, &admin) {
        return resp;
    }

    match handle_engine_error(engine.promotions.get_promotion(&path).await, "get promotion") {
        Ok(promotion) => HttpResponse::Ok().json(PromotionResponse::from(promotion)),
        Err(resp) => resp,
    }
}

/// Deactivate a promotion code
#[utoipa::path(
    post,
    path = "/api/v1/admin/promotions/{code}/deactivate",
    tag = "Admin",
    params(("code" = String, Path, description = "Promotion code (case-insensitive)")),
    security(("admin_token" = [])),
    responses(
        (status = 200, description = "Promotion deactivated", body = PromotionResponse),
        (status = 404, description = "Promotion not found", body = ErrorResponse)
    )
)]
pub async fn deactivate_promotion(
    engine: web::Data<CreditEngine>,
    admin: web::Data<AdminToken>,
    req_http: HttpRequest,
    path: web::Path<String>,
) -> impl Responder {
    if let Err(resp) = require_admin(&req_http, &admin) {
        return resp;
    }

    match handle_engine_error(
        engine.promotions.deactivate_promotion(&path).await,
        "deactivate promotion",
    ) {
        Ok(promotion) => HttpResponse::Ok().json(PromotionResponse::from(promotion)),
        Err(resp) => resp,
    }
}

// ============================================================================
// Ledger
// ============================================================================

/// Refund credits to an account
#[utoipa::path(
    post,
    path = "/api/v1/admin/refunds",
    tag = "Admin",
    request_body = RefundRequest,
    security(("admin_token" = [])),
    responses(
        (status = 201, description = "Refund recorded", body = LedgerEntryResponse),
        (status = 400, description = "Validation error", body = ErrorResponse)
    )
)]
pub async fn refund_credits(
    engine: web::Data<CreditEngine>,
    admin: web::Data<AdminToken>,
    req_http: HttpRequest,
    req: web::Json<RefundRequest>,
) -> impl Responder {
    if let Err(resp) = require_admin(&req_http, &admin) {
        return resp;
    }
    if let Err(resp) = validate_request(&*req) {
        return resp;
    }

    let req = req.into_inner();
    match handle_engine_error(
        engine
            .ledger
            .refund(&req.account_id, req.amount, req.story_ref, req.purchase_ref)
            .await,
        "refund credits",
    ) {
        Ok(entry) => {
            info!(account_id = %req.account_id, amount = req.amount, "Operator refund recorded");
            HttpResponse::Created().json(LedgerEntryResponse::from(entry))
        }
        Err(resp) => resp,
    }
}

/// Compare an account's projected balance with its ledger sum
#[utoipa::path(
    get,
    path = "/api/v1/admin/accounts/{account_id}/balance-check",
    tag = "Admin",
    params(("account_id" = String, Path, description = "Account ID")),
    security(("admin_token" = [])),
    responses(
        (status = 200, description = "Balance check", body = BalanceCheckResponse)
    )
)]
pub async fn balance_check(
    engine: web::Data<CreditEngine>,
    admin: web::Data<AdminToken>,
    req_http: HttpRequest,
    path: web::Path<String>,
) -> impl Responder {
    if let Err(resp) = require_admin(&req_http, &admin) {
        return resp;
    }

    match handle_engine_error(engine.ledger.verify_balance(&path).await, "verify balance") {
        Ok(check) => HttpResponse::Ok().json(BalanceCheckResponse::new(&path, check)),
        Err(resp) => resp,
    }
}

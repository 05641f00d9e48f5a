//! Credit balance, ledger and promotion handlers
//!
//! # Endpoints
//!
//! - `GET /api/v1/credits/balance`
//! - `GET /api/v1/credits/history`
//! - `GET /api/v1/credits/can-afford`
//! - `POST /api/v1/credits/deduct`
//! - `POST /api/v1/credits/initial-grant`
//! - `POST /api/v1/credits/promotions/redeem`
//!
//! All endpoints act on the account in `X-Account-Id`.

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use credit_engine::models::{EventKind, HistoryQuery, LedgerRefs, ServiceCode};
use credit_engine::CreditEngine;
use tracing::info;

use crate::{
    handlers::helpers::{
        bad_request, extract_account_id_or_unauthorized, handle_engine_error, validate_request,
    },
    models::{
        AffordabilityQuery, AffordabilityResponse, BalanceResponse, DeductRequest, ErrorResponse,
        HistoryParams, InitialGrantResponse, LedgerEntryResponse, RedeemRequest, RedeemResponse,
    },
};

/// Get the balance of the calling account
#[utoipa::path(
    get,
    path = "/api/v1/credits/balance",
    tag = "Credits",
    security(("account_id" = [])),
    responses(
        (status = 200, description = "Current balance", body = BalanceResponse),
        (status = 401, description = "Missing account", body = ErrorResponse)
    )
)]
pub async fn get_balance(engine: web::Data<CreditEngine>, req_http: HttpRequest) -> impl Responder {
    let account_id = match extract_account_id_or_unauthorized(&req_http) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let balance = match handle_engine_error(
        engine.ledger.get_balance(&account_id).await,
        "get balance",
    ) {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    HttpResponse::Ok().json(BalanceResponse {
        account_id,
        balance,
    })
}

/// List ledger entries, newest first
#[utoipa::path(
    get,
    path = "/api/v1/credits/history",
    tag = "Credits",
    params(
        ("limit" = Option<i64>, Query, description = "Maximum items to return (1-100)"),
        ("offset" = Option<i64>, Query, description = "Number of items to skip"),
        ("event_kind" = Option<String>, Query, description = "Filter by ledger event kind")
    ),
    security(("account_id" = [])),
    responses(
        (status = 200, description = "Ledger entries", body = Vec<LedgerEntryResponse>),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 401, description = "Missing account", body = ErrorResponse)
    )
)]
pub async fn get_history(
    engine: web::Data<CreditEngine>,
    req_http: HttpRequest,
    query: web::Query<HistoryParams>,
) -> impl Responder {
    let account_id = match extract_account_id_or_unauthorized(&req_http) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    if let Err(resp) = validate_request(&*query) {
        return resp;
    }

    let event_kind = match query.event_kind.as_deref() {
        Some(raw) => match raw.parse::<EventKind>() {
            Ok(kind) => Some(kind),
            Err(_) => return bad_request(&format!("Unknown event kind: {}", raw)),
        },
        None => None,
    };

    let history = HistoryQuery {
        limit: query.limit,
        offset: query.offset,
        event_kind,
    };

    let entries = match handle_engine_error(
        engine.ledger.get_history(&account_id, &history).await,
        "list ledger history",
    ) {
        Ok(e) => e,
        Err(resp) => return resp,
    };

    let response: Vec<LedgerEntryResponse> = entries.into_iter().map(Into::into).collect();
    HttpResponse::Ok().json(response)
}

/// Advisory affordability check for a service or an explicit amount
#[utoipa::path(
    get,
    path = "/api/v1/credits/can-afford",
    tag = "Credits",
    params(
        ("service" = Option<String>, Query, description = "Catalog service code"),
        ("amount" = Option<i64>, Query, description = "Explicit credit amount")
    ),
    security(("account_id" = [])),
    responses(
        (status = 200, description = "Affordability", body = AffordabilityResponse),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 404, description = "Service not priced", body = ErrorResponse)
    )
)]
pub async fn can_afford(
    engine: web::Data<CreditEngine>,
    req_http: HttpRequest,
    query: web::Query<AffordabilityQuery>,
) -> impl Responder {
    let account_id = match extract_account_id_or_unauthorized(&req_http) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    if let Err(resp) = validate_request(&*query) {
        return resp;
    }

    let required = match (query.service.as_deref(), query.amount) {
        (Some(service), _) => match price_of(&engine, service).await {
            Ok(credits) => credits,
            Err(resp) => return resp,
        },
        (None, Some(amount)) => amount,
        (None, None) => return bad_request("Either service or amount is required"),
    };

    let balance = match handle_engine_error(
        engine.ledger.get_balance(&account_id).await,
        "get balance",
    ) {
        Ok(b) => b,
        Err(resp) => return resp,
    };

    HttpResponse::Ok().json(AffordabilityResponse {
        can_afford: balance >= required,
        required,
        balance,
    })
}

/// Charge a catalog service to the calling account
#[utoipa::path(
    post,
    path = "/api/v1/credits/deduct",
    tag = "Credits",
    request_body = DeductRequest,
    security(("account_id" = [])),
    responses(
        (status = 200, description = "Debit recorded", body = LedgerEntryResponse),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 402, description = "Insufficient credits", body = ErrorResponse),
        (status = 404, description = "Service not priced", body = ErrorResponse)
    )
)]
pub async fn deduct_credits(
    engine: web::Data<CreditEngine>,
    req_http: HttpRequest,
    req: web::Json<DeductRequest>,
) -> impl Responder {
    let account_id = match extract_account_id_or_unauthorized(&req_http) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    if let Err(resp) = validate_request(&*req) {
        return resp;
    }

    let Some(service) = ServiceCode::parse(&req.service) else {
        return bad_request(&format!("Unknown service: {}", req.service));
    };
    let credits = match price_of(&engine, service.as_str()).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let req = req.into_inner();
    let refs = LedgerRefs {
        story_ref: req.story_ref,
        purchase_ref: None,
        description: req.description,
    };

    let entry = match handle_engine_error(
        engine
            .ledger
            .deduct_credits(&account_id, credits, service.charge_kind(), refs)
            .await,
        "deduct credits",
    ) {
        Ok(e) => e,
        Err(resp) => return resp,
    };

    info!(account_id = %account_id, service = %service, credits, "Service charged");
    HttpResponse::Ok().json(LedgerEntryResponse::from(entry))
}

/// Apply the one-time signup grant
#[utoipa::path(
    post,
    path = "/api/v1/credits/initial-grant",
    tag = "Credits",
    security(("account_id" = [])),
    responses(
        (status = 200, description = "Grant result", body = InitialGrantResponse),
        (status = 401, description = "Missing account", body = ErrorResponse)
    )
)]
pub async fn initial_grant(engine: web::Data<CreditEngine>, req_http: HttpRequest) -> impl Responder {
    let account_id = match extract_account_id_or_unauthorized(&req_http) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let entry = match handle_engine_error(
        engine.ledger.grant_initial_credits(&account_id).await,
        "grant initial credits",
    ) {
        Ok(e) => e,
        Err(resp) => return resp,
    };

    let response = match entry {
        Some(entry) => InitialGrantResponse {
            granted: true,
            credits: entry.amount,
            balance: entry.balance_after,
        },
        None => {
            let balance = match handle_engine_error(
                engine.ledger.get_balance(&account_id).await,
                "get balance",
            ) {
                Ok(b) => b,
                Err(resp) => return resp,
            };
            InitialGrantResponse {
                granted: false,
                credits: 0,
                balance,
            }
        }
    };

    HttpResponse::Ok().json(response)
}

/// Redeem a promotion code
///
/// Every rejection returns the same `invalid_code` error.
#[utoipa::path(
    post,
    path = "/api/v1/credits/promotions/redeem",
    tag = "Credits",
    request_body = RedeemRequest,
    security(("account_id" = [])),
    responses(
        (status = 200, description = "Code redeemed", body = RedeemResponse),
        (status = 400, description = "Invalid promotion code", body = ErrorResponse),
        (status = 401, description = "Missing account", body = ErrorResponse)
    )
)]
pub async fn redeem_promotion(
    engine: web::Data<CreditEngine>,
    req_http: HttpRequest,
    req: web::Json<RedeemRequest>,
) -> impl Responder {
    let account_id = match extract_account_id_or_unauthorized(&req_http) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    if let Err(resp) = validate_request(&*req) {
        return resp;
    }

    match handle_engine_error(
        engine.promotions.redeem(&account_id, &req.code).await,
        "redeem promotion code",
    ) {
        Ok(redeemed) => HttpResponse::Ok().json(RedeemResponse::from(redeemed)),
        Err(resp) => resp,
    }
}

/// Active catalog price, or a 400/404 response
async fn price_of(engine: &CreditEngine, service: &str) -> Result<i64, HttpResponse> {
    if ServiceCode::parse(service).is_none() {
        return Err(bad_request(&format!("Unknown service: {}", service)));
    }
    match handle_engine_error(engine.pricing.get_cost(service).await, "look up price")? {
        Some(credits) => Ok(credits),
        None => Err(HttpResponse::NotFound().json(ErrorResponse::new(
            "not_found",
            format!("Service {} is not currently priced", service),
        ))),
    }
}

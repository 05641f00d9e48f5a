//! Edit quota handlers
//!
//! Clients ask for permission before an edit, then report the edit once it
//! has succeeded. The charge is always recomputed at record time.

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use credit_engine::CreditEngine;

use crate::{
    handlers::helpers::{extract_account_id_or_unauthorized, handle_engine_error, validate_request},
    models::{
        EditKindQuery, EditPermissionResponse, EditPreviewResponse, EditReceiptResponse,
        EditUsageResponse, ErrorResponse, PreviewQuery, RecordEditRequest,
    },
};

/// Check whether the next edit is free or affordable
#[utoipa::path(
    get,
    path = "/api/v1/edits/permission",
    tag = "Edits",
    params(("kind" = String, Query, description = "Edit kind: text or image")),
    security(("account_id" = [])),
    responses(
        (status = 200, description = "Permission", body = EditPermissionResponse),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 401, description = "Missing account", body = ErrorResponse)
    )
)]
pub async fn check_edit_permission(
    engine: web::Data<CreditEngine>,
    req_http: HttpRequest,
    query: web::Query<EditKindQuery>,
) -> impl Responder {
    let account_id = match extract_account_id_or_unauthorized(&req_http) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match handle_engine_error(
        engine.edits.check_permission(&account_id, query.kind).await,
        "check edit permission",
    ) {
        Ok(permission) => HttpResponse::Ok().json(EditPermissionResponse::from(permission)),
        Err(resp) => resp,
    }
}

/// Record a successful edit and charge it if it is past the free quota
#[utoipa::path(
    post,
    path = "/api/v1/edits",
    tag = "Edits",
    request_body = RecordEditRequest,
    security(("account_id" = [])),
    responses(
        (status = 201, description = "Edit recorded", body = EditReceiptResponse),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 402, description = "Insufficient credits", body = ErrorResponse)
    )
)]
pub async fn record_edit(
    engine: web::Data<CreditEngine>,
    req_http: HttpRequest,
    req: web::Json<RecordEditRequest>,
) -> impl Responder {
    let account_id = match extract_account_id_or_unauthorized(&req_http) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    if let Err(resp) = validate_request(&*req) {
        return resp;
    }

    let req = req.into_inner();
    match handle_engine_error(
        engine
            .edits
            .record_successful_edit(&account_id, req.kind, req.story_ref, req.metadata)
            .await,
        "record edit",
    ) {
        Ok(receipt) => HttpResponse::Created().json(EditReceiptResponse::from(receipt)),
        Err(resp) => resp,
    }
}

/// Cost breakdown of the next `count` edits
#[utoipa::path(
    get,
    path = "/api/v1/edits/preview",
    tag = "Edits",
    params(
        ("kind" = String, Query, description = "Edit kind: text or image"),
        ("count" = Option<i64>, Query, description = "Number of edits to preview (1-50)")
    ),
    security(("account_id" = [])),
    responses(
        (status = 200, description = "Preview", body = EditPreviewResponse),
        (status = 400, description = "Validation error", body = ErrorResponse)
    )
)]
pub async fn preview_edits(
    engine: web::Data<CreditEngine>,
    req_http: HttpRequest,
    query: web::Query<PreviewQuery>,
) -> impl Responder {
    let account_id = match extract_account_id_or_unauthorized(&req_http) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    if let Err(resp) = validate_request(&*query) {
        return resp;
    }

    match handle_engine_error(
        engine
            .edits
            .preview_edits(&account_id, query.kind, query.count)
            .await,
        "preview edits",
    ) {
        Ok(preview) => HttpResponse::Ok().json(EditPreviewResponse::from(preview)),
        Err(resp) => resp,
    }
}

/// Per-kind usage counts and next-edit cost
#[utoipa::path(
    get,
    path = "/api/v1/edits/usage",
    tag = "Edits",
    security(("account_id" = [])),
    responses(
        (status = 200, description = "Usage", body = Vec<EditUsageResponse>),
        (status = 401, description = "Missing account", body = ErrorResponse)
    )
)]
pub async fn edit_usage(engine: web::Data<CreditEngine>, req_http: HttpRequest) -> impl Responder {
    let account_id = match extract_account_id_or_unauthorized(&req_http) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match handle_engine_error(engine.edits.usage_stats(&account_id).await, "get edit usage") {
        Ok(usage) => {
            let response: Vec<EditUsageResponse> = usage.into_iter().map(Into::into).collect();
            HttpResponse::Ok().json(response)
        }
        Err(resp) => resp,
    }
}

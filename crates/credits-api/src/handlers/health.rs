//! Credit store health and API discovery

use actix_web::{http::StatusCode, web, HttpResponse, Responder};
use serde::Serialize;
use shared::db::LedgerStatus;
use shared::DbPool;
use utoipa::{OpenApi, ToSchema};

use crate::openapi::ApiDoc;

/// Whether the credit ledger can be read, and at which schema version
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// `ok` when ledger reads succeed, `degraded` otherwise
    pub status: &'static str,
    pub ledger_reachable: bool,
    /// Latest applied migration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<i64>,
    pub version: &'static str,
}

impl HealthResponse {
    fn from_status(status: &shared::Result<LedgerStatus>) -> Self {
        let (reachable, schema_version) = match status {
            Ok(s) => (true, s.schema_version),
            Err(_) => (false, None),
        };
        Self {
            status: if reachable { "ok" } else { "degraded" },
            ledger_reachable: reachable,
            schema_version,
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    fn http_status(&self) -> StatusCode {
        if self.ledger_reachable {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Credit store health
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "Health",
    responses(
        (status = 200, description = "Ledger is readable", body = HealthResponse),
        (status = 503, description = "Ledger is unreachable", body = HealthResponse)
    )
)]
pub async fn health_check(pool: web::Data<DbPool>) -> impl Responder {
    let status = shared::db::ledger_status(&pool).await;
    if let Err(e) = &status {
        tracing::warn!(error = %e, "Credit ledger health check failed");
    }

    let report = HealthResponse::from_status(&status);
    HttpResponse::build(report.http_status()).json(report)
}

/// OpenAPI document
#[utoipa::path(
    get,
    path = "/api/v1/openapi.json",
    tag = "Discovery",
    responses(
        (status = 200, description = "OpenAPI specification", content_type = "application/json")
    )
)]
pub async fn openapi_json() -> impl Responder {
    match ApiDoc::openapi().to_json() {
        Ok(doc) => HttpResponse::Ok().content_type("application/json").body(doc),
        Err(e) => {
            tracing::error!(error = %e, "Failed to render OpenAPI document");
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reachable_ledger_reports_schema_version() {
        let report = HealthResponse::from_status(&Ok(LedgerStatus {
            schema_version: Some(20260301000005),
            approx_accounts: 12,
        }));

        assert_eq!(report.http_status(), StatusCode::OK);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["ledger_reachable"], true);
        assert_eq!(json["schema_version"], 20260301000005_i64);
    }

    #[test]
    fn test_unreachable_ledger_is_unavailable() {
        let report = HealthResponse::from_status(&Err(shared::Error::internal("pool timed out")));

        assert_eq!(report.http_status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["ledger_reachable"], false);
        assert!(json.get("schema_version").is_none());
    }
}

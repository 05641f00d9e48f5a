//! Prometheus metrics
//!
//! HTTP metrics are recorded by [`PrometheusMetrics`]; the credit engine
//! records its own domain counters through the same global recorder.
//!
//! - `http_requests_total`, `http_request_duration_seconds`, `http_requests_in_flight`
//! - `credits.*` and `payments.*` counters emitted by the engine

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpResponse,
};
use futures_util::future::LocalBoxFuture;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::{
    future::{ready, Ready},
    sync::Arc,
    time::Instant,
};

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder once per process
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PROMETHEUS_HANDLE
        .get_or_try_init(|| {
            let handle = PrometheusBuilder::new().install_recorder()?;
            describe_all();
            Ok(handle)
        })
        .cloned()
}

fn describe_all() {
    describe_counter!("http_requests_total", "Total number of HTTP requests processed");
    describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );
    describe_gauge!(
        "http_requests_in_flight",
        "Number of HTTP requests currently being processed"
    );

    describe_counter!("credits.ledger.appends", "Ledger entries appended, by event kind");
    describe_counter!(
        "credits.debits.rejected",
        "Debits refused for insufficient credits, by event kind"
    );
    describe_counter!(
        "credits.pricing.fallback",
        "Charges priced with the fallback cost because the catalog had no entry"
    );
    describe_counter!("credits.promotions.redeemed", "Successful promotion redemptions");
    describe_counter!(
        "credits.promotions.rejected",
        "Rejected promotion redemptions, by internal reason"
    );
    describe_counter!("payments.webhooks.received", "Payment provider webhooks processed");
    describe_counter!("payments.orders.completed", "Payment orders credited");
    describe_counter!(
        "payments.orders.duplicate_completion",
        "Completion notifications for orders that were already credited"
    );
}

/// `GET /metrics`
pub async fn metrics_handler() -> HttpResponse {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4; charset=utf-8")
            .body(handle.render()),
        None => HttpResponse::ServiceUnavailable().body("metrics recorder not installed"),
    }
}

/// Request metrics middleware
#[derive(Clone)]
pub struct PrometheusMetrics {
    excluded_paths: Arc<Vec<String>>,
}

impl Default for PrometheusMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PrometheusMetrics {
    /// Excludes the scrape endpoint and health checks
    pub fn new() -> Self {
        Self::with_excluded_paths(vec!["/metrics".to_string(), "/api/v1/health".to_string()])
    }

    pub fn with_excluded_paths(paths: Vec<String>) -> Self {
        Self {
            excluded_paths: Arc::new(paths),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for PrometheusMetrics
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = PrometheusMetricsMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(PrometheusMetricsMiddleware {
            service,
            excluded_paths: self.excluded_paths.clone(),
        }))
    }
}

pub struct PrometheusMetricsMiddleware<S> {
    service: S,
    excluded_paths: Arc<Vec<String>>,
}

fn is_excluded(excluded_paths: &[String], path: &str) -> bool {
    excluded_paths.iter().any(|p| path.starts_with(p))
}

fn record(method: String, path: String, status: u16, start: Instant) {
    let status = status.to_string();
    counter!(
        "http_requests_total",
        "method" => method.clone(),
        "path" => path.clone(),
        "status" => status.clone()
    )
    .increment(1);
    histogram!(
        "http_request_duration_seconds",
        "method" => method,
        "path" => path,
        "status" => status
    )
    .record(start.elapsed().as_secs_f64());
}

impl<S, B> Service<ServiceRequest> for PrometheusMetricsMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start = Instant::now();
        let method = req.method().to_string();
        let path = normalize_path(req.path());
        let excluded = is_excluded(&self.excluded_paths, req.path());

        if !excluded {
            gauge!("http_requests_in_flight").increment(1.0);
        }

        let fut = self.service.call(req);

        Box::pin(async move {
            let result = fut.await;

            if !excluded {
                gauge!("http_requests_in_flight").decrement(1.0);
                let status = match &result {
                    Ok(response) => response.status().as_u16(),
                    Err(e) => e.as_response_error().status_code().as_u16(),
                };
                record(method, path, status, start);
            }

            result.map(ServiceResponse::map_into_left_body)
        })
    }
}

/// Replace order UUIDs and numeric ids with `{id}` to bound label cardinality
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|part| {
            let is_uuid = part.len() == 36 && part.chars().filter(|c| *c == '-').count() == 4;
            let is_numeric = !part.is_empty() && part.chars().all(|c| c.is_ascii_digit());
            if is_uuid || is_numeric {
                "{id}"
            } else {
                part
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::test::{call_service, init_service, TestRequest};
    use actix_web::{web, App};

    #[test]
    fn test_normalize_order_path() {
        assert_eq!(
            normalize_path("/api/v1/orders/123e4567-e89b-12d3-a456-426614174000/events"),
            "/api/v1/orders/{id}/events"
        );
    }

    #[test]
    fn test_normalize_static_path() {
        assert_eq!(normalize_path("/api/v1/credits/balance"), "/api/v1/credits/balance");
        assert_eq!(normalize_path("/api/v1/admin/pricing/text_edit"), "/api/v1/admin/pricing/text_edit");
    }

    #[test]
    fn test_excluded_paths() {
        let metrics = PrometheusMetrics::new();
        assert!(is_excluded(&metrics.excluded_paths, "/metrics"));
        assert!(is_excluded(&metrics.excluded_paths, "/api/v1/health"));
        assert!(!is_excluded(&metrics.excluded_paths, "/api/v1/orders"));
    }

    #[actix_web::test]
    async fn test_middleware_passes_responses_through() {
        let app = init_service(
            App::new()
                .wrap(PrometheusMetrics::new())
                .route("/ok", web::get().to(|| async { HttpResponse::Ok().finish() }))
                .route(
                    "/fail",
                    web::get().to(|| async { HttpResponse::PaymentRequired().finish() }),
                ),
        )
        .await;

        let resp = call_service(&app, TestRequest::get().uri("/ok").to_request()).await;
        assert!(resp.status().is_success());

        let resp =
            call_service(&app, TestRequest::get().uri("/fail").to_request()).await;
        assert_eq!(resp.status(), StatusCode::PAYMENT_REQUIRED);
    }

    #[actix_web::test]
    async fn test_metrics_handler_renders_after_init() {
        assert!(init_metrics().is_ok());
        let resp = metrics_handler().await;
        assert!(resp.status().is_success());
    }
}

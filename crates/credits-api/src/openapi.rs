//! OpenAPI documentation
//!
//! Generated from handler annotations with utoipa and served at
//! `/api/v1/openapi.json` and through Swagger UI at `/swagger-ui/`.

use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::handlers;
use crate::handlers::health::HealthResponse;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storyline Credits API",
        version = "1.0.0",
        description = "Credit accounting and payment settlement.\n\n## Authentication\n\n- Account endpoints read the authenticated account from the `X-Account-Id` header set by the gateway.\n- Admin endpoints require `Authorization: Bearer <ADMIN_API_TOKEN>`.\n- The payment webhook is authenticated by its HMAC signature.\n\n## Errors\n\nErrors use `{ error, message, details? }`. Insufficient credits return 402 with `details.required` and `details.available`.",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Development server")
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Discovery", description = "API discovery and metadata"),
        (name = "Credits", description = "Balance, ledger history, charges and promotion codes"),
        (name = "Edits", description = "Quota-aware edit charging"),
        (name = "Orders", description = "Credit packages and payment orders"),
        (name = "Payments", description = "Payment provider webhook"),
        (name = "Admin", description = "Pricing catalog, promotions, refunds and audits")
    ),
    modifiers(&SecurityAddon),
    paths(
        // Health
        handlers::health_check,
        // Discovery
        handlers::openapi_json,
        // Credits
        handlers::get_balance,
        handlers::get_history,
        handlers::can_afford,
        handlers::deduct_credits,
        handlers::initial_grant,
        handlers::redeem_promotion,
        // Edits
        handlers::check_edit_permission,
        handlers::record_edit,
        handlers::preview_edits,
        handlers::edit_usage,
        // Orders
        handlers::list_packages,
        handlers::create_order,
        handlers::list_orders,
        handlers::get_order,
        handlers::cancel_order,
        handlers::order_events,
        // Payments
        handlers::handle_payment_webhook,
        // Admin
        handlers::list_prices,
        handlers::upsert_price,
        handlers::set_price_active,
        handlers::create_promotion,
        handlers::get_promotion,
        handlers::deactivate_promotion,
        handlers::refund_credits,
        handlers::balance_check,
    ),
    components(
        schemas(
            // Common
            models::ErrorResponse,
            // Credits
            models::BalanceResponse,
            models::InitialGrantResponse,
            models::AffordabilityResponse,
            models::LedgerEntryResponse,
            models::DeductRequest,
            models::RedeemRequest,
            models::RedeemResponse,
            // Edits
            models::EditPermissionResponse,
            models::RecordEditRequest,
            models::EditReceiptResponse,
            models::EditCostItemResponse,
            models::EditPreviewResponse,
            models::EditUsageResponse,
            // Orders
            models::PackageResponse,
            models::BundleLineRequest,
            models::CreateOrderRequest,
            models::OrderLineResponse,
            models::OrderResponse,
            models::CreateOrderResponse,
            models::PaymentEventResponse,
            models::WebhookAck,
            // Admin
            models::PriceResponse,
            models::UpsertPriceRequest,
            models::SetActiveRequest,
            models::CreatePromotionRequest,
            models::PromotionResponse,
            models::RefundRequest,
            models::BalanceCheckResponse,
            // Health
            HealthResponse,
        )
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);

        components.add_security_scheme(
            "account_id",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                "X-Account-Id",
                "Authenticated account id, set by the gateway.",
            ))),
        );

        components.add_security_scheme(
            "admin_token",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .description(Some("Operator token (ADMIN_API_TOKEN)."))
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_core_paths() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/v1/credits/balance",
            "/api/v1/payments/webhook",
            "/api/v1/orders/{id}/cancel",
            "/api/v1/admin/promotions",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {}", path);
        }
    }

    #[test]
    fn test_openapi_security_schemes() {
        let doc = ApiDoc::openapi();
        let components = doc.components.unwrap();
        assert!(components.security_schemes.contains_key("account_id"));
        assert!(components.security_schemes.contains_key("admin_token"));
    }
}

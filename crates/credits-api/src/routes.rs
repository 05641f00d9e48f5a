//! Route configuration for the API

use actix_web::web;

use crate::handlers;

/// Configure all routes
///
/// Account-scoped routes read `X-Account-Id`; admin routes check the
/// operator token in their handlers.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            // Public
            .route("/health", web::get().to(handlers::health_check))
            .route("/openapi.json", web::get().to(handlers::openapi_json))
            .route("/packages", web::get().to(handlers::list_packages))
            // Provider webhook (signature verified)
            .route(
                "/payments/webhook",
                web::post().to(handlers::handle_payment_webhook),
            )
            .configure(configure_account_routes)
            .configure(configure_admin_routes),
    );
}

/// Routes acting on the caller's account
pub fn configure_account_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/credits")
            .route("/balance", web::get().to(handlers::get_balance))
            .route("/history", web::get().to(handlers::get_history))
            .route("/can-afford", web::get().to(handlers::can_afford))
            .route("/deduct", web::post().to(handlers::deduct_credits))
            .route("/initial-grant", web::post().to(handlers::initial_grant))
            .route(
                "/promotions/redeem",
                web::post().to(handlers::redeem_promotion),
            ),
    )
    .service(
        web::scope("/edits")
            .route("", web::post().to(handlers::record_edit))
            .route("/permission", web::get().to(handlers::check_edit_permission))
            .route("/preview", web::get().to(handlers::preview_edits))
            .route("/usage", web::get().to(handlers::edit_usage)),
    )
    .service(
        web::scope("/orders")
            .route("", web::post().to(handlers::create_order))
            .route("", web::get().to(handlers::list_orders))
            .route("/{id}", web::get().to(handlers::get_order))
            .route("/{id}/cancel", web::post().to(handlers::cancel_order))
            .route("/{id}/events", web::get().to(handlers::order_events)),
    );
}

/// Operator routes
pub fn configure_admin_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .route("/pricing", web::get().to(handlers::list_prices))
            .route("/pricing/{service_code}", web::put().to(handlers::upsert_price))
            .route(
                "/pricing/{service_code}/active",
                web::put().to(handlers::set_price_active),
            )
            .route("/promotions", web::post().to(handlers::create_promotion))
            .route("/promotions/{code}", web::get().to(handlers::get_promotion))
            .route(
                "/promotions/{code}/deactivate",
                web::post().to(handlers::deactivate_promotion),
            )
            .route("/refunds", web::post().to(handlers::refund_credits))
            .route(
                "/accounts/{account_id}/balance-check",
                web::get().to(handlers::balance_check),
            ),
    );
}

//! Middleware and request-level guards for the credits API

pub mod account;
pub mod cors;
pub mod metrics;

pub use account::{get_account_id, verify_admin_token, AdminAuthError, AdminToken, ACCOUNT_HEADER};
pub use cors::cors;
pub use metrics::{init_metrics, metrics_handler, PrometheusMetrics};

//! Shared library for the storyline credits backend
//!
//! This crate provides common functionality used by the credit engine and
//! the HTTP service that exposes it:
//! - Database connection pooling and migrations
//! - Error handling types
//! - Configuration management
//! - Logging infrastructure

pub mod config;
pub mod db;
pub mod error;

// Re-export commonly used types
pub use config::{Config, DatabaseConfig, PaymentProviderConfig, PricingConfig, ServerConfig};
pub use db::DbPool;
pub use error::{Error, Result};

/// Initialize tracing subscriber for structured logging
///
/// `RUST_LOG` controls filtering; `LOG_FORMAT=json` switches to JSON lines
/// for log shipping.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "shared=debug,credit_engine=debug,credits_api=debug,info".into()
    });

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

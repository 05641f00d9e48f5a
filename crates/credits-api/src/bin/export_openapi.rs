//! Print the OpenAPI specification as JSON
//!
//! Usage:
//!   cargo run -p credits-api --bin export-openapi > openapi.json

use anyhow::Context;
use credits_api::openapi::ApiDoc;
use utoipa::OpenApi;

fn main() -> anyhow::Result<()> {
    let openapi_json = ApiDoc::openapi()
        .to_pretty_json()
        .context("Failed to serialize OpenAPI spec to JSON")?;

    println!("{}", openapi_json);
    Ok(())
}

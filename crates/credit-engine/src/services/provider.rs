//! Outbound payment provider client
//!
//! Creating a remote order is the only outbound call the engine makes.
//! The trait is the seam used to test order creation without a network.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::{CreditError, CreditResult};

/// Order creation request sent to the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderOrderRequest {
    /// Amount in minor currency units
    pub amount: i64,
    pub currency: String,
    pub description: String,
    /// Our order id, echoed back by the provider
    pub merchant_order_ext_ref: String,
    #[serde(skip)]
    pub idempotency_key: String,
}

/// Remote order as returned by the provider
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderOrder {
    pub id: String,
    /// Public token handed to the client-side checkout
    pub token: String,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_order(&self, request: &ProviderOrderRequest) -> CreditResult<ProviderOrder>;
}

/// HTTP client for the merchant orders API
#[derive(Clone)]
pub struct MerchantApiClient {
    client: Client,
    base_url: String,
    secret_key: Option<String>,
}

impl MerchantApiClient {
    pub fn new(base_url: &str, secret_key: Option<String>, timeout: Duration) -> CreditResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CreditError::configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key: secret_key.filter(|k| !k.is_empty()),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.secret_key.is_some()
    }
}

#[async_trait]
impl PaymentProvider for MerchantApiClient {
    async fn create_order(&self, request: &ProviderOrderRequest) -> CreditResult<ProviderOrder> {
        let secret_key = self
            .secret_key
            .as_deref()
            .ok_or_else(|| CreditError::configuration("Payment API secret key is not configured"))?;

        let url = format!("{}/orders", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(secret_key)
            .header("Idempotency-Key", &request.idempotency_key)
            .json(request)
            .send()
            .await
            .map_err(|e| CreditError::provider(format!("Request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CreditError::provider(format!("Failed to read response: {}", e)))?;

        debug!(status = %status, "Payment provider create_order response");

        if status.is_success() {
            let order: ProviderOrder = serde_json::from_str(&body)
                .map_err(|e| CreditError::provider(format!("Malformed order response: {}", e)))?;
            info!(
                provider_order_id = %order.id,
                amount = request.amount,
                currency = %request.currency,
                "Payment provider order created"
            );
            Ok(order)
        } else {
            let detail = serde_json::from_str::<ProviderErrorBody>(&body)
                .ok()
                .and_then(|e| match (e.code, e.message) {
                    (Some(code), Some(message)) => Some(format!("{} - {}", code, message)),
                    (code, message) => code.or(message),
                })
                .unwrap_or(body);
            error!(status = %status, detail = %detail, "Payment provider order creation failed");
            Err(CreditError::provider(format!("{}: {}", status, detail)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization_omits_idempotency_key() {
        let request = ProviderOrderRequest {
            amount: 900,
            currency: "EUR".to_string(),
            description: "100 credits".to_string(),
            merchant_order_ext_ref: "order-1".to_string(),
            idempotency_key: "key-1".to_string(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["amount"], 900);
        assert_eq!(json["merchant_order_ext_ref"], "order-1");
        assert!(json.get("idempotency_key").is_none());
    }

    #[test]
    fn test_order_response_parsing() {
        let order: ProviderOrder =
            serde_json::from_str(r#"{"id": "ord_1", "token": "tok_1", "state": "pending", "extra": 1}"#)
                .unwrap();
        assert_eq!(order.id, "ord_1");
        assert_eq!(order.state.as_deref(), Some("pending"));
    }

    #[tokio::test]
    async fn test_unconfigured_client_refuses() {
        let client =
            MerchantApiClient::new("http://localhost:1", None, Duration::from_secs(1)).unwrap();
        assert!(!client.is_configured());
        let err = client
            .create_order(&ProviderOrderRequest {
                amount: 1,
                currency: "EUR".to_string(),
                description: String::new(),
                merchant_order_ext_ref: String::new(),
                idempotency_key: String::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CreditError::Configuration(_)));
    }
}

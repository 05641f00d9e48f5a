//! Credit package and payment order DTOs

use chrono::{DateTime, Utc};
use credit_engine::models::{
    BundleLine, BundleRequest, CreatedOrder, CreditPackage, PaymentEvent, PaymentOrder,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::common::default_limit;

/// A purchasable credit bundle
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PackageResponse {
    pub id: String,
    pub credits: i64,
    pub price_minor: i64,
    pub currency: String,
}

impl PackageResponse {
    pub fn new(package: &CreditPackage, currency: &str) -> Self {
        Self {
            id: package.id.to_string(),
            credits: package.credits,
            price_minor: package.price_minor,
            currency: currency.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct BundleLineRequest {
    pub package_id: String,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

fn default_quantity() -> i64 {
    1
}

/// Start a purchase of one or more credit packages
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, max = 10))]
    pub bundles: Vec<BundleLineRequest>,
}

impl CreateOrderRequest {
    pub fn bundle_requests(&self) -> Vec<BundleRequest> {
        self.bundles
            .iter()
            .map(|line| BundleRequest {
                package_id: line.package_id.clone(),
                quantity: line.quantity,
            })
            .collect()
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderLineResponse {
    pub package_id: String,
    pub quantity: i64,
    pub credits: i64,
    pub price_minor: i64,
}

impl From<BundleLine> for OrderLineResponse {
    fn from(line: BundleLine) -> Self {
        Self {
            package_id: line.package_id,
            quantity: line.quantity,
            credits: line.credits,
            price_minor: line.price_minor,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub status: String,
    pub amount_minor: i64,
    pub currency: String,
    pub credits: i64,
    pub bundle: Vec<OrderLineResponse>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<PaymentOrder> for OrderResponse {
    fn from(order: PaymentOrder) -> Self {
        Self {
            id: order.id,
            status: order.status.to_string(),
            amount_minor: order.amount_minor,
            currency: order.currency,
            credits: order.credits,
            bundle: order.bundle.0.into_iter().map(Into::into).collect(),
            created_at: order.created_at,
            completed_at: order.completed_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateOrderResponse {
    pub order: OrderResponse,
    /// Token for the provider's client-side checkout
    pub checkout_token: String,
}

impl From<CreatedOrder> for CreateOrderResponse {
    fn from(created: CreatedOrder) -> Self {
        Self {
            order: created.order.into(),
            checkout_token: created.checkout_token,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct OrderListQuery {
    #[validate(range(min = 1, max = 100))]
    #[serde(default = "default_limit")]
    pub limit: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PaymentEventResponse {
    pub id: i64,
    pub event_type: String,
    #[schema(value_type = Option<Object>)]
    pub payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl From<PaymentEvent> for PaymentEventResponse {
    fn from(event: PaymentEvent) -> Self {
        Self {
            id: event.id,
            event_type: event.event_type,
            payload: event.payload,
            created_at: event.created_at,
        }
    }
}

/// Acknowledgement returned to the payment provider
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
    /// processed, duplicate, order_not_found or ignored
    pub status: String,
}

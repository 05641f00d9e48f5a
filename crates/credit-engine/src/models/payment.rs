//! Payment orders, provider webhooks and the payment event audit trail

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use std::fmt;
use uuid::Uuid;

use super::{BundleLine, LedgerEntry};

/// Lifecycle status of a payment order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_order_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// pending → processing → {completed | failed | cancelled}
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        match (self, next) {
            (Self::Pending, Self::Processing) => true,
            (Self::Pending | Self::Processing, Self::Completed | Self::Failed | Self::Cancelled) => {
                true
            }
            _ => false,
        }
    }

    /// Statuses from which a transition to `next` is allowed
    pub fn sources_for(next: OrderStatus) -> &'static [OrderStatus] {
        match next {
            Self::Pending => &[],
            Self::Processing => &[Self::Pending],
            Self::Completed | Self::Failed | Self::Cancelled => &[Self::Pending, Self::Processing],
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Database model for the payment_orders table
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct PaymentOrder {
    pub id: Uuid,
    pub account_id: String,
    /// Price in minor currency units
    pub amount_minor: i64,
    pub currency: String,
    pub status: OrderStatus,
    pub provider_order_id: String,
    /// Client-facing token for the provider's checkout widget
    pub provider_token: String,
    /// Credits granted when the order completes
    pub credits: i64,
    pub bundle: Json<Vec<BundleLine>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Parameters for persisting a freshly created order
#[derive(Debug, Clone)]
pub struct NewPaymentOrder {
    pub id: Uuid,
    pub account_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub provider_order_id: String,
    pub provider_token: String,
    pub credits: i64,
    pub bundle: Vec<BundleLine>,
}

/// Database model for the payment_events table (append-only)
///
/// Webhook deliveries that match no order keep `order_id` empty and are
/// traceable through `provider_order_id`.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct PaymentEvent {
    pub id: i64,
    pub order_id: Option<Uuid>,
    pub provider_order_id: Option<String>,
    pub event_type: String,
    pub payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Audit event written in the same unit as the order change it describes
#[derive(Debug, Clone, PartialEq)]
pub struct NewPaymentEvent {
    pub event_type: &'static str,
    pub payload: Option<serde_json::Value>,
}

impl NewPaymentEvent {
    pub fn new(event_type: &'static str, payload: Option<serde_json::Value>) -> Self {
        Self {
            event_type,
            payload,
        }
    }
}

/// Event types recorded in the payment audit trail
pub mod event_types {
    pub const ORDER_CREATED: &str = "order_created";
    pub const WEBHOOK_RECEIVED: &str = "webhook_received";
    pub const ORDER_PROCESSING: &str = "order_processing";
    pub const ORDER_COMPLETED: &str = "order_completed";
    pub const ORDER_FAILED: &str = "order_failed";
    pub const ORDER_CANCELLED: &str = "order_cancelled";
    pub const DISPUTE_RECEIVED: &str = "dispute_received";
}

/// Card or wallet details returned by the provider on completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethodDetails {
    pub id: String,
    #[serde(rename = "type", default)]
    pub method_type: Option<String>,
    #[serde(default)]
    pub card_brand: Option<String>,
    #[serde(default)]
    pub card_last_four: Option<String>,
}

/// Database model for the saved_payment_methods table
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct SavedPaymentMethod {
    pub id: i64,
    pub account_id: String,
    pub provider_method_id: String,
    pub method_type: Option<String>,
    pub card_brand: Option<String>,
    pub card_last_four: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Known provider notification kinds, with an explicit catch-all
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProviderEvent {
    OrderCompleted,
    OrderAuthorised,
    OrderCancelled,
    OrderPaymentFailed,
    OrderPaymentDeclined,
    Dispute(String),
    Unknown(String),
}

impl ProviderEvent {
    pub fn name(&self) -> &str {
        match self {
            Self::OrderCompleted => "ORDER_COMPLETED",
            Self::OrderAuthorised => "ORDER_AUTHORISED",
            Self::OrderCancelled => "ORDER_CANCELLED",
            Self::OrderPaymentFailed => "ORDER_PAYMENT_FAILED",
            Self::OrderPaymentDeclined => "ORDER_PAYMENT_DECLINED",
            Self::Dispute(name) | Self::Unknown(name) => name,
        }
    }
}

impl From<String> for ProviderEvent {
    fn from(raw: String) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "ORDER_COMPLETED" => Self::OrderCompleted,
            "ORDER_AUTHORISED" | "ORDER_AUTHORIZED" => Self::OrderAuthorised,
            "ORDER_CANCELLED" | "ORDER_CANCELED" => Self::OrderCancelled,
            "ORDER_PAYMENT_FAILED" => Self::OrderPaymentFailed,
            "ORDER_PAYMENT_DECLINED" => Self::OrderPaymentDeclined,
            name if name.starts_with("DISPUTE_") => Self::Dispute(name.to_string()),
            _ => Self::Unknown(raw),
        }
    }
}

impl From<ProviderEvent> for String {
    fn from(event: ProviderEvent) -> Self {
        event.name().to_string()
    }
}

/// Timestamp carried inside the webhook body (format varies by event)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadTimestamp {
    Millis(i64),
    Text(String),
}

/// Inbound webhook body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub event: ProviderEvent,
    pub order_id: String,
    #[serde(default)]
    pub timestamp: Option<PayloadTimestamp>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethodDetails>,
}

/// Result of processing one webhook delivery. Every variant is acknowledged.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    /// A state change (or a completion credit) was applied
    Processed { order_id: Uuid, status: OrderStatus },
    /// Completion re-delivered for an order that is already completed
    AlreadyCompleted { order_id: Uuid },
    /// No local order matches the provider reference
    OrderNotFound { provider_order_id: String },
    /// Logged only (disputes, unknown events, stale transitions)
    Ignored { reason: String },
}

impl WebhookOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Processed { .. } => "processed",
            Self::AlreadyCompleted { .. } => "duplicate",
            Self::OrderNotFound { .. } => "order_not_found",
            Self::Ignored { .. } => "ignored",
        }
    }
}

/// Atomic completion result from the store
#[derive(Debug, Clone)]
pub struct OrderCompletion {
    pub order: PaymentOrder,
    pub entry: LedgerEntry,
}

impl OrderCompletion {
    /// Audit event recorded with the purchase credit
    pub fn event(entry: &LedgerEntry) -> NewPaymentEvent {
        NewPaymentEvent::new(
            event_types::ORDER_COMPLETED,
            Some(serde_json::json!({
                "ledger_entry_id": entry.id,
                "credits": entry.amount,
            })),
        )
    }
}

/// Result of `handle_order_completed`
#[derive(Debug, Clone)]
pub enum CompletionOutcome {
    Credited(OrderCompletion),
    AlreadyCompleted,
    /// The order reached failed/cancelled first and can no longer complete
    Rejected(OrderStatus),
}

/// Order returned to the client after creation
#[derive(Debug, Clone)]
pub struct CreatedOrder {
    pub order: PaymentOrder,
    pub checkout_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_transitions() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Processing));
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Completed));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Processing.can_transition_to(OrderStatus::Pending));
        assert!(!OrderStatus::Completed.can_transition_to(OrderStatus::Completed));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Completed));
        assert!(!OrderStatus::Failed.can_transition_to(OrderStatus::Processing));
    }

    #[test]
    fn test_sources_agree_with_transitions() {
        let all = [
            OrderStatus::Pending,
            OrderStatus::Processing,
            OrderStatus::Completed,
            OrderStatus::Failed,
            OrderStatus::Cancelled,
        ];
        for next in all {
            for from in all {
                assert_eq!(
                    OrderStatus::sources_for(next).contains(&from),
                    from.can_transition_to(next),
                    "{} -> {}",
                    from,
                    next
                );
            }
        }
    }

    #[test]
    fn test_provider_event_parsing() {
        assert_eq!(
            ProviderEvent::from("ORDER_COMPLETED".to_string()),
            ProviderEvent::OrderCompleted
        );
        assert_eq!(
            ProviderEvent::from("order_cancelled".to_string()),
            ProviderEvent::OrderCancelled
        );
        assert_eq!(
            ProviderEvent::from("DISPUTE_ACTION_REQUIRED".to_string()),
            ProviderEvent::Dispute("DISPUTE_ACTION_REQUIRED".to_string())
        );
        assert_eq!(
            ProviderEvent::from("PAYOUT_INITIATED".to_string()),
            ProviderEvent::Unknown("PAYOUT_INITIATED".to_string())
        );
    }

    #[test]
    fn test_webhook_payload_deserialization() {
        let json = r#"{
            "event": "ORDER_COMPLETED",
            "order_id": "ord_123",
            "timestamp": 1760000000000,
            "payment_method": {"id": "pm_1", "type": "card", "card_last_four": "4242"}
        }"#;
        let payload: WebhookPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.event, ProviderEvent::OrderCompleted);
        assert_eq!(payload.order_id, "ord_123");
        assert_eq!(
            payload.timestamp,
            Some(PayloadTimestamp::Millis(1_760_000_000_000))
        );
        let method = payload.payment_method.unwrap();
        assert_eq!(method.method_type.as_deref(), Some("card"));
        assert_eq!(method.card_last_four.as_deref(), Some("4242"));
    }

    #[test]
    fn test_webhook_payload_minimal() {
        let payload: WebhookPayload =
            serde_json::from_str(r#"{"event": "SOMETHING_NEW", "order_id": "x"}"#).unwrap();
        assert_eq!(
            payload.event,
            ProviderEvent::Unknown("SOMETHING_NEW".to_string())
        );
        assert!(payload.state.is_none());
        assert!(payload.payment_method.is_none());
    }

    #[test]
    fn test_webhook_payload_requires_order_id() {
        assert!(serde_json::from_str::<WebhookPayload>(r#"{"event": "ORDER_COMPLETED"}"#).is_err());
    }
}

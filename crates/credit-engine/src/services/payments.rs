//! Payment order lifecycle and webhook processing
//!
//! Orders move `pending → processing → {completed | failed | cancelled}`.
//! Only verified webhooks and explicit cancellation drive transitions, and
//! completion is the sole path that turns money into ledger credits.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::ledger::validate_account;
use super::provider::{PaymentProvider, ProviderOrderRequest};
use super::signature::WebhookVerifier;
use crate::error::{CreditError, CreditResult};
use crate::models::{
    event_types, quote, BundleRequest, CompletionOutcome, CreatedOrder, NewPaymentEvent,
    NewPaymentOrder, OrderStatus, PaymentEvent, PaymentOrder, ProviderEvent, WebhookOutcome,
    WebhookPayload,
};
use crate::store::CreditStore;

pub const MAX_ORDER_LIST_LIMIT: i64 = 100;

/// Provider states that mean the payment is authorised but not captured
const AUTHORISED_STATES: [&str; 2] = ["processing", "authorised"];

#[derive(Clone)]
pub struct PaymentOrderService {
    store: Arc<dyn CreditStore>,
    provider: Arc<dyn PaymentProvider>,
    verifier: WebhookVerifier,
    currency: String,
    request_timeout: Duration,
}

impl PaymentOrderService {
    pub fn new(
        store: Arc<dyn CreditStore>,
        provider: Arc<dyn PaymentProvider>,
        verifier: WebhookVerifier,
        currency: impl Into<String>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            store,
            provider,
            verifier,
            currency: currency.into(),
            request_timeout,
        }
    }

    /// Currency every order is priced in
    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Price the bundles, create the remote order, then persist it locally
    ///
    /// The remote call happens first so a provider failure leaves no local
    /// order behind.
    pub async fn create_order(
        &self,
        account_id: &str,
        bundles: &[BundleRequest],
    ) -> CreditResult<CreatedOrder> {
        validate_account(account_id)?;
        let quote = quote(bundles).map_err(|e| CreditError::validation(e.to_string()))?;

        let order_id = Uuid::new_v4();
        let request = ProviderOrderRequest {
            amount: quote.total_minor,
            currency: self.currency.clone(),
            description: format!("{} credits", quote.total_credits),
            merchant_order_ext_ref: order_id.to_string(),
            idempotency_key: Uuid::new_v4().to_string(),
        };

        let remote = match tokio::time::timeout(
            self.request_timeout,
            self.provider.create_order(&request),
        )
        .await
        {
            Ok(Ok(remote)) => remote,
            Ok(Err(e)) => {
                error!(account_id = %account_id, error = %e, "Provider order creation failed");
                return Err(e);
            }
            Err(_) => {
                error!(
                    account_id = %account_id,
                    timeout_secs = self.request_timeout.as_secs(),
                    "Provider order creation timed out"
                );
                return Err(CreditError::provider("Payment provider request timed out"));
            }
        };

        let created_event = NewPaymentEvent::new(
            event_types::ORDER_CREATED,
            Some(json!({
                "provider_order_id": remote.id,
                "amount_minor": quote.total_minor,
                "currency": self.currency,
                "credits": quote.total_credits,
            })),
        );
        let order = self
            .store
            .insert_order(
                NewPaymentOrder {
                    id: order_id,
                    account_id: account_id.to_string(),
                    amount_minor: quote.total_minor,
                    currency: self.currency.clone(),
                    provider_order_id: remote.id.clone(),
                    provider_token: remote.token.clone(),
                    credits: quote.total_credits,
                    bundle: quote.lines,
                },
                created_event,
            )
            .await
            .map_err(|e| {
                // The remote order expires unpaid on the provider side
                error!(
                    account_id = %account_id,
                    provider_order_id = %remote.id,
                    error = %e,
                    "Failed to persist order after provider accepted it"
                );
                e
            })?;

        info!(
            account_id = %account_id,
            order_id = %order.id,
            provider_order_id = %order.provider_order_id,
            credits = order.credits,
            amount_minor = order.amount_minor,
            "Payment order created"
        );

        Ok(CreatedOrder {
            checkout_token: remote.token,
            order,
        })
    }

    /// Verify, parse and process a raw webhook delivery
    pub async fn ingest_webhook(
        &self,
        body: &[u8],
        signature: Option<&str>,
        timestamp: Option<&str>,
    ) -> CreditResult<WebhookOutcome> {
        if !self.verifier.verify(body, signature, timestamp)? {
            return Err(CreditError::InvalidSignature);
        }

        let raw: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| CreditError::validation(format!("Malformed webhook body: {}", e)))?;
        let payload: WebhookPayload = serde_json::from_value(raw.clone())
            .map_err(|e| CreditError::validation(format!("Malformed webhook payload: {}", e)))?;

        self.process_webhook(&payload, raw).await
    }

    /// Dispatch a verified webhook. Never fails for unknown orders or events.
    pub async fn process_webhook(
        &self,
        payload: &WebhookPayload,
        raw: serde_json::Value,
    ) -> CreditResult<WebhookOutcome> {
        metrics::counter!("payments.webhooks.received", "event" => payload.event.name().to_string())
            .increment(1);

        // Every delivery is kept, matched or not
        self.store.record_webhook(&payload.order_id, raw).await?;

        let order = match self
            .store
            .find_order_by_provider_ref(&payload.order_id)
            .await?
        {
            Some(order) => order,
            None => {
                warn!(
                    provider_order_id = %payload.order_id,
                    event = %payload.event.name(),
                    "Webhook for unknown order acknowledged"
                );
                return Ok(WebhookOutcome::OrderNotFound {
                    provider_order_id: payload.order_id.clone(),
                });
            }
        };

        debug!(
            order_id = %order.id,
            event = %payload.event.name(),
            status = %order.status,
            "Dispatching webhook"
        );

        match &payload.event {
            ProviderEvent::OrderCompleted => {
                Ok(match self.handle_order_completed(&order, payload).await? {
                    CompletionOutcome::Credited(completion) => WebhookOutcome::Processed {
                        order_id: completion.order.id,
                        status: completion.order.status,
                    },
                    CompletionOutcome::AlreadyCompleted => {
                        WebhookOutcome::AlreadyCompleted { order_id: order.id }
                    }
                    CompletionOutcome::Rejected(status) => WebhookOutcome::Ignored {
                        reason: format!("completion for {} order", status),
                    },
                })
            }
            ProviderEvent::OrderAuthorised => {
                let state = payload.state.as_deref().map(str::to_lowercase);
                match state.as_deref() {
                    None => {
                        self.apply_transition(&order, OrderStatus::Processing, event_types::ORDER_PROCESSING)
                            .await
                    }
                    Some(s) if AUTHORISED_STATES.contains(&s) => {
                        self.apply_transition(&order, OrderStatus::Processing, event_types::ORDER_PROCESSING)
                            .await
                    }
                    Some(other) => Ok(WebhookOutcome::Ignored {
                        reason: format!("authorisation event with state {}", other),
                    }),
                }
            }
            ProviderEvent::OrderCancelled => {
                self.apply_transition(&order, OrderStatus::Cancelled, event_types::ORDER_CANCELLED)
                    .await
            }
            ProviderEvent::OrderPaymentFailed | ProviderEvent::OrderPaymentDeclined => {
                self.apply_transition(&order, OrderStatus::Failed, event_types::ORDER_FAILED)
                    .await
            }
            ProviderEvent::Dispute(name) => {
                warn!(
                    order_id = %order.id,
                    account_id = %order.account_id,
                    dispute = %name,
                    "Payment dispute received, manual follow-up required"
                );
                self.store
                    .record_event(
                        order.id,
                        NewPaymentEvent::new(
                            event_types::DISPUTE_RECEIVED,
                            Some(json!({ "event": name })),
                        ),
                    )
                    .await?;
                Ok(WebhookOutcome::Ignored {
                    reason: format!("dispute {}", name),
                })
            }
            ProviderEvent::Unknown(name) => {
                info!(order_id = %order.id, event = %name, "Ignoring unhandled webhook event");
                Ok(WebhookOutcome::Ignored {
                    reason: format!("unhandled event {}", name),
                })
            }
        }
    }

    /// Complete an order and credit its bundle exactly once
    pub async fn handle_order_completed(
        &self,
        order: &PaymentOrder,
        payload: &WebhookPayload,
    ) -> CreditResult<CompletionOutcome> {
        if order.status == OrderStatus::Completed {
            return Ok(self.duplicate_completion(order.id));
        }
        if order.status.is_terminal() {
            warn!(
                order_id = %order.id,
                status = %order.status,
                "Completion event for closed order acknowledged without credit"
            );
            return Ok(CompletionOutcome::Rejected(order.status));
        }
        if let Some(amount) = payload.amount {
            if amount != order.amount_minor {
                warn!(
                    order_id = %order.id,
                    expected = order.amount_minor,
                    reported = amount,
                    "Completion amount differs from order amount"
                );
            }
        }

        let completion = match self.store.complete_order(order.id).await? {
            Some(completion) => completion,
            None => {
                // Lost the race to a concurrent delivery or a cancellation
                let current = self
                    .store
                    .find_order(order.id)
                    .await?
                    .map_or(order.status, |o| o.status);
                if current == OrderStatus::Completed {
                    return Ok(self.duplicate_completion(order.id));
                }
                warn!(
                    order_id = %order.id,
                    status = %current,
                    "Order closed before completion could be applied"
                );
                return Ok(CompletionOutcome::Rejected(current));
            }
        };

        metrics::counter!("payments.orders.completed").increment(1);
        info!(
            order_id = %order.id,
            account_id = %order.account_id,
            credits = completion.entry.amount,
            balance = completion.entry.balance_after,
            "Payment order completed and credited"
        );

        if let Some(method) = &payload.payment_method {
            if let Err(e) = self
                .store
                .save_payment_method(&order.account_id, method)
                .await
            {
                warn!(
                    order_id = %order.id,
                    account_id = %order.account_id,
                    error = %e,
                    "Failed to save payment method"
                );
            }
        }

        Ok(CompletionOutcome::Credited(completion))
    }

    fn duplicate_completion(&self, order_id: Uuid) -> CompletionOutcome {
        metrics::counter!("payments.orders.duplicate_completion").increment(1);
        info!(order_id = %order_id, "Order already completed, skipping duplicate");
        CompletionOutcome::AlreadyCompleted
    }

    async fn apply_transition(
        &self,
        order: &PaymentOrder,
        to: OrderStatus,
        event_type: &'static str,
    ) -> CreditResult<WebhookOutcome> {
        if !order.status.can_transition_to(to) {
            info!(
                order_id = %order.id,
                from = %order.status,
                to = %to,
                "Ignoring stale order transition"
            );
            return Ok(WebhookOutcome::Ignored {
                reason: format!("order is {}", order.status),
            });
        }

        match self
            .store
            .transition_status(
                order.id,
                OrderStatus::sources_for(to),
                to,
                NewPaymentEvent::new(event_type, Some(json!({ "source": "webhook" }))),
            )
            .await?
        {
            Some(updated) => {
                info!(order_id = %order.id, from = %order.status, to = %to, "Order status changed");
                Ok(WebhookOutcome::Processed {
                    order_id: updated.id,
                    status: updated.status,
                })
            }
            None => Ok(WebhookOutcome::Ignored {
                reason: format!("order left {} concurrently", order.status),
            }),
        }
    }

    /// Cancel an open order on behalf of its owner
    pub async fn cancel_order(&self, account_id: &str, order_id: Uuid) -> CreditResult<PaymentOrder> {
        let order = self.get_order(account_id, order_id).await?;
        let to = OrderStatus::Cancelled;
        if !order.status.can_transition_to(to) {
            return Err(CreditError::InvalidTransition {
                from: order.status,
                to,
            });
        }

        let updated = match self
            .store
            .transition_status(
                order.id,
                OrderStatus::sources_for(to),
                to,
                NewPaymentEvent::new(
                    event_types::ORDER_CANCELLED,
                    Some(json!({ "source": "account" })),
                ),
            )
            .await?
        {
            Some(updated) => updated,
            None => {
                let from = self
                    .store
                    .find_order(order.id)
                    .await?
                    .map_or(order.status, |o| o.status);
                return Err(CreditError::InvalidTransition { from, to });
            }
        };

        info!(account_id = %account_id, order_id = %order.id, "Order cancelled by account");
        Ok(updated)
    }

    /// Order owned by the account; other accounts' orders are not found
    pub async fn get_order(&self, account_id: &str, order_id: Uuid) -> CreditResult<PaymentOrder> {
        validate_account(account_id)?;
        self.store
            .find_order(order_id)
            .await?
            .filter(|order| order.account_id == account_id)
            .ok_or_else(|| CreditError::not_found("Payment order", order_id.to_string()))
    }

    pub async fn list_orders(&self, account_id: &str, limit: i64) -> CreditResult<Vec<PaymentOrder>> {
        validate_account(account_id)?;
        self.store
            .list_orders(account_id, limit.clamp(1, MAX_ORDER_LIST_LIMIT))
            .await
    }

    /// Audit trail for an order owned by the account
    pub async fn order_events(
        &self,
        account_id: &str,
        order_id: Uuid,
    ) -> CreditResult<Vec<PaymentEvent>> {
        let order = self.get_order(account_id, order_id).await?;
        self.store.list_events(order.id).await
    }
}

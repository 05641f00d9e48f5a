//! Ledger entries and the per-account balance projection

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of balance-affecting event recorded in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "credit_event_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    InitialGrant,
    Purchase,
    StoryGeneration,
    AudioGeneration,
    TextEdit,
    ImageEdit,
    SelfPrint,
    PrintFulfillment,
    Refund,
    Voucher,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InitialGrant => "initial_grant",
            Self::Purchase => "purchase",
            Self::StoryGeneration => "story_generation",
            Self::AudioGeneration => "audio_generation",
            Self::TextEdit => "text_edit",
            Self::ImageEdit => "image_edit",
            Self::SelfPrint => "self_print",
            Self::PrintFulfillment => "print_fulfillment",
            Self::Refund => "refund",
            Self::Voucher => "voucher",
        }
    }

    /// Feature charges are the only kinds that debit an account
    pub fn is_feature_charge(&self) -> bool {
        matches!(
            self,
            Self::StoryGeneration
                | Self::AudioGeneration
                | Self::TextEdit
                | Self::ImageEdit
                | Self::SelfPrint
                | Self::PrintFulfillment
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s {
            "initial_grant" => Self::InitialGrant,
            "purchase" => Self::Purchase,
            "story_generation" => Self::StoryGeneration,
            "audio_generation" => Self::AudioGeneration,
            "text_edit" => Self::TextEdit,
            "image_edit" => Self::ImageEdit,
            "self_print" => Self::SelfPrint,
            "print_fulfillment" => Self::PrintFulfillment,
            "refund" => Self::Refund,
            "voucher" => Self::Voucher,
            other => return Err(format!("unknown event kind: {}", other)),
        };
        Ok(kind)
    }
}

/// Database model for the credit_ledger table. Never updated once written.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct LedgerEntry {
    pub id: i64,
    pub account_id: String,
    /// Signed credit amount (negative = debit)
    pub amount: i64,
    pub event_kind: EventKind,
    pub story_ref: Option<String>,
    pub purchase_ref: Option<String>,
    pub description: Option<String>,
    /// Projected balance immediately after this entry
    pub balance_after: i64,
    pub created_at: DateTime<Utc>,
}

/// Optional references attached to a ledger entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerRefs {
    pub story_ref: Option<String>,
    pub purchase_ref: Option<String>,
    pub description: Option<String>,
}

impl LedgerRefs {
    pub fn story(story_ref: impl Into<String>) -> Self {
        Self {
            story_ref: Some(story_ref.into()),
            ..Default::default()
        }
    }

    pub fn purchase(purchase_ref: impl Into<String>) -> Self {
        Self {
            purchase_ref: Some(purchase_ref.into()),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Parameters for appending a ledger entry
#[derive(Debug, Clone, PartialEq)]
pub struct NewLedgerEntry {
    pub account_id: String,
    pub amount: i64,
    pub event_kind: EventKind,
    pub refs: LedgerRefs,
}

impl NewLedgerEntry {
    pub fn new(
        account_id: impl Into<String>,
        amount: i64,
        event_kind: EventKind,
        refs: LedgerRefs,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            amount,
            event_kind,
            refs,
        }
    }

    pub fn is_debit(&self) -> bool {
        self.amount < 0
    }
}

/// Database model for the account_balances table
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct AccountBalance {
    pub account_id: String,
    pub total: i64,
    pub updated_at: DateTime<Utc>,
}

/// Filters for reading ledger history
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    pub limit: i64,
    pub offset: i64,
    pub event_kind: Option<EventKind>,
}

impl HistoryQuery {
    pub const MAX_LIMIT: i64 = 100;

    pub fn latest(limit: i64) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }

    /// Clamp paging parameters into their accepted ranges
    pub fn normalized(&self) -> Self {
        Self {
            limit: self.limit.clamp(1, Self::MAX_LIMIT),
            offset: self.offset.max(0),
            event_kind: self.event_kind,
        }
    }
}

/// Outcome of comparing the balance projection against the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BalanceCheck {
    pub projected: i64,
    pub ledger_sum: i64,
    pub consistent: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_round_trips_through_str() {
        for kind in [
            EventKind::InitialGrant,
            EventKind::Purchase,
            EventKind::TextEdit,
            EventKind::Voucher,
            EventKind::PrintFulfillment,
        ] {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        }
        assert!("bonus".parse::<EventKind>().is_err());
        assert!("promotion".parse::<EventKind>().is_err());
    }

    #[test]
    fn test_feature_charge_kinds() {
        assert!(EventKind::TextEdit.is_feature_charge());
        assert!(EventKind::SelfPrint.is_feature_charge());
        assert!(!EventKind::Purchase.is_feature_charge());
        assert!(!EventKind::Voucher.is_feature_charge());
    }

    #[test]
    fn test_event_kind_serializes_snake_case() {
        let json = serde_json::to_string(&EventKind::InitialGrant).unwrap();
        assert_eq!(json, "\"initial_grant\"");
    }

    #[test]
    fn test_history_query_normalized() {
        let query = HistoryQuery {
            limit: 500,
            offset: -3,
            event_kind: None,
        }
        .normalized();
        assert_eq!(query.limit, 100);
        assert_eq!(query.offset, 0);

        assert_eq!(HistoryQuery::latest(0).normalized().limit, 1);
    }
}

//! Edit audit records and quota results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{LedgerEntry, ServiceCode};

/// Kind of repeated edit action subject to a free quota
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "edit_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EditKind {
    Text,
    Image,
}

impl EditKind {
    pub const ALL: [EditKind; 2] = [Self::Text, Self::Image];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
        }
    }

    pub fn service_code(&self) -> ServiceCode {
        match self {
            Self::Text => ServiceCode::TextEdit,
            Self::Image => ServiceCode::ImageEdit,
        }
    }
}

impl std::fmt::Display for EditKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Database model for the edit_history table
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct EditRecord {
    pub id: i64,
    pub account_id: String,
    pub kind: EditKind,
    pub story_ref: Option<String>,
    pub credits_charged: i64,
    pub ledger_entry_id: Option<i64>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Parameters for inserting an edit audit row
#[derive(Debug, Clone)]
pub struct NewEditRecord {
    pub account_id: String,
    pub kind: EditKind,
    pub story_ref: Option<String>,
    pub credits_charged: i64,
    pub ledger_entry_id: Option<i64>,
    pub metadata: Option<serde_json::Value>,
}

/// Result of an edit permission check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditPermission {
    pub can_edit: bool,
    pub required_credits: i64,
    pub current_balance: i64,
    /// Number of edits of this kind already performed
    pub usage_count: i64,
    pub message: String,
}

/// Outcome of recording a successful edit
#[derive(Debug, Clone)]
pub struct EditReceipt {
    pub record: EditRecord,
    pub charge: Option<LedgerEntry>,
    pub credits_charged: i64,
    pub balance: i64,
}

/// One hypothetical edit in a cost preview
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EditCostItem {
    /// 1-based position of the edit in the account's history
    pub edit_number: i64,
    pub free: bool,
    pub credits: i64,
}

/// Up-front cost of performing several edits in a row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditCostPreview {
    pub kind: EditKind,
    pub items: Vec<EditCostItem>,
    pub total_credits: i64,
}

/// Per-kind usage summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EditUsage {
    pub kind: EditKind,
    pub usage_count: i64,
    pub next_edit_credits: i64,
}

//! Edit quota DTOs

use credit_engine::models::{
    EditCostItem, EditCostPreview, EditKind, EditPermission, EditReceipt, EditUsage,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Edit kind selector for permission checks
#[derive(Debug, Deserialize)]
pub struct EditKindQuery {
    pub kind: EditKind,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EditPermissionResponse {
    pub can_edit: bool,
    pub required_credits: i64,
    pub current_balance: i64,
    pub usage_count: i64,
    pub message: String,
}

impl From<EditPermission> for EditPermissionResponse {
    fn from(permission: EditPermission) -> Self {
        Self {
            can_edit: permission.can_edit,
            required_credits: permission.required_credits,
            current_balance: permission.current_balance,
            usage_count: permission.usage_count,
            message: permission.message,
        }
    }
}

/// Report an edit that has already succeeded
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RecordEditRequest {
    /// `text` or `image`
    #[schema(value_type = String)]
    pub kind: EditKind,
    #[validate(length(max = 128))]
    pub story_ref: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EditReceiptResponse {
    pub edit_id: i64,
    pub kind: String,
    pub credits_charged: i64,
    pub ledger_entry_id: Option<i64>,
    pub balance: i64,
}

impl From<EditReceipt> for EditReceiptResponse {
    fn from(receipt: EditReceipt) -> Self {
        Self {
            edit_id: receipt.record.id,
            kind: receipt.record.kind.to_string(),
            credits_charged: receipt.credits_charged,
            ledger_entry_id: receipt.record.ledger_entry_id,
            balance: receipt.balance,
        }
    }
}

/// Cost preview for the next `count` edits
#[derive(Debug, Deserialize, Validate)]
pub struct PreviewQuery {
    pub kind: EditKind,
    #[validate(range(min = 1, max = 50))]
    #[serde(default = "default_preview_count")]
    pub count: i64,
}

fn default_preview_count() -> i64 {
    5
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EditCostItemResponse {
    pub edit_number: i64,
    pub free: bool,
    pub credits: i64,
}

impl From<EditCostItem> for EditCostItemResponse {
    fn from(item: EditCostItem) -> Self {
        Self {
            edit_number: item.edit_number,
            free: item.free,
            credits: item.credits,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EditPreviewResponse {
    pub kind: String,
    pub items: Vec<EditCostItemResponse>,
    pub total_credits: i64,
}

impl From<EditCostPreview> for EditPreviewResponse {
    fn from(preview: EditCostPreview) -> Self {
        Self {
            kind: preview.kind.to_string(),
            items: preview.items.into_iter().map(Into::into).collect(),
            total_credits: preview.total_credits,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EditUsageResponse {
    pub kind: String,
    pub usage_count: i64,
    pub next_edit_credits: i64,
}

impl From<EditUsage> for EditUsageResponse {
    fn from(usage: EditUsage) -> Self {
        Self {
            kind: usage.kind.to_string(),
            usage_count: usage.usage_count,
            next_edit_credits: usage.next_edit_credits,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_edit_request_parses_kind() {
        let req: RecordEditRequest =
            serde_json::from_str(r#"{"kind": "image", "metadata": {"page": 2}}"#).unwrap();
        assert_eq!(req.kind, EditKind::Image);
        assert!(req.story_ref.is_none());
    }

    #[test]
    fn test_record_edit_request_rejects_unknown_kind() {
        assert!(serde_json::from_str::<RecordEditRequest>(r#"{"kind": "audio"}"#).is_err());
    }

    #[test]
    fn test_preview_query_bounds() {
        let query = PreviewQuery {
            kind: EditKind::Text,
            count: 51,
        };
        assert!(query.validate().is_err());
    }
}

//! Pricing catalog entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EventKind;

/// Chargeable features known to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceCode {
    StoryGeneration,
    AudioGeneration,
    TextEdit,
    ImageEdit,
    SelfPrint,
    PrintFulfillment,
}

impl ServiceCode {
    pub const ALL: [ServiceCode; 6] = [
        Self::StoryGeneration,
        Self::AudioGeneration,
        Self::TextEdit,
        Self::ImageEdit,
        Self::SelfPrint,
        Self::PrintFulfillment,
    ];

    /// Catalog key for this service
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StoryGeneration => "story_generation",
            Self::AudioGeneration => "audio_generation",
            Self::TextEdit => "text_edit",
            Self::ImageEdit => "image_edit",
            Self::SelfPrint => "self_print",
            Self::PrintFulfillment => "print_fulfillment",
        }
    }

    /// Ledger kind recorded when this service is charged
    pub fn charge_kind(&self) -> EventKind {
        match self {
            Self::StoryGeneration => EventKind::StoryGeneration,
            Self::AudioGeneration => EventKind::AudioGeneration,
            Self::TextEdit => EventKind::TextEdit,
            Self::ImageEdit => EventKind::ImageEdit,
            Self::SelfPrint => EventKind::SelfPrint,
            Self::PrintFulfillment => EventKind::PrintFulfillment,
        }
    }

    /// Cost seeded into a fresh catalog
    pub fn default_credits(&self) -> i64 {
        match self {
            Self::StoryGeneration => 5,
            Self::AudioGeneration => 3,
            Self::TextEdit => 1,
            Self::ImageEdit => 2,
            Self::SelfPrint => 20,
            Self::PrintFulfillment => 40,
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == code)
    }
}

impl std::fmt::Display for ServiceCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Database model for the pricing_catalog table
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct PricingEntry {
    pub service_code: String,
    pub credits: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_code_parse() {
        assert_eq!(ServiceCode::parse("text_edit"), Some(ServiceCode::TextEdit));
        assert_eq!(
            ServiceCode::parse("print_fulfillment"),
            Some(ServiceCode::PrintFulfillment)
        );
        assert_eq!(ServiceCode::parse("TEXT_EDIT"), None);
        assert_eq!(ServiceCode::parse(""), None);
    }

    #[test]
    fn test_charge_kind_matches_code() {
        for code in ServiceCode::ALL {
            assert_eq!(code.charge_kind().as_str(), code.as_str());
            assert!(code.charge_kind().is_feature_charge());
        }
    }
}

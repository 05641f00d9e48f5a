//! Purchasable credit packages

use serde::{Deserialize, Serialize};

/// A credit bundle that can be bought through the payment provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CreditPackage {
    pub id: &'static str,
    pub credits: i64,
    /// Price in minor currency units
    pub price_minor: i64,
}

pub const CREDIT_PACKAGES: [CreditPackage; 3] = [
    CreditPackage {
        id: "starter",
        credits: 100,
        price_minor: 900,
    },
    CreditPackage {
        id: "plus",
        credits: 250,
        price_minor: 1900,
    },
    CreditPackage {
        id: "pro",
        credits: 600,
        price_minor: 3900,
    },
];

pub const MAX_PACKAGE_QUANTITY: i64 = 10;

impl CreditPackage {
    pub fn find(id: &str) -> Option<&'static CreditPackage> {
        CREDIT_PACKAGES.iter().find(|p| p.id == id)
    }
}

/// One requested line of an order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleRequest {
    pub package_id: String,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

fn default_quantity() -> i64 {
    1
}

/// A priced order line as persisted with the order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleLine {
    pub package_id: String,
    pub quantity: i64,
    pub credits: i64,
    pub price_minor: i64,
}

/// Totals for a validated set of bundle lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderQuote {
    pub lines: Vec<BundleLine>,
    pub total_credits: i64,
    pub total_minor: i64,
}

/// Reasons a bundle request cannot be priced
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuoteError {
    #[error("At least one package is required")]
    Empty,

    #[error("Unknown package: {0}")]
    UnknownPackage(String),

    #[error("Quantity for {package_id} must be between 1 and {max}")]
    InvalidQuantity { package_id: String, max: i64 },
}

/// Price a list of requested bundles against the package catalog
pub fn quote(requests: &[BundleRequest]) -> Result<OrderQuote, QuoteError> {
    if requests.is_empty() {
        return Err(QuoteError::Empty);
    }

    let mut lines = Vec::with_capacity(requests.len());
    for request in requests {
        let package_id = request.package_id.trim();
        let package = CreditPackage::find(package_id)
            .ok_or_else(|| QuoteError::UnknownPackage(package_id.to_string()))?;
        if !(1..=MAX_PACKAGE_QUANTITY).contains(&request.quantity) {
            return Err(QuoteError::InvalidQuantity {
                package_id: package.id.to_string(),
                max: MAX_PACKAGE_QUANTITY,
            });
        }
        lines.push(BundleLine {
            package_id: package.id.to_string(),
            quantity: request.quantity,
            credits: package.credits * request.quantity,
            price_minor: package.price_minor * request.quantity,
        });
    }

    let total_credits = lines.iter().map(|l| l.credits).sum();
    let total_minor = lines.iter().map(|l| l.price_minor).sum();
    Ok(OrderQuote {
        lines,
        total_credits,
        total_minor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(id: &str, quantity: i64) -> BundleRequest {
        BundleRequest {
            package_id: id.to_string(),
            quantity,
        }
    }

    #[test]
    fn test_quote_single_package() {
        let quote = quote(&[request("starter", 1)]).unwrap();
        assert_eq!(quote.total_credits, 100);
        assert_eq!(quote.total_minor, 900);
        assert_eq!(quote.lines.len(), 1);
    }

    #[test]
    fn test_quote_sums_lines() {
        let quote = quote(&[request("plus", 2), request("pro", 1)]).unwrap();
        assert_eq!(quote.total_credits, 500 + 600);
        assert_eq!(quote.total_minor, 3800 + 3900);
    }

    #[test]
    fn test_quote_rejects_empty() {
        assert_eq!(quote(&[]), Err(QuoteError::Empty));
    }

    #[test]
    fn test_quote_rejects_unknown_package() {
        assert_eq!(
            quote(&[request("mega", 1)]),
            Err(QuoteError::UnknownPackage("mega".to_string()))
        );
    }

    #[test]
    fn test_quote_rejects_bad_quantity() {
        assert!(matches!(
            quote(&[request("starter", 0)]),
            Err(QuoteError::InvalidQuantity { .. })
        ));
        assert!(matches!(
            quote(&[request("starter", 11)]),
            Err(QuoteError::InvalidQuantity { .. })
        ));
    }

    #[test]
    fn test_bundle_request_default_quantity() {
        let req: BundleRequest = serde_json::from_str(r#"{"package_id": "pro"}"#).unwrap();
        assert_eq!(req.quantity, 1);
    }
}

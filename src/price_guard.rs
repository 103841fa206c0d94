// Classifies booking-submission failures into a user-facing remedy

use crate::backend::ApiError;
use serde::Serialize;
use std::fmt;

// Backend wording for a quote that no longer matches the live price
pub const PRICE_CHANGE_MARKER: &str = "Price change";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    PriceDrift,
    Generic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Remedy {
    // Go back to rate selection; the booking context is stale
    RefreshRates,
    // Submit the same request again
    Retry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureClassification {
    pub kind: FailureKind,
    pub user_message: String,
    pub detail: String,
}

impl FailureClassification {
    pub fn remedy(&self) -> Remedy {
        match self.kind {
            FailureKind::PriceDrift => Remedy::RefreshRates,
            FailureKind::Generic => Remedy::Retry,
        }
    }

    pub fn is_price_drift(&self) -> bool {
        self.kind == FailureKind::PriceDrift
    }
}

impl fmt::Display for FailureClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message)
    }
}

pub struct PriceConsistencyGuard;

impl PriceConsistencyGuard {
    pub fn classify(error: &ApiError) -> FailureClassification {
        Self::classify_detail(&error.detail())
    }

    // Case-sensitive match on the raw detail text
    pub fn classify_detail(detail: &str) -> FailureClassification {
        if detail.contains(PRICE_CHANGE_MARKER) {
            FailureClassification {
                kind: FailureKind::PriceDrift,
                user_message: "The price for this rate has changed since it was quoted. \
                               Go back and refresh the rates before booking."
                    .to_string(),
                detail: detail.to_string(),
            }
        } else {
            FailureClassification {
                kind: FailureKind::Generic,
                user_message: if detail.trim().is_empty() {
                    "Booking failed. Please try again.".to_string()
                } else {
                    format!("Booking failed: {}", detail)
                },
                detail: detail.to_string(),
            }
        }
    }
}

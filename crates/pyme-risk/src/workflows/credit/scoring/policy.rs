use serde::{Deserialize, Serialize};

use super::config::RiskBands;

/// Risk classification derived from the final score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    High,
    Medium,
    Low,
}

impl RiskTier {
    pub fn label(&self) -> &'static str {
        match self {
            RiskTier::High => "High risk",
            RiskTier::Medium => "Medium risk",
            RiskTier::Low => "Low risk",
        }
    }
}

/// Credit decision suggested for each tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditRecommendation {
    Approve,
    ManualReview,
    Decline,
}

impl CreditRecommendation {
    pub fn summary(&self) -> &'static str {
        match self {
            CreditRecommendation::Approve => "approve credit",
            CreditRecommendation::ManualReview => "requires manual review",
            CreditRecommendation::Decline => "decline credit",
        }
    }
}

pub(crate) fn classify(bands: &RiskBands, score: u16) -> RiskTier {
    if score < bands.high_risk_below {
        RiskTier::High
    } else if score > bands.low_risk_above {
        RiskTier::Low
    } else {
        RiskTier::Medium
    }
}

pub(crate) fn recommend(tier: RiskTier) -> CreditRecommendation {
    match tier {
        RiskTier::High => CreditRecommendation::Decline,
        RiskTier::Medium => CreditRecommendation::ManualReview,
        RiskTier::Low => CreditRecommendation::Approve,
    }
}

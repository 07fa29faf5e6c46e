use serde::{Deserialize, Serialize};

use super::super::domain::AgentKind;

const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Relative importance of each analysis in the final score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub financial: f64,
    pub reputational: f64,
    pub behavioral: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            financial: 0.60,
            reputational: 0.20,
            behavioral: 0.20,
        }
    }
}

impl ScoringWeights {
    pub fn weight(&self, agent: AgentKind) -> f64 {
        match agent {
            AgentKind::Financial => self.financial,
            AgentKind::Reputational => self.reputational,
            AgentKind::Behavioral => self.behavioral,
        }
    }

    pub fn total(&self) -> f64 {
        self.financial + self.reputational + self.behavioral
    }
}

/// Three-band partition of the 0-1000 range.
///
/// Scores strictly below `high_risk_below` are high risk, scores strictly above
/// `low_risk_above` are low risk, everything in between is medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskBands {
    pub high_risk_below: u16,
    pub low_risk_above: u16,
}

impl Default for RiskBands {
    fn default() -> Self {
        Self {
            high_risk_below: 400,
            low_risk_above: 650,
        }
    }
}

/// Deployment configuration for consolidation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub weights: ScoringWeights,
    pub bands: RiskBands,
    pub neutral_baseline: u16,
    pub confidence_threshold: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            bands: RiskBands::default(),
            neutral_baseline: 500,
            confidence_threshold: 0.7,
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for agent in AgentKind::ALL {
            let weight = self.weights.weight(agent);
            if !weight.is_finite() || !(0.0..=1.0).contains(&weight) {
                return Err(ConfigurationError::WeightOutOfRange { agent, weight });
            }
        }

        let total = self.weights.total();
        if (total - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(ConfigurationError::WeightsDoNotSumToOne { total });
        }

        if self.bands.high_risk_below > self.bands.low_risk_above || self.bands.low_risk_above > 1000
        {
            return Err(ConfigurationError::InvalidBands {
                high_risk_below: self.bands.high_risk_below,
                low_risk_above: self.bands.low_risk_above,
            });
        }

        if self.neutral_baseline > 1000 {
            return Err(ConfigurationError::InvalidBaseline(self.neutral_baseline));
        }

        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigurationError::InvalidConfidenceThreshold(
                self.confidence_threshold,
            ));
        }

        Ok(())
    }
}

/// Fatal scoring misconfiguration detected at startup.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("scoring weights must sum to 1.0 (got {total:.6})")]
    WeightsDoNotSumToOne { total: f64 },
    #[error("{agent} weight {weight} must lie within [0, 1]")]
    WeightOutOfRange { agent: AgentKind, weight: f64 },
    #[error("risk bands are not ordered within 0-1000 (high below {high_risk_below}, low above {low_risk_above})")]
    InvalidBands {
        high_risk_below: u16,
        low_risk_above: u16,
    },
    #[error("neutral baseline {0} exceeds 1000")]
    InvalidBaseline(u16),
    #[error("confidence threshold {0} must lie within [0, 1]")]
    InvalidConfidenceThreshold(f64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        ScoringConfig::default()
            .validate()
            .expect("default configuration validates");
    }

    #[test]
    fn rejects_weights_that_do_not_sum_to_one() {
        let config = ScoringConfig {
            weights: ScoringWeights {
                financial: 0.5,
                reputational: 0.2,
                behavioral: 0.2,
            },
            ..ScoringConfig::default()
        };

        match config.validate() {
            Err(ConfigurationError::WeightsDoNotSumToOne { total }) => {
                assert!((total - 0.9).abs() < 1e-9)
            }
            other => panic!("expected weight sum error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_inverted_bands() {
        let config = ScoringConfig {
            bands: RiskBands {
                high_risk_below: 700,
                low_risk_above: 300,
            },
            ..ScoringConfig::default()
        };

        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidBands { .. })
        ));
    }

    #[test]
    fn rejects_negative_weight_even_when_sum_matches() {
        let config = ScoringConfig {
            weights: ScoringWeights {
                financial: 1.2,
                reputational: -0.1,
                behavioral: -0.1,
            },
            ..ScoringConfig::default()
        };

        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::WeightOutOfRange { .. })
        ));
    }
}

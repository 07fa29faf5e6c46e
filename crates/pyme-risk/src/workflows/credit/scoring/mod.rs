//! Deterministic consolidation of the three analysis results into one score.

mod config;
mod policy;

pub use config::{ConfigurationError, RiskBands, ScoringConfig, ScoringWeights};
pub use policy::{CreditRecommendation, RiskTier};

use serde::{Deserialize, Serialize};

use super::domain::{AgentKind, AnalysisResult};

/// One analysis as it entered the consolidation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentScore {
    pub agent: AgentKind,
    pub score: u16,
    pub confidence: f64,
    pub weight: f64,
    pub available: bool,
}

/// Signed contribution of a component relative to the neutral baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributingFactor {
    pub name: String,
    pub agent: AgentKind,
    pub weight: f64,
    pub impact: f64,
}

/// Consolidated, explainable credit score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedScore {
    pub financial: ComponentScore,
    pub reputational: ComponentScore,
    pub behavioral: ComponentScore,
    pub final_score: u16,
    pub risk_tier: RiskTier,
    pub recommendation: CreditRecommendation,
    pub factors: Vec<ContributingFactor>,
    pub confidence: f64,
    pub explanation: String,
}

impl ConsolidatedScore {
    pub fn components(&self) -> [&ComponentScore; 3] {
        [&self.financial, &self.reputational, &self.behavioral]
    }

    pub fn component(&self, agent: AgentKind) -> &ComponentScore {
        match agent {
            AgentKind::Financial => &self.financial,
            AgentKind::Reputational => &self.reputational,
            AgentKind::Behavioral => &self.behavioral,
        }
    }
}

/// Result of checking a consolidation against the confidence threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConsistencyOutcome {
    Consistent,
    LowConfidence { components: Vec<AgentKind> },
    InsufficientData { components: Vec<AgentKind> },
}

/// Pure scoring engine shared by the orchestrator and scenario simulation.
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    config: ScoringConfig,
}

impl ScoringEngine {
    pub fn new(config: ScoringConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn neutral_baseline(&self) -> u16 {
        self.config.neutral_baseline
    }

    pub fn consolidate(
        &self,
        financial: &AnalysisResult,
        reputational: &AnalysisResult,
        behavioral: &AnalysisResult,
    ) -> ConsolidatedScore {
        let financial = self.component(AgentKind::Financial, financial);
        let reputational = self.component(AgentKind::Reputational, reputational);
        let behavioral = self.component(AgentKind::Behavioral, behavioral);
        self.from_components(financial, reputational, behavioral)
    }

    /// Rebuild a consolidation from already weighted components.
    pub(crate) fn from_components(
        &self,
        financial: ComponentScore,
        reputational: ComponentScore,
        behavioral: ComponentScore,
    ) -> ConsolidatedScore {
        let weighted: f64 = [&financial, &reputational, &behavioral]
            .iter()
            .map(|component| component.weight * f64::from(component.score))
            .sum();
        let final_score = weighted.round().clamp(0.0, 1000.0) as u16;
        let confidence = [&financial, &reputational, &behavioral]
            .iter()
            .map(|component| component.weight * component.confidence)
            .sum::<f64>()
            .clamp(0.0, 1.0);

        let risk_tier = self.classify(final_score);
        let mut consolidated = ConsolidatedScore {
            financial,
            reputational,
            behavioral,
            final_score,
            risk_tier,
            recommendation: policy::recommend(risk_tier),
            factors: Vec::new(),
            confidence,
            explanation: String::new(),
        };
        consolidated.factors = self.explain(&consolidated);
        consolidated.explanation = narrate(&consolidated);
        consolidated
    }

    pub fn classify(&self, score: u16) -> RiskTier {
        policy::classify(&self.config.bands, score)
    }

    pub fn recommend(&self, tier: RiskTier) -> CreditRecommendation {
        policy::recommend(tier)
    }

    pub fn explain(&self, consolidated: &ConsolidatedScore) -> Vec<ContributingFactor> {
        let baseline = f64::from(self.config.neutral_baseline);
        let mut factors: Vec<ContributingFactor> = consolidated
            .components()
            .iter()
            .map(|component| ContributingFactor {
                name: component.agent.label().to_string(),
                agent: component.agent,
                weight: component.weight,
                impact: component.weight * (f64::from(component.score) - baseline),
            })
            .collect();
        // stable sort keeps declaration order on ties
        factors.sort_by(|left, right| right.impact.abs().total_cmp(&left.impact.abs()));
        factors
    }

    /// Unavailable components count as below the threshold.
    pub fn validate_consistency(&self, consolidated: &ConsolidatedScore) -> ConsistencyOutcome {
        let below: Vec<AgentKind> = consolidated
            .components()
            .iter()
            .filter(|component| {
                !component.available || component.confidence < self.config.confidence_threshold
            })
            .map(|component| component.agent)
            .collect();

        match below.len() {
            0 => ConsistencyOutcome::Consistent,
            1 => ConsistencyOutcome::LowConfidence { components: below },
            _ => ConsistencyOutcome::InsufficientData { components: below },
        }
    }

    fn component(&self, agent: AgentKind, result: &AnalysisResult) -> ComponentScore {
        ComponentScore {
            agent,
            score: result.score.min(1000),
            confidence: result.confidence.clamp(0.0, 1.0),
            weight: self.config.weights.weight(agent),
            available: result.is_available(),
        }
    }
}

fn narrate(consolidated: &ConsolidatedScore) -> String {
    let mut explanation = format!(
        "Final score {} ({}, {}).",
        consolidated.final_score,
        consolidated.risk_tier.label(),
        consolidated.recommendation.summary()
    );

    if let Some(top) = consolidated.factors.first() {
        let direction = if top.impact >= 0.0 { "raised" } else { "lowered" };
        explanation.push_str(&format!(
            " The {} analysis {} the score the most ({:+.1} points at weight {:.2}).",
            top.name, direction, top.impact, top.weight
        ));
    }

    let missing: Vec<&str> = consolidated
        .components()
        .iter()
        .filter(|component| !component.available)
        .map(|component| component.agent.label())
        .collect();
    if !missing.is_empty() {
        explanation.push_str(&format!(
            " Computed without the {} analysis; confidence {:.2}.",
            missing.join(" and "),
            consolidated.confidence
        ));
    }

    explanation
}

//! What-if simulation over a company's evaluation inputs.

mod variables;
mod viability;

pub use variables::ModifiableVariable;
pub use viability::{IssueSeverity, ViabilityIssue, ViabilityOutcome};

use std::cmp::Ordering as CmpOrdering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::analysis::{ComponentAssessment, HeuristicAnalyzer};
use super::domain::{AgentKind, AnalysisResult, CompanyData, EvaluationId, ScenarioId};
use super::scoring::{ComponentScore, ConsolidatedScore, ScoringEngine};

static SCENARIO_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_scenario_id() -> ScenarioId {
    let id = SCENARIO_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ScenarioId(format!("scn-{id:06}"))
}

/// Immutable set of overrides applied to a snapshot of company data.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub scenario_id: ScenarioId,
    pub evaluation_id: Option<EvaluationId>,
    pub base: Arc<CompanyData>,
    /// Score of the originating evaluation, when there is one.
    pub baseline: Option<ConsolidatedScore>,
    pub overrides: BTreeMap<String, f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactorDelta {
    pub agent: AgentKind,
    pub original_score: u16,
    pub simulated_score: u16,
    pub score_delta: i32,
    pub impact_delta: f64,
}

/// Final-score change attributable to a single override.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableImpact {
    pub variable: String,
    pub original_value: f64,
    pub simulated_value: f64,
    pub score_delta: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationResult {
    pub scenario_id: ScenarioId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation_id: Option<EvaluationId>,
    pub overrides: BTreeMap<String, f64>,
    pub original: ConsolidatedScore,
    pub simulated: ConsolidatedScore,
    pub score_change: i32,
    pub factor_deltas: Vec<FactorDelta>,
    pub variable_impacts: Vec<VariableImpact>,
    pub viability: ViabilityOutcome,
    pub recommendations: Vec<String>,
    pub simulated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonResult {
    pub ranked: Vec<SimulationResult>,
    pub best: ScenarioId,
    pub worst: ScenarioId,
    pub insights: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("scenario {0} not found")]
    NotFound(ScenarioId),
    #[error("scenario {scenario_id} is not viable: {}", outcome.summary())]
    Invalid {
        scenario_id: ScenarioId,
        outcome: ViabilityOutcome,
    },
    #[error("at least one simulated scenario is required for a comparison")]
    EmptyComparison,
}

/// Recomputes scores for hypothetical inputs through the shared scoring engine.
#[derive(Debug, Clone)]
pub struct ScenarioEngine {
    scoring: Arc<ScoringEngine>,
    analyzer: HeuristicAnalyzer,
}

impl ScenarioEngine {
    pub fn new(scoring: Arc<ScoringEngine>) -> Self {
        Self {
            scoring,
            analyzer: HeuristicAnalyzer,
        }
    }

    pub fn list_modifiable_variables(&self, company: &CompanyData) -> Vec<ModifiableVariable> {
        variables::catalog_for(company)
    }

    pub fn create_scenario(
        &self,
        evaluation_id: Option<EvaluationId>,
        base: Arc<CompanyData>,
        baseline: Option<ConsolidatedScore>,
        overrides: BTreeMap<String, f64>,
    ) -> Scenario {
        Scenario {
            scenario_id: next_scenario_id(),
            evaluation_id,
            base,
            baseline,
            overrides,
            created_at: Utc::now(),
        }
    }

    pub fn validate_viability(&self, scenario: &Scenario) -> ViabilityOutcome {
        viability::assess(&scenario.base, &scenario.overrides)
    }

    pub fn simulate(&self, scenario: &Scenario) -> Result<SimulationResult, ScenarioError> {
        let viability = self.validate_viability(scenario);
        if !viability.viable {
            return Err(ScenarioError::Invalid {
                scenario_id: scenario.scenario_id.clone(),
                outcome: viability,
            });
        }

        let base_assessments = self.assess_all(&scenario.base);
        let original = match &scenario.baseline {
            Some(baseline) => baseline.clone(),
            None => self.consolidate_assessments(&base_assessments),
        };

        let derived = apply(&scenario.base, &scenario.overrides);
        let simulated = self.project(&original, &base_assessments, &derived);

        let variable_impacts = scenario
            .overrides
            .iter()
            .filter_map(|(name, value)| {
                let spec = variables::lookup(name)?;
                let single = apply(&scenario.base, &BTreeMap::from([(name.clone(), *value)]));
                let projected = self.project(&original, &base_assessments, &single);
                Some(VariableImpact {
                    variable: name.clone(),
                    original_value: variables::read(&scenario.base, spec.key),
                    simulated_value: *value,
                    score_delta: i32::from(projected.final_score) - i32::from(original.final_score),
                })
            })
            .collect::<Vec<_>>();

        let factor_deltas = AgentKind::ALL
            .iter()
            .map(|agent| {
                let before = original.component(*agent);
                let after = simulated.component(*agent);
                FactorDelta {
                    agent: *agent,
                    original_score: before.score,
                    simulated_score: after.score,
                    score_delta: i32::from(after.score) - i32::from(before.score),
                    impact_delta: impact_of(&simulated, *agent) - impact_of(&original, *agent),
                }
            })
            .collect();

        let score_change = i32::from(simulated.final_score) - i32::from(original.final_score);
        let recommendations =
            recommendations(&original, &simulated, score_change, &variable_impacts, &viability);

        Ok(SimulationResult {
            scenario_id: scenario.scenario_id.clone(),
            evaluation_id: scenario.evaluation_id.clone(),
            overrides: scenario.overrides.clone(),
            original,
            simulated,
            score_change,
            factor_deltas,
            variable_impacts,
            viability,
            recommendations,
            simulated_at: Utc::now(),
        })
    }

    pub fn compare(&self, results: &[SimulationResult]) -> Result<ComparisonResult, ScenarioError> {
        let mut ranked = results.to_vec();
        ranked.sort_by(|left, right| {
            right
                .simulated
                .final_score
                .cmp(&left.simulated.final_score)
                .then_with(|| {
                    right
                        .viability
                        .viability_score
                        .partial_cmp(&left.viability.viability_score)
                        .unwrap_or(CmpOrdering::Equal)
                })
                .then_with(|| left.scenario_id.cmp(&right.scenario_id))
        });

        let (Some(best), Some(worst)) = (ranked.first(), ranked.last()) else {
            return Err(ScenarioError::EmptyComparison);
        };

        let mut insights = vec![format!(
            "Scenario {} yields the highest score: {} ({}).",
            best.scenario_id,
            best.simulated.final_score,
            best.simulated.risk_tier.label()
        )];
        if ranked.len() > 1 {
            insights.push(format!(
                "Scenario {} yields the lowest score: {} ({}), {} points below the best.",
                worst.scenario_id,
                worst.simulated.final_score,
                worst.simulated.risk_tier.label(),
                best.simulated.final_score - worst.simulated.final_score
            ));
        }

        let impacts = ranked.iter().flat_map(|result| {
            result
                .variable_impacts
                .iter()
                .map(move |impact| (&result.scenario_id, impact))
        });
        let strongest = impacts
            .clone()
            .filter(|(_, impact)| impact.score_delta > 0)
            .max_by_key(|(_, impact)| impact.score_delta);
        let weakest = impacts
            .filter(|(_, impact)| impact.score_delta < 0)
            .min_by_key(|(_, impact)| impact.score_delta);

        if let Some((scenario_id, impact)) = strongest {
            insights.push(format!(
                "Largest improvement: {} set to {} in scenario {} ({:+} points).",
                impact.variable, impact.simulated_value, scenario_id, impact.score_delta
            ));
        }
        if let Some((scenario_id, impact)) = weakest {
            insights.push(format!(
                "Largest deterioration: {} set to {} in scenario {} ({:+} points).",
                impact.variable, impact.simulated_value, scenario_id, impact.score_delta
            ));
        }

        Ok(ComparisonResult {
            best: best.scenario_id.clone(),
            worst: worst.scenario_id.clone(),
            ranked,
            insights,
        })
    }

    fn assess_all(&self, company: &CompanyData) -> [ComponentAssessment; 3] {
        AgentKind::ALL.map(|agent| self.analyzer.assess(&company.evidence(agent)))
    }

    fn consolidate_assessments(&self, assessments: &[ComponentAssessment; 3]) -> ConsolidatedScore {
        let [financial, reputational, behavioral] = AgentKind::ALL.map(|agent| {
            let assessment = &assessments[agent.slot()];
            AnalysisResult {
                agent,
                score: assessment.score,
                payload: assessment.payload.clone(),
                confidence: assessment.confidence,
                elapsed_ms: 0,
                tokens_used: None,
                error: None,
            }
        });
        self.scoring.consolidate(&financial, &reputational, &behavioral)
    }

    /// Shift each original component by the analyzer delta between base and derived inputs.
    fn project(
        &self,
        original: &ConsolidatedScore,
        base: &[ComponentAssessment; 3],
        derived: &CompanyData,
    ) -> ConsolidatedScore {
        let [financial, reputational, behavioral] = AgentKind::ALL.map(|agent| {
            let before = original.component(agent);
            let delta = i32::from(self.analyzer.assess(&derived.evidence(agent)).score)
                - i32::from(base[agent.slot()].score);
            ComponentScore {
                score: (i32::from(before.score) + delta).clamp(0, 1000) as u16,
                ..before.clone()
            }
        });
        self.scoring
            .from_components(financial, reputational, behavioral)
    }
}

fn apply(base: &CompanyData, overrides: &BTreeMap<String, f64>) -> CompanyData {
    let mut derived = base.clone();
    for (name, value) in overrides {
        if let Some(spec) = variables::lookup(name) {
            variables::write(&mut derived, spec.key, *value);
        }
    }
    derived
}

fn impact_of(score: &ConsolidatedScore, agent: AgentKind) -> f64 {
    score
        .factors
        .iter()
        .find(|factor| factor.agent == agent)
        .map(|factor| factor.impact)
        .unwrap_or_default()
}

fn recommendations(
    original: &ConsolidatedScore,
    simulated: &ConsolidatedScore,
    score_change: i32,
    impacts: &[VariableImpact],
    viability: &ViabilityOutcome,
) -> Vec<String> {
    let mut lines = Vec::new();
    lines.push(match score_change.cmp(&0) {
        CmpOrdering::Greater => format!(
            "The scenario raises the score by {score_change} points to {}.",
            simulated.final_score
        ),
        CmpOrdering::Less => format!(
            "The scenario lowers the score by {} points to {}.",
            -score_change,
            simulated.final_score
        ),
        CmpOrdering::Equal => format!(
            "The scenario leaves the score unchanged at {}.",
            simulated.final_score
        ),
    });

    if simulated.risk_tier != original.risk_tier {
        lines.push(format!(
            "Risk tier moves from {} to {}.",
            original.risk_tier.label(),
            simulated.risk_tier.label()
        ));
    }
    if simulated.recommendation != original.recommendation {
        lines.push(format!(
            "Recommendation changes to: {}.",
            simulated.recommendation.summary()
        ));
    }

    if let Some(best) = impacts
        .iter()
        .filter(|impact| impact.score_delta > 0)
        .max_by_key(|impact| impact.score_delta)
    {
        lines.push(format!(
            "Prioritize {}: moving it from {} to {} adds {} points.",
            best.variable, best.original_value, best.simulated_value, best.score_delta
        ));
    }
    for impact in impacts.iter().filter(|impact| impact.score_delta < 0) {
        lines.push(format!(
            "Reconsider {}: moving it from {} to {} costs {} points.",
            impact.variable, impact.original_value, impact.simulated_value, -impact.score_delta
        ));
    }
    for issue in viability.warnings() {
        lines.push(format!("Check plausibility: {}.", issue.message));
    }
    lines
}

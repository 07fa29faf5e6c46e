use async_trait::async_trait;
use tokio::time::Instant;

use super::super::domain::{
    AnalysisPayload, AnalysisResult, BehavioralEvidence, EvidenceBundle, FinancialEvidence,
    PaymentPattern, ReliabilityLevel, ReputationalEvidence, Sentiment,
};
use super::{AnalysisError, AnalysisPort, AnalysisRequest};

/// Component score, confidence and findings derived from one evidence bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentAssessment {
    pub score: u16,
    pub confidence: f64,
    pub payload: AnalysisPayload,
}

/// Deterministic analyzer scoring the numeric evidence directly.
///
/// Every sub-score is non-decreasing in the variables that signal lower risk,
/// so scenario simulation can rely on it for directional deltas.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicAnalyzer;

impl HeuristicAnalyzer {
    pub fn assess(&self, evidence: &EvidenceBundle) -> ComponentAssessment {
        match evidence {
            EvidenceBundle::Financial(financial) => assess_financial(financial),
            EvidenceBundle::Reputational(reputational) => assess_reputational(reputational),
            EvidenceBundle::Behavioral(behavioral) => assess_behavioral(behavioral),
        }
    }
}

#[async_trait]
impl AnalysisPort for HeuristicAnalyzer {
    async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResult, AnalysisError> {
        let started = Instant::now();
        if is_empty(&request.evidence) {
            return Err(AnalysisError::RejectedInput {
                agent: request.kind,
                reason: "no evidence supplied".to_string(),
            });
        }

        let assessment = self.assess(&request.evidence);
        Ok(AnalysisResult {
            agent: request.kind,
            score: assessment.score,
            payload: assessment.payload,
            confidence: assessment.confidence,
            elapsed_ms: started.elapsed().as_millis() as u64,
            tokens_used: None,
            error: None,
        })
    }
}

fn is_empty(evidence: &EvidenceBundle) -> bool {
    match evidence {
        EvidenceBundle::Financial(f) => {
            f.statements.trim().is_empty()
                && [
                    f.monthly_sales,
                    f.monthly_expenses,
                    f.total_assets,
                    f.total_liabilities,
                    f.current_assets,
                    f.current_liabilities,
                    f.sales_growth_rate,
                ]
                .iter()
                .all(|value| *value == 0.0)
        }
        EvidenceBundle::Reputational(r) => {
            r.social_media.trim().is_empty()
                && r.review_count == 0
                && r.negative_mentions == 0
                && r.average_rating == 0.0
                && r.sentiment_score == 0.0
        }
        EvidenceBundle::Behavioral(b) => {
            b.commercial_references.trim().is_empty()
                && b.payment_history.trim().is_empty()
                && b.verified_references == 0
                && b.defaults_last_year == 0
                && b.on_time_payment_ratio == 0.0
                && b.average_days_late == 0.0
        }
    }
}

fn to_score(points: f64) -> u16 {
    points.round().clamp(0.0, 1000.0) as u16
}

fn assess_financial(evidence: &FinancialEvidence) -> ComponentAssessment {
    let sales = evidence.monthly_sales.max(0.0);
    let expenses = evidence.monthly_expenses.max(0.0);

    let margin = if sales > 0.0 {
        ((sales - expenses) / sales).clamp(-1.0, 1.0)
    } else if expenses > 0.0 {
        -1.0
    } else {
        0.0
    };
    let liquidity = if evidence.current_liabilities > 0.0 {
        (evidence.current_assets.max(0.0) / evidence.current_liabilities).clamp(0.0, 3.0)
    } else if evidence.current_assets > 0.0 {
        3.0
    } else {
        1.0
    };
    let solvency = if evidence.total_assets > 0.0 {
        (1.0 - evidence.total_liabilities.max(0.0) / evidence.total_assets).clamp(0.0, 1.0)
    } else if evidence.total_liabilities > 0.0 {
        0.0
    } else {
        0.5
    };
    let growth = evidence.sales_growth_rate.clamp(-0.5, 0.5);
    let scale = ((sales + 1.0).log10() / 6.0).clamp(0.0, 1.0);

    let points = 250.0 * (margin + 1.0) / 2.0
        + 200.0 * liquidity / 3.0
        + 250.0 * solvency
        + 150.0 * (growth + 0.5)
        + 150.0 * scale;

    let has_figures = sales > 0.0 || evidence.total_assets > 0.0;
    let confidence = match (evidence.statements.trim().is_empty(), has_figures) {
        (false, true) => 0.9,
        (true, true) => 0.75,
        (false, false) => 0.5,
        (true, false) => 0.2,
    };

    ComponentAssessment {
        score: to_score(points),
        confidence,
        payload: AnalysisPayload::Financial {
            solvency: describe(solvency, 0.5, 0.2, "equity-to-assets"),
            liquidity: describe(liquidity / 3.0, 0.5, 1.0 / 3.0, "current ratio"),
            profitability: describe((margin + 1.0) / 2.0, 0.6, 0.5, "operating margin"),
            sales_trend: if growth > 0.02 {
                format!("growing sales ({:+.0}%)", growth * 100.0)
            } else if growth < -0.02 {
                format!("declining sales ({:+.0}%)", growth * 100.0)
            } else {
                "flat sales".to_string()
            },
            summary: format!(
                "margin {:.0}%, current ratio {:.2}, liabilities cover {:.0}% of assets",
                margin * 100.0,
                liquidity,
                (1.0 - solvency) * 100.0
            ),
        },
    }
}

fn describe(ratio: f64, strong: f64, adequate: f64, metric: &str) -> String {
    let level = if ratio >= strong {
        "strong"
    } else if ratio >= adequate {
        "adequate"
    } else {
        "weak"
    };
    format!("{level} {metric}")
}

fn assess_reputational(evidence: &ReputationalEvidence) -> ComponentAssessment {
    let sentiment = evidence.sentiment_score.clamp(-1.0, 1.0);
    let rating = evidence.average_rating.clamp(0.0, 5.0);
    let volume = f64::from(evidence.review_count.min(200)) / 200.0;
    let mentions = f64::from(evidence.review_count) + f64::from(evidence.negative_mentions);
    let clean_share = if mentions > 0.0 {
        1.0 - f64::from(evidence.negative_mentions) / mentions
    } else {
        0.5
    };

    let points = 400.0 * (sentiment + 1.0) / 2.0
        + 300.0 * rating / 5.0
        + 150.0 * volume
        + 150.0 * clean_share;

    let mut confidence: f64 = if evidence.review_count >= 20 {
        0.9
    } else if evidence.review_count >= 5 {
        0.75
    } else {
        0.5
    };
    if evidence.social_media.trim().is_empty() {
        confidence -= 0.1;
    }

    let label = if sentiment > 0.3 {
        Sentiment::Positive
    } else if sentiment < -0.3 {
        Sentiment::Negative
    } else {
        Sentiment::Neutral
    };

    let mut positive_themes = Vec::new();
    let mut negative_themes = Vec::new();
    if rating >= 4.0 {
        positive_themes.push(format!("average rating {rating:.1}/5"));
    } else if rating > 0.0 && rating < 3.0 {
        negative_themes.push(format!("average rating {rating:.1}/5"));
    }
    if evidence.negative_mentions > 0 {
        negative_themes.push(format!("{} negative mentions", evidence.negative_mentions));
    }
    if evidence.review_count >= 50 {
        positive_themes.push(format!("{} reviews", evidence.review_count));
    }

    ComponentAssessment {
        score: to_score(points),
        confidence: confidence.clamp(0.0, 1.0),
        payload: AnalysisPayload::Reputational {
            sentiment: label,
            sentiment_score: sentiment,
            positive_themes,
            negative_themes,
            summary: format!(
                "sentiment {:+.2} across {} reviews",
                sentiment, evidence.review_count
            ),
        },
    }
}

fn assess_behavioral(evidence: &BehavioralEvidence) -> ComponentAssessment {
    let on_time = evidence.on_time_payment_ratio.clamp(0.0, 1.0);
    let lateness = evidence.average_days_late.clamp(0.0, 90.0) / 90.0;
    let references = f64::from(evidence.verified_references.min(5)) / 5.0;
    let defaults = f64::from(evidence.defaults_last_year.min(4)) / 4.0;

    let points =
        450.0 * on_time + 200.0 * (1.0 - lateness) + 150.0 * references + 200.0 * (1.0 - defaults);

    let documented = !evidence.payment_history.trim().is_empty();
    let confidence = if evidence.verified_references >= 2 && documented {
        0.9
    } else if documented || evidence.verified_references > 0 {
        0.75
    } else {
        0.5
    };

    let payment_pattern = if on_time >= 0.9 && evidence.average_days_late <= 5.0 {
        PaymentPattern::Punctual
    } else if evidence.defaults_last_year == 0 && evidence.average_days_late <= 30.0 {
        PaymentPattern::MinorDelays
    } else {
        PaymentPattern::Delinquent
    };
    let reference_reliability = match evidence.verified_references {
        0 => ReliabilityLevel::Low,
        1..=2 => ReliabilityLevel::Medium,
        _ => ReliabilityLevel::High,
    };

    ComponentAssessment {
        score: to_score(points),
        confidence,
        payload: AnalysisPayload::Behavioral {
            payment_pattern,
            reference_reliability,
            summary: format!(
                "{:.0}% of payments on time, {:.0} days late on average, {} default(s) last year",
                on_time * 100.0,
                evidence.average_days_late.max(0.0),
                evidence.defaults_last_year
            ),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::credit::domain::AgentKind;
    use tokio::time::Duration;

    fn financial(monthly_sales: f64) -> FinancialEvidence {
        FinancialEvidence {
            statements: "Estado de situacion 2024".to_string(),
            monthly_sales,
            monthly_expenses: 18_000.0,
            total_assets: 250_000.0,
            total_liabilities: 120_000.0,
            current_assets: 60_000.0,
            current_liabilities: 40_000.0,
            sales_growth_rate: 0.1,
        }
    }

    #[test]
    fn financial_score_never_drops_as_sales_rise() {
        let analyzer = HeuristicAnalyzer;
        let mut previous = 0;
        for sales in [0.0, 500.0, 10_000.0, 18_000.0, 25_000.0, 80_000.0, 1_000_000.0] {
            let score = analyzer
                .assess(&EvidenceBundle::Financial(financial(sales)))
                .score;
            assert!(score >= previous, "score {score} dropped below {previous} at sales {sales}");
            previous = score;
        }
    }

    #[test]
    fn scores_stay_within_range_for_extreme_inputs() {
        let analyzer = HeuristicAnalyzer;
        let extreme = FinancialEvidence {
            monthly_sales: f64::MAX / 4.0,
            total_assets: 1e12,
            current_assets: 1e12,
            sales_growth_rate: 40.0,
            ..FinancialEvidence::default()
        };
        let score = analyzer.assess(&EvidenceBundle::Financial(extreme)).score;
        assert!(score <= 1000);

        let awful = BehavioralEvidence {
            average_days_late: 400.0,
            defaults_last_year: 12,
            ..BehavioralEvidence::default()
        };
        assert_eq!(analyzer.assess(&EvidenceBundle::Behavioral(awful)).score, 0);
    }

    #[tokio::test]
    async fn rejects_empty_bundles() {
        let request = AnalysisRequest {
            kind: AgentKind::Reputational,
            company_id: "c-2".to_string(),
            company_name: "Cafe Mitad del Mundo".to_string(),
            evidence: EvidenceBundle::Reputational(ReputationalEvidence::default()),
            deadline: Instant::now() + Duration::from_secs(1),
        };

        match HeuristicAnalyzer.analyze(request).await {
            Err(AnalysisError::RejectedInput { agent, .. }) => {
                assert_eq!(agent, AgentKind::Reputational)
            }
            other => panic!("expected rejected input, got {other:?}"),
        }
    }
}

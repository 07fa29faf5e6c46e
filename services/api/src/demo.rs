use crate::infra::{build_credit_service, InMemoryRecordArchive};
use clap::Args;
use pyme_risk::config::AppConfig;
use pyme_risk::error::AppError;
use pyme_risk::workflows::credit::{
    BehavioralEvidence, CompanyData, ComparisonResult, ConsolidatedScore, EvaluationState,
    EvaluationStatus, FinancialEvidence, ReputationalEvidence, SimulationResult,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct EvaluateArgs {
    /// JSON file holding the company data to evaluate
    #[arg(long)]
    pub(crate) input: PathBuf,
    /// Print the final evaluation state as JSON instead of a summary
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Monthly sales used for the growth scenario. Defaults to +40% over the sample.
    #[arg(long)]
    pub(crate) target_sales: Option<f64>,
    /// Stop after the evaluation and skip the scenario portion of the demo.
    #[arg(long)]
    pub(crate) skip_scenarios: bool,
}

pub(crate) async fn run_evaluate(args: EvaluateArgs) -> Result<(), AppError> {
    let raw = std::fs::read_to_string(&args.input)?;
    let company: CompanyData = serde_json::from_str(&raw)?;

    let config = AppConfig::load()?;
    let service = build_credit_service(
        &config.credit,
        Arc::new(InMemoryRecordArchive::default()),
    )?;

    let started = service.start_evaluation(company)?;
    let state = service.await_evaluation(&started.evaluation_id).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else {
        render_evaluation(&state);
    }
    Ok(())
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        target_sales,
        skip_scenarios,
    } = args;

    let config = AppConfig::load()?;
    let archive = Arc::new(InMemoryRecordArchive::default());
    let service = build_credit_service(&config.credit, archive.clone())?;

    println!("PyME credit risk demo");
    let company = demo_company();
    let base_sales = company.financial.monthly_sales;
    let started = service.start_evaluation(company)?;
    let state = service.await_evaluation(&started.evaluation_id).await?;
    render_evaluation(&state);
    if let Some(record) = archive.evaluation(&state.evaluation_id) {
        println!("  Archived as {} record", record.status);
    }
    for event in service.audit_trail(&state.evaluation_id)? {
        println!("  [audit] {:?}: {}", event.action, event.detail);
    }

    if skip_scenarios || state.status != EvaluationStatus::Completed {
        return Ok(());
    }

    println!("\nModifiable variables");
    for variable in service.modifiable_variables(&state.evaluation_id)? {
        println!(
            "  - {} ({}): {:.2}",
            variable.name, variable.category, variable.current_value
        );
    }

    let target_sales = target_sales.unwrap_or(base_sales * 1.4);
    let candidates = [
        (
            "sales growth",
            BTreeMap::from([("monthly_sales".to_string(), target_sales)]),
        ),
        (
            "payment slippage",
            BTreeMap::from([
                ("on_time_payment_ratio".to_string(), 0.7),
                ("average_days_late".to_string(), 25.0),
            ]),
        ),
        (
            "deleveraging",
            BTreeMap::from([
                ("total_liabilities".to_string(), 40_000.0),
                ("current_liabilities".to_string(), 15_000.0),
            ]),
        ),
    ];

    let mut scenario_ids = Vec::new();
    for (label, changes) in candidates {
        let scenario = service.create_scenario(&state.evaluation_id, changes)?;
        println!("\nScenario {} ({label})", scenario.scenario_id);
        match service.simulate(&scenario.scenario_id) {
            Ok(result) => {
                render_simulation(&result);
                scenario_ids.push(scenario.scenario_id.clone());
            }
            Err(err) => println!("  Simulation refused: {err}"),
        }
    }

    if scenario_ids.len() > 1 {
        let comparison = service.compare(&scenario_ids)?;
        render_comparison(&comparison);
    }

    let telemetry = service.telemetry();
    println!(
        "\nTelemetry: {} evaluations completed | {} agent calls | {:.0}% agent success | {} tokens | {:.0}ms avg | {} simulations archived",
        telemetry.evaluations_completed,
        telemetry.agent_calls,
        telemetry.agent_success_rate * 100.0,
        telemetry.total_tokens_used,
        telemetry.average_processing_time_ms,
        archive.simulation_count()
    );
    Ok(())
}

fn render_evaluation(state: &EvaluationState) {
    println!(
        "- Evaluation {} for {} -> {}",
        state.evaluation_id,
        state.company_name,
        state.status.label()
    );
    if let Some(score) = &state.score {
        render_score(score);
    }
    if state.low_confidence {
        println!("  Flagged: insufficient data for a confident decision");
    }
    for warning in &state.warnings {
        println!("  Warning: {warning}");
    }
    for failure in &state.errors {
        let agent = failure
            .agent
            .map(|agent| agent.label())
            .unwrap_or("evaluation");
        println!("  Error [{agent}]: {}", failure.message);
    }
}

fn render_score(score: &ConsolidatedScore) {
    println!(
        "  Score {} | {} | {} (confidence {:.0}%)",
        score.final_score,
        score.risk_tier.label(),
        score.recommendation.summary(),
        score.confidence * 100.0
    );
    for component in score.components() {
        let marker = if component.available { "" } else { " [unavailable]" };
        println!(
            "    - {}: {} (weight {:.0}%){marker}",
            component.agent,
            component.score,
            component.weight * 100.0
        );
    }
    println!("  {}", score.explanation);
}

fn render_simulation(result: &SimulationResult) {
    println!(
        "  Score {} -> {} ({:+}) | viability {:.0}%",
        result.original.final_score,
        result.simulated.final_score,
        result.score_change,
        result.viability.viability_score * 100.0
    );
    for delta in result
        .factor_deltas
        .iter()
        .filter(|delta| delta.score_delta != 0)
    {
        println!(
            "    - {}: {} -> {} ({:+})",
            delta.agent, delta.original_score, delta.simulated_score, delta.score_delta
        );
    }
    for recommendation in &result.recommendations {
        println!("    * {recommendation}");
    }
}

fn render_comparison(comparison: &ComparisonResult) {
    println!("\nScenario ranking");
    for (rank, result) in comparison.ranked.iter().enumerate() {
        println!(
            "  {}. {} -> {} ({:+})",
            rank + 1,
            result.scenario_id,
            result.simulated.final_score,
            result.score_change
        );
    }
    println!(
        "  Best: {} | Worst: {}",
        comparison.best, comparison.worst
    );
    for insight in &comparison.insights {
        println!("  - {insight}");
    }
}

fn demo_company() -> CompanyData {
    CompanyData {
        company_id: "pyme-demo-001".to_string(),
        company_name: "Panaderia La Espiga".to_string(),
        financial: FinancialEvidence {
            statements: "Estados financieros 2024: ventas estables, margen operativo del 18%"
                .to_string(),
            monthly_sales: 48_000.0,
            monthly_expenses: 39_000.0,
            total_assets: 260_000.0,
            total_liabilities: 120_000.0,
            current_assets: 75_000.0,
            current_liabilities: 42_000.0,
            sales_growth_rate: 0.06,
        },
        reputational: ReputationalEvidence {
            social_media: "Clientes elogian el pan artesanal; algunas quejas por demoras"
                .to_string(),
            sentiment_score: 0.45,
            average_rating: 4.3,
            review_count: 96,
            negative_mentions: 9,
        },
        behavioral: BehavioralEvidence {
            commercial_references: "Molino del Sur, Lacteos Andinos".to_string(),
            payment_history: "Dos pagos con retraso menor en 24 meses".to_string(),
            on_time_payment_ratio: 0.92,
            average_days_late: 5.0,
            verified_references: 2,
            defaults_last_year: 0,
        },
        metadata: BTreeMap::from([("sector".to_string(), "alimentos".to_string())]),
    }
}

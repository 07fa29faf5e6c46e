use serde::Serialize;

use super::super::domain::{AgentKind, CompanyData};

/// Company input eligible for what-if overrides.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModifiableVariable {
    pub name: &'static str,
    pub label: &'static str,
    pub category: AgentKind,
    pub current_value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VariableKey {
    MonthlySales,
    MonthlyExpenses,
    TotalAssets,
    TotalLiabilities,
    CurrentAssets,
    CurrentLiabilities,
    SalesGrowthRate,
    SentimentScore,
    AverageRating,
    ReviewCount,
    NegativeMentions,
    OnTimePaymentRatio,
    AverageDaysLate,
    VerifiedReferences,
    DefaultsLastYear,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct VariableSpec {
    pub key: VariableKey,
    pub name: &'static str,
    pub label: &'static str,
    pub category: AgentKind,
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Amounts whose order-of-magnitude swings are implausible.
    pub magnitude: bool,
}

const fn spec(
    key: VariableKey,
    name: &'static str,
    label: &'static str,
    category: AgentKind,
    min: Option<f64>,
    max: Option<f64>,
    magnitude: bool,
) -> VariableSpec {
    VariableSpec {
        key,
        name,
        label,
        category,
        min,
        max,
        magnitude,
    }
}

pub(crate) const CATALOG: [VariableSpec; 15] = [
    spec(VariableKey::MonthlySales, "monthly_sales", "Monthly sales", AgentKind::Financial, Some(0.0), None, true),
    spec(VariableKey::MonthlyExpenses, "monthly_expenses", "Monthly operating expenses", AgentKind::Financial, Some(0.0), None, true),
    spec(VariableKey::TotalAssets, "total_assets", "Total assets", AgentKind::Financial, Some(0.0), None, true),
    spec(VariableKey::TotalLiabilities, "total_liabilities", "Total liabilities", AgentKind::Financial, Some(0.0), None, true),
    spec(VariableKey::CurrentAssets, "current_assets", "Current assets", AgentKind::Financial, Some(0.0), None, true),
    spec(VariableKey::CurrentLiabilities, "current_liabilities", "Current liabilities", AgentKind::Financial, Some(0.0), None, true),
    spec(VariableKey::SalesGrowthRate, "sales_growth_rate", "Year-over-year sales growth", AgentKind::Financial, Some(-1.0), Some(5.0), false),
    spec(VariableKey::SentimentScore, "sentiment_score", "Online sentiment", AgentKind::Reputational, Some(-1.0), Some(1.0), false),
    spec(VariableKey::AverageRating, "average_rating", "Average review rating", AgentKind::Reputational, Some(0.0), Some(5.0), false),
    spec(VariableKey::ReviewCount, "review_count", "Number of reviews", AgentKind::Reputational, Some(0.0), Some(1_000_000.0), true),
    spec(VariableKey::NegativeMentions, "negative_mentions", "Negative mentions", AgentKind::Reputational, Some(0.0), Some(1_000_000.0), false),
    spec(VariableKey::OnTimePaymentRatio, "on_time_payment_ratio", "Share of payments made on time", AgentKind::Behavioral, Some(0.0), Some(1.0), false),
    spec(VariableKey::AverageDaysLate, "average_days_late", "Average days late", AgentKind::Behavioral, Some(0.0), Some(365.0), false),
    spec(VariableKey::VerifiedReferences, "verified_references", "Verified commercial references", AgentKind::Behavioral, Some(0.0), Some(100.0), false),
    spec(VariableKey::DefaultsLastYear, "defaults_last_year", "Defaults in the last year", AgentKind::Behavioral, Some(0.0), Some(100.0), false),
];

pub(crate) fn lookup(name: &str) -> Option<&'static VariableSpec> {
    CATALOG.iter().find(|spec| spec.name == name)
}

pub(crate) fn read(company: &CompanyData, key: VariableKey) -> f64 {
    let financial = &company.financial;
    let reputational = &company.reputational;
    let behavioral = &company.behavioral;
    match key {
        VariableKey::MonthlySales => financial.monthly_sales,
        VariableKey::MonthlyExpenses => financial.monthly_expenses,
        VariableKey::TotalAssets => financial.total_assets,
        VariableKey::TotalLiabilities => financial.total_liabilities,
        VariableKey::CurrentAssets => financial.current_assets,
        VariableKey::CurrentLiabilities => financial.current_liabilities,
        VariableKey::SalesGrowthRate => financial.sales_growth_rate,
        VariableKey::SentimentScore => reputational.sentiment_score,
        VariableKey::AverageRating => reputational.average_rating,
        VariableKey::ReviewCount => f64::from(reputational.review_count),
        VariableKey::NegativeMentions => f64::from(reputational.negative_mentions),
        VariableKey::OnTimePaymentRatio => behavioral.on_time_payment_ratio,
        VariableKey::AverageDaysLate => behavioral.average_days_late,
        VariableKey::VerifiedReferences => f64::from(behavioral.verified_references),
        VariableKey::DefaultsLastYear => f64::from(behavioral.defaults_last_year),
    }
}

fn count(value: f64) -> u32 {
    value.round().clamp(0.0, f64::from(u32::MAX)) as u32
}

pub(crate) fn write(company: &mut CompanyData, key: VariableKey, value: f64) {
    match key {
        VariableKey::MonthlySales => company.financial.monthly_sales = value,
        VariableKey::MonthlyExpenses => company.financial.monthly_expenses = value,
        VariableKey::TotalAssets => company.financial.total_assets = value,
        VariableKey::TotalLiabilities => company.financial.total_liabilities = value,
        VariableKey::CurrentAssets => company.financial.current_assets = value,
        VariableKey::CurrentLiabilities => company.financial.current_liabilities = value,
        VariableKey::SalesGrowthRate => company.financial.sales_growth_rate = value,
        VariableKey::SentimentScore => company.reputational.sentiment_score = value,
        VariableKey::AverageRating => company.reputational.average_rating = value,
        VariableKey::ReviewCount => company.reputational.review_count = count(value),
        VariableKey::NegativeMentions => company.reputational.negative_mentions = count(value),
        VariableKey::OnTimePaymentRatio => company.behavioral.on_time_payment_ratio = value,
        VariableKey::AverageDaysLate => company.behavioral.average_days_late = value,
        VariableKey::VerifiedReferences => company.behavioral.verified_references = count(value),
        VariableKey::DefaultsLastYear => company.behavioral.defaults_last_year = count(value),
    }
}

pub(crate) fn catalog_for(company: &CompanyData) -> Vec<ModifiableVariable> {
    CATALOG
        .iter()
        .map(|spec| ModifiableVariable {
            name: spec.name,
            label: spec.label,
            category: spec.category,
            current_value: read(company, spec.key),
            min: spec.min,
            max: spec.max,
        })
        .collect()
}

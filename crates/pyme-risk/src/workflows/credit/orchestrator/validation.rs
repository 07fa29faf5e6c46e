use serde::Serialize;

use super::super::domain::{CompanyData, EvaluationId};

const MAX_ID_CHARS: usize = 64;
const MAX_NAME_CHARS: usize = 256;

/// Input rejected before any analysis ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("evaluation {evaluation_id} rejected: {}", issues.join("; "))]
pub struct ValidationError {
    pub evaluation_id: EvaluationId,
    pub issues: Vec<String>,
}

pub(crate) fn validate(company: &CompanyData, max_field_bytes: usize) -> Vec<String> {
    let mut issues = Vec::new();

    check_identity(&mut issues, "company_id", &company.company_id, MAX_ID_CHARS);
    check_identity(&mut issues, "company_name", &company.company_name, MAX_NAME_CHARS);

    let texts = [
        ("financial.statements", &company.financial.statements),
        ("reputational.social_media", &company.reputational.social_media),
        ("behavioral.commercial_references", &company.behavioral.commercial_references),
        ("behavioral.payment_history", &company.behavioral.payment_history),
    ];
    for (field, value) in texts {
        if value.len() > max_field_bytes {
            issues.push(format!(
                "{field} is {} bytes, above the {max_field_bytes} byte limit",
                value.len()
            ));
        }
    }
    for (key, value) in &company.metadata {
        if value.len() > max_field_bytes {
            issues.push(format!("metadata.{key} exceeds {max_field_bytes} bytes"));
        }
    }

    let numbers = [
        ("financial.monthly_sales", company.financial.monthly_sales),
        ("financial.monthly_expenses", company.financial.monthly_expenses),
        ("financial.total_assets", company.financial.total_assets),
        ("financial.total_liabilities", company.financial.total_liabilities),
        ("financial.current_assets", company.financial.current_assets),
        ("financial.current_liabilities", company.financial.current_liabilities),
        ("financial.sales_growth_rate", company.financial.sales_growth_rate),
        ("reputational.sentiment_score", company.reputational.sentiment_score),
        ("reputational.average_rating", company.reputational.average_rating),
        ("behavioral.on_time_payment_ratio", company.behavioral.on_time_payment_ratio),
        ("behavioral.average_days_late", company.behavioral.average_days_late),
    ];
    for (field, value) in numbers {
        if !value.is_finite() {
            issues.push(format!("{field} must be a finite number"));
        }
    }

    issues
}

fn check_identity(issues: &mut Vec<String>, field: &str, value: &str, max_chars: usize) {
    if value.trim().is_empty() {
        issues.push(format!("{field} is required"));
    } else if value.chars().count() > max_chars {
        issues.push(format!("{field} exceeds {max_chars} characters"));
    }
}

use std::collections::BTreeMap;

use serde::Serialize;

use super::super::domain::CompanyData;
use super::variables::{self, VariableKey};

const WARNING_PENALTY: f64 = 0.25;
const MAX_GROWTH_FACTOR: f64 = 10.0;
const MIN_SHRINK_FACTOR: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViabilityIssue {
    pub variable: String,
    pub severity: IssueSeverity,
    pub message: String,
}

/// Plausibility verdict for a set of overrides.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViabilityOutcome {
    pub viable: bool,
    pub viability_score: f64,
    pub issues: Vec<ViabilityIssue>,
}

impl ViabilityOutcome {
    pub fn errors(&self) -> impl Iterator<Item = &ViabilityIssue> {
        self.issues
            .iter()
            .filter(|issue| issue.severity == IssueSeverity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ViabilityIssue> {
        self.issues
            .iter()
            .filter(|issue| issue.severity == IssueSeverity::Warning)
    }

    pub fn summary(&self) -> String {
        let messages: Vec<&str> = self.errors().map(|issue| issue.message.as_str()).collect();
        if messages.is_empty() {
            "no blocking issues".to_string()
        } else {
            messages.join("; ")
        }
    }
}

pub(crate) fn assess(base: &CompanyData, overrides: &BTreeMap<String, f64>) -> ViabilityOutcome {
    let mut issues = Vec::new();
    let mut derived = base.clone();

    for (name, value) in overrides {
        let Some(spec) = variables::lookup(name) else {
            issues.push(error(name, format!("{name} is not a modifiable variable")));
            continue;
        };
        if !value.is_finite() {
            issues.push(error(name, format!("{name} must be a finite number")));
            continue;
        }
        if let Some(min) = spec.min.filter(|min| value < min) {
            issues.push(error(name, format!("{name} must be at least {min} (got {value})")));
            continue;
        }
        if let Some(max) = spec.max.filter(|max| value > max) {
            issues.push(error(name, format!("{name} must be at most {max} (got {value})")));
            continue;
        }

        let current = variables::read(base, spec.key);
        if spec.magnitude && current > 0.0 {
            let ratio = value / current;
            if ratio > MAX_GROWTH_FACTOR {
                issues.push(warning(
                    name,
                    format!("{name} grows {ratio:.1}x over its current value {current}"),
                ));
            } else if ratio < MIN_SHRINK_FACTOR {
                issues.push(warning(
                    name,
                    format!("{name} drops to {:.0}% of its current value {current}", ratio * 100.0),
                ));
            }
        }
        variables::write(&mut derived, spec.key, *value);
    }

    let touched = |keys: [&str; 2]| keys.iter().any(|key| overrides.contains_key(*key));
    if touched(["current_assets", "total_assets"])
        && variables::read(&derived, VariableKey::CurrentAssets)
            > variables::read(&derived, VariableKey::TotalAssets)
    {
        issues.push(warning(
            "current_assets",
            "current assets exceed total assets".to_string(),
        ));
    }
    if touched(["current_liabilities", "total_liabilities"])
        && variables::read(&derived, VariableKey::CurrentLiabilities)
            > variables::read(&derived, VariableKey::TotalLiabilities)
    {
        issues.push(warning(
            "current_liabilities",
            "current liabilities exceed total liabilities".to_string(),
        ));
    }

    let has_errors = issues
        .iter()
        .any(|issue| issue.severity == IssueSeverity::Error);
    let warnings = issues
        .iter()
        .filter(|issue| issue.severity == IssueSeverity::Warning)
        .count();
    let viability_score = if has_errors {
        0.0
    } else {
        (1.0 - WARNING_PENALTY * warnings as f64).max(0.0)
    };

    ViabilityOutcome {
        viable: !has_errors,
        viability_score,
        issues,
    }
}

fn error(variable: &str, message: String) -> ViabilityIssue {
    ViabilityIssue {
        variable: variable.to_string(),
        severity: IssueSeverity::Error,
        message,
    }
}

fn warning(variable: &str, message: String) -> ViabilityIssue {
    ViabilityIssue {
        variable: variable.to_string(),
        severity: IssueSeverity::Warning,
        message,
    }
}

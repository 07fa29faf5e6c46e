use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::super::domain::{AgentKind, AnalysisResult};
use super::{AnalysisError, AnalysisPort, AnalysisRequest};

/// Inputs above this many bytes of free text are routed to the advanced provider.
pub const DEFAULT_COMPLEX_INPUT_BYTES: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskComplexity {
    Simple,
    Complex,
}

/// Chooses a concrete analysis provider for each request.
///
/// Financial statements always go to the advanced provider; the other analyses
/// use the standard one unless their free text is large.
pub struct ProviderSelector {
    standard: Arc<dyn AnalysisPort>,
    advanced: Arc<dyn AnalysisPort>,
    complex_input_bytes: usize,
}

impl ProviderSelector {
    pub fn new(standard: Arc<dyn AnalysisPort>, advanced: Arc<dyn AnalysisPort>) -> Self {
        Self {
            standard,
            advanced,
            complex_input_bytes: DEFAULT_COMPLEX_INPUT_BYTES,
        }
    }

    /// Route every request to one provider.
    pub fn single(provider: Arc<dyn AnalysisPort>) -> Self {
        Self::new(provider.clone(), provider)
    }

    pub fn with_complex_input_bytes(mut self, bytes: usize) -> Self {
        self.complex_input_bytes = bytes;
        self
    }

    pub fn complexity(&self, request: &AnalysisRequest) -> TaskComplexity {
        if request.kind == AgentKind::Financial
            || request.evidence.text_len() > self.complex_input_bytes
        {
            TaskComplexity::Complex
        } else {
            TaskComplexity::Simple
        }
    }
}

#[async_trait]
impl AnalysisPort for ProviderSelector {
    async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResult, AnalysisError> {
        let complexity = self.complexity(&request);
        debug!(agent = %request.kind, ?complexity, "selected analysis provider");
        match complexity {
            TaskComplexity::Simple => self.standard.analyze(request).await,
            TaskComplexity::Complex => self.advanced.analyze(request).await,
        }
    }
}

use std::sync::Arc;

use arcane_advocate_core::{
    history_summary, now_millis, CaseError, CaseId, CaseRecord, HISTORY_CONTEXT_LIMIT,
};
use arcane_advocate_gemini::{CaseGenerator, GenerationError};
use arcane_advocate_store_json::{JsonStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum CaseServiceError {
    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),
    #[error("storage failed: {0}")]
    Storage(#[from] StoreError),
    #[error("storage failed: {0}")]
    Encoding(#[from] CaseError),
}

impl CaseServiceError {
    /// Stable machine-readable kind, suitable for API error bodies.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Generation(err) => err.code(),
            Self::Storage(_) | Self::Encoding(_) => "storage",
        }
    }
}

/// Orchestrates case generation against the history store.
#[derive(Debug, Clone)]
pub struct CaseService {
    store: JsonStore,
    generator: Arc<dyn CaseGenerator>,
}

impl CaseService {
    #[must_use]
    pub fn new(store: JsonStore, generator: Arc<dyn CaseGenerator>) -> Self {
        Self { store, generator }
    }

    #[must_use]
    pub fn generation_configured(&self) -> bool {
        self.generator.is_configured()
    }

    /// Generate a case from recent history, stamp it `active`, and persist it.
    ///
    /// Nothing is written unless generation succeeds.
    ///
    /// # Errors
    /// Returns [`CaseServiceError::Generation`] when the generator fails, or a storage
    /// error when the stamped case cannot be appended.
    pub fn generate_and_persist(&self) -> Result<CaseRecord, CaseServiceError> {
        let history = self.store.read();
        let summary = history_summary(&history.cases, HISTORY_CONTEXT_LIMIT);
        tracing::info!(prior_cases = history.cases.len(), "generating case with history context");

        let payload = self.generator.generate_case(&summary)?;
        let record = CaseRecord::stamp(payload, CaseId::new(), now_millis())?;
        let stored = self.store.append(record)?;
        tracing::info!(case_id = stored.id().as_deref().unwrap_or("<none>"), "case persisted");
        Ok(stored)
    }

    /// All stored cases, oldest first. An unreadable store yields an empty history.
    #[must_use]
    pub fn list_history(&self) -> Vec<CaseRecord> {
        self.store.read().cases
    }
}

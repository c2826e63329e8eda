//! Case generation through the Gemini `generateContent` endpoint.
//!
//! [`GeminiClient`] turns a rolling history summary into a validated [`CasePayload`]:
//! prompt assembly ([`build_prompt`]), one upstream call, then brace-slicing repair of the
//! model text ([`extract_json_payload`]) and schema validation ([`parse_case_payload`]).

mod client;
mod config;
mod prompt;
mod repair;

use std::time::Duration;

use arcane_advocate_core::CasePayload;

pub use client::GeminiClient;
pub use config::{
    GeminiConfig, DEFAULT_BASE_URL, DEFAULT_MODEL, DEFAULT_TIMEOUT, DEFAULT_TIMEOUT_MS,
};
pub use prompt::{build_prompt, FIRST_CASE_HISTORY, SYSTEM_PROMPT};
pub use repair::{extract_json_payload, parse_case_payload};

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("upstream returned status {status}: {body}")]
    UpstreamStatus { status: u16, body: String },
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("upstream request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("parse error: {0}")]
    Parse(String),
}

impl GenerationError {
    /// Stable machine-readable kind, suitable for API error bodies.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::UpstreamStatus { .. } | Self::Upstream(_) => "upstream",
            Self::Timeout(_) => "timeout",
            Self::Parse(_) => "parse",
        }
    }
}

/// Produces the narrative part of a new case from a digest of recent cases.
pub trait CaseGenerator: std::fmt::Debug + Send + Sync {
    /// # Errors
    /// Returns a [`GenerationError`] describing why no valid case was produced.
    fn generate_case(&self, history_summary: &str) -> Result<CasePayload, GenerationError>;

    /// Whether the generator has what it needs to attempt a call.
    fn is_configured(&self) -> bool {
        true
    }
}

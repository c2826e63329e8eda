use std::io;

use arcane_advocate_core::CasePayload;
use serde::{Deserialize, Serialize};

use crate::{build_prompt, parse_case_payload, CaseGenerator, GeminiConfig, GenerationError};

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: [RequestContent<'a>; 1],
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: [RequestPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Text of the first candidate, with all of its text parts joined.
    fn first_candidate_text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text = content.parts.iter().filter_map(|part| part.text.as_deref()).collect::<String>();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// Blocking client for the Gemini `generateContent` endpoint.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    config: GeminiConfig,
    agent: ureq::Agent,
}

impl GeminiClient {
    #[must_use]
    pub fn new(config: GeminiConfig) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Self { config, agent }
    }

    fn request_text(&self, api_key: &str, prompt: &str) -> Result<String, GenerationError> {
        let body = GenerateContentRequest {
            contents: [RequestContent { parts: [RequestPart { text: prompt }] }],
        };
        let response = self
            .agent
            .post(&self.config.endpoint())
            .set(API_KEY_HEADER, api_key)
            .send_json(&body)
            .map_err(|err| self.map_call_error(err))?;

        let decoded: GenerateContentResponse = response.into_json().map_err(|err| {
            if is_timeout(&err) {
                GenerationError::Timeout(self.config.timeout)
            } else {
                GenerationError::Upstream(format!("unreadable response body: {err}"))
            }
        })?;

        decoded
            .first_candidate_text()
            .ok_or_else(|| GenerationError::Upstream("response contained no candidate text".to_string()))
    }

    fn map_call_error(&self, err: ureq::Error) -> GenerationError {
        match err {
            ureq::Error::Status(status, response) => {
                let body = response.into_string().unwrap_or_default();
                GenerationError::UpstreamStatus { status, body }
            }
            ureq::Error::Transport(transport) => {
                let timed_out = std::error::Error::source(&transport)
                    .and_then(|source| source.downcast_ref::<io::Error>())
                    .is_some_and(is_timeout);
                if timed_out {
                    GenerationError::Timeout(self.config.timeout)
                } else {
                    GenerationError::Upstream(transport.to_string())
                }
            }
        }
    }
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

impl CaseGenerator for GeminiClient {
    fn generate_case(&self, history_summary: &str) -> Result<CasePayload, GenerationError> {
        let Some(api_key) = self.config.api_key() else {
            return Err(GenerationError::Configuration(
                "GEMINI_API_KEY is not configured".to_string(),
            ));
        };

        let prompt = build_prompt(history_summary);
        tracing::info!(model = %self.config.model, "requesting case generation");
        let text = self.request_text(api_key, &prompt).inspect_err(|err| {
            tracing::error!(error = %err, "case generation request failed");
        })?;
        let payload = parse_case_payload(&text).inspect_err(|err| {
            tracing::error!(error = %err, "model response could not be repaired");
        })?;
        tracing::info!(case_title = %payload.case_title, "case generated");
        Ok(payload)
    }

    fn is_configured(&self) -> bool {
        self.config.api_key().is_some()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn request_body_matches_generate_content_shape() {
        let body = GenerateContentRequest {
            contents: [RequestContent { parts: [RequestPart { text: "hello" }] }],
        };
        let encoded = serde_json::to_value(&body).unwrap_or_else(|err| panic!("encode: {err}"));
        assert_eq!(encoded, json!({ "contents": [{ "parts": [{ "text": "hello" }] }] }));
    }

    #[test]
    fn candidate_text_joins_parts_of_first_candidate() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [
                { "content": { "parts": [{ "text": "{\"a\":" }, { "text": "1}" }] } },
                { "content": { "parts": [{ "text": "ignored" }] } }
            ]
        }))
        .unwrap_or_else(|err| panic!("decode: {err}"));
        assert_eq!(response.first_candidate_text().as_deref(), Some("{\"a\":1}"));
    }

    #[test]
    fn missing_or_blank_candidates_yield_no_text() {
        for raw in [
            json!({}),
            json!({ "candidates": [] }),
            json!({ "candidates": [{ "finishReason": "SAFETY" }] }),
            json!({ "candidates": [{ "content": { "parts": [{ "text": "  " }] } }] }),
        ] {
            let response: GenerateContentResponse =
                serde_json::from_value(raw).unwrap_or_else(|err| panic!("decode: {err}"));
            assert_eq!(response.first_candidate_text(), None);
        }
    }

    #[test]
    fn missing_key_fails_before_any_request() {
        let client = GeminiClient::new(GeminiConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            ..GeminiConfig::default()
        });
        assert!(!client.is_configured());
        assert!(matches!(
            client.generate_case(""),
            Err(GenerationError::Configuration(_))
        ));
    }
}

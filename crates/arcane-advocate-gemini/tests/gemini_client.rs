use std::sync::{Arc, Mutex};
use std::time::Duration;

use arcane_advocate_gemini::{CaseGenerator, GeminiClient, GeminiConfig, GenerationError};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::Router;
use serde_json::{json, Value};

const CASE_JSON: &str = r#"{
  "tagline": "Scales of the serpent",
  "caseTitle": "Crown v. Wyrmtongue",
  "factPattern": "A dragon is accused of hoarding a village's tax gold.",
  "judge": { "name": "Judge Ashveil", "personality": "Dry wit" },
  "prosecutor": { "name": "Maren Holt", "style": "Relentless" },
  "witnesses": [
    { "name": "Tibble", "role": "Tax collector", "personality": "Timid", "pressureTolerance": "low", "testimony": "The chest was empty at dawn." }
  ],
  "evidence": [
    { "id": "scale", "name": "Bronze scale", "description": "Found beside the chest.", "credibility": "medium", "unlocks": null }
  ],
  "legalTheories": ["Lack of intent"],
  "moralDilemma": "The gold was owed to the dragon all along."
}"#;

#[derive(Debug, Default)]
struct Seen {
    path: Option<String>,
    api_key: Option<String>,
    body: Option<Value>,
}

#[derive(Debug)]
struct FakeGemini {
    status: StatusCode,
    body: String,
    delay: Duration,
    seen: Mutex<Seen>,
}

async fn generate_content(
    State(fake): State<Arc<FakeGemini>>,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    {
        let mut seen = fake.seen.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        seen.path = Some(uri.path().to_string());
        seen.api_key = headers
            .get("x-goog-api-key")
            .and_then(|value| value.to_str().ok())
            .map(ToOwned::to_owned);
        seen.body = serde_json::from_str(&body).ok();
    }
    if !fake.delay.is_zero() {
        tokio::time::sleep(fake.delay).await;
    }
    (fake.status, fake.body.clone())
}

async fn spawn_fake(status: StatusCode, body: String, delay: Duration) -> (Arc<FakeGemini>, String) {
    let fake = Arc::new(FakeGemini { status, body, delay, seen: Mutex::new(Seen::default()) });
    let router = Router::new().fallback(generate_content).with_state(Arc::clone(&fake));
    let listener = match tokio::net::TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => listener,
        Err(err) => panic!("failed to bind fake Gemini listener: {err}"),
    };
    let addr = match listener.local_addr() {
        Ok(addr) => addr,
        Err(err) => panic!("fake Gemini listener has no address: {err}"),
    };
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    (fake, format!("http://{addr}/v1"))
}

fn candidates_body(text: &str) -> String {
    json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] }).to_string()
}

async fn generate(
    base_url: String,
    timeout: Duration,
    summary: &'static str,
) -> Result<arcane_advocate_core::CasePayload, GenerationError> {
    let client = GeminiClient::new(GeminiConfig {
        api_key: Some("test-key".to_string()),
        base_url,
        timeout,
        ..GeminiConfig::default()
    });
    match tokio::task::spawn_blocking(move || client.generate_case(summary)).await {
        Ok(result) => result,
        Err(err) => panic!("generation task panicked: {err}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fenced_case_is_generated_and_request_is_well_formed() {
    let (fake, base_url) = spawn_fake(
        StatusCode::OK,
        candidates_body(&format!("```json\n{CASE_JSON}\n```")),
        Duration::ZERO,
    )
    .await;

    let payload = generate(base_url, Duration::from_secs(5), "Case: A — Outcome: Won")
        .await
        .unwrap_or_else(|err| panic!("generation failed: {err}"));
    assert_eq!(payload.case_title, "Crown v. Wyrmtongue");
    assert_eq!(payload.moral_dilemma.as_deref(), Some("The gold was owed to the dragon all along."));

    let seen = fake.seen.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    assert_eq!(seen.path.as_deref(), Some("/v1/models/gemini-2.5-pro:generateContent"));
    assert_eq!(seen.api_key.as_deref(), Some("test-key"));
    let prompt = seen
        .body
        .as_ref()
        .and_then(|body| body.pointer("/contents/0/parts/0/text"))
        .and_then(Value::as_str)
        .unwrap_or_else(|| panic!("request body missing prompt text: {:?}", seen.body));
    assert!(prompt.contains("PREVIOUS CASES (for continuity):\nCase: A — Outcome: Won"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn non_success_status_carries_code_and_body() {
    let (_fake, base_url) =
        spawn_fake(StatusCode::SERVICE_UNAVAILABLE, "model overloaded".to_string(), Duration::ZERO)
            .await;

    let err = match generate(base_url, Duration::from_secs(5), "").await {
        Ok(payload) => panic!("expected upstream failure, got {payload:?}"),
        Err(err) => err,
    };
    assert_eq!(
        err,
        GenerationError::UpstreamStatus { status: 503, body: "model overloaded".to_string() }
    );
    assert_eq!(err.code(), "upstream");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn response_without_candidates_is_an_upstream_error() {
    let (_fake, base_url) = spawn_fake(StatusCode::OK, "{}".to_string(), Duration::ZERO).await;

    let result = generate(base_url, Duration::from_secs(5), "").await;
    assert!(matches!(result, Err(GenerationError::Upstream(_))), "got {result:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn prose_without_json_is_a_parse_error() {
    let (_fake, base_url) = spawn_fake(
        StatusCode::OK,
        candidates_body("The court is adjourned for today."),
        Duration::ZERO,
    )
    .await;

    let result = generate(base_url, Duration::from_secs(5), "").await;
    assert!(matches!(result, Err(GenerationError::Parse(_))), "got {result:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_upstream_times_out() {
    let (_fake, base_url) = spawn_fake(
        StatusCode::OK,
        candidates_body(CASE_JSON),
        Duration::from_secs(3),
    )
    .await;

    let result = generate(base_url, Duration::from_millis(200), "").await;
    assert_eq!(result, Err(GenerationError::Timeout(Duration::from_millis(200))));
}

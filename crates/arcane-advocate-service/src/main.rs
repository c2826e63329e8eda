use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use arcane_advocate_api::{CaseService, CaseServiceError};
use arcane_advocate_core::CaseRecord;
use arcane_advocate_gemini::{
    GeminiClient, GeminiConfig, DEFAULT_BASE_URL, DEFAULT_MODEL, DEFAULT_TIMEOUT_MS,
};
use arcane_advocate_store_json::JsonStore;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use serde::Serialize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const MIN_GENERATION_TIMEOUT_MS: u64 = 1_000;
const MAX_GENERATION_TIMEOUT_MS: u64 = 600_000;

#[derive(Debug, Clone)]
struct ServiceState {
    cases: CaseService,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceError {
    error: String,
    code: &'static str,
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
    generation_configured: bool,
}

#[derive(Debug, Parser)]
#[command(name = "arcane-advocate-service")]
#[command(about = "HTTP backend for the Arcane Advocate case generator")]
struct Args {
    #[arg(long, env = "ARCANE_BIND", default_value = "127.0.0.1:3000")]
    bind: SocketAddr,
    #[arg(long, env = "ARCANE_DATA_FILE", default_value = "./data/game_data.json")]
    data_file: PathBuf,
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    gemini_api_key: Option<String>,
    #[arg(long, env = "GEMINI_MODEL", default_value = DEFAULT_MODEL)]
    gemini_model: String,
    #[arg(long, env = "GEMINI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    gemini_base_url: String,
    #[arg(long, env = "ARCANE_GENERATION_TIMEOUT_MS", default_value_t = DEFAULT_TIMEOUT_MS)]
    generation_timeout_ms: u64,
}

impl Args {
    fn gemini_config(&self) -> GeminiConfig {
        GeminiConfig {
            api_key: self.gemini_api_key.clone(),
            model: self.gemini_model.clone(),
            base_url: self.gemini_base_url.clone(),
            timeout: Duration::from_millis(
                self.generation_timeout_ms.clamp(MIN_GENERATION_TIMEOUT_MS, MAX_GENERATION_TIMEOUT_MS),
            ),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(self)).into_response()
    }
}

impl From<CaseServiceError> for ServiceError {
    fn from(err: CaseServiceError) -> Self {
        Self { code: err.code(), error: err.to_string() }
    }
}

impl ServiceState {
    fn internal(message: impl Into<String>) -> ServiceError {
        ServiceError { error: message.into(), code: "internal" }
    }
}

fn app(state: ServiceState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/cases/generate", post(generate_case))
        .route("/api/cases/history", get(case_history))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let gemini = GeminiClient::new(args.gemini_config());
    let state = ServiceState {
        cases: CaseService::new(JsonStore::new(args.data_file.clone()), Arc::new(gemini)),
    };
    tracing::info!(
        data_file = %args.data_file.display(),
        gemini_key_present = state.cases.generation_configured(),
        "starting service"
    );

    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn health(State(state): State<ServiceState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        generation_configured: state.cases.generation_configured(),
    })
}

async fn generate_case(
    State(state): State<ServiceState>,
) -> Result<Json<CaseRecord>, ServiceError> {
    let record = tokio::task::spawn_blocking(move || state.cases.generate_and_persist())
        .await
        .map_err(|err| ServiceState::internal(format!("case generation task failed: {err}")))?
        .map_err(|err| {
            tracing::error!(error = %err, "case generation failed");
            ServiceError::from(err)
        })?;
    Ok(Json(record))
}

async fn case_history(
    State(state): State<ServiceState>,
) -> Result<Json<Vec<CaseRecord>>, ServiceError> {
    let cases = tokio::task::spawn_blocking(move || state.cases.list_history())
        .await
        .map_err(|err| ServiceState::internal(format!("history task failed: {err}")))?;
    Ok(Json(cases))
}

//! HTTP transport for the report stream.
//!
//! ```text
//! GET  /profiles         → [{id, name}]
//! POST /generate-report  → text/event-stream
//!        data: {"content": "...", "citations": [1, 2]}
//!        data: {"error": "...", "kind": "session_failed"}
//!        data: [DONE]
//! POST /save-report      → {success, filename} | {error}
//! ```
//!
//! Request bodies may be form-encoded or JSON. Closing the event stream
//! drops the run handle, which cancels the session.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{FromRequest, Request, State};
use axum::http::{StatusCode, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use futures_util::{Stream, StreamExt, stream};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use crate::profile::{DEFAULT_PROFILE_ID, ProfileSummary};
use crate::report::{FileReportStore, ReportSink};
use crate::research::{Orchestrator, RunEvent};

#[derive(Clone)]
struct AppState {
    orchestrator: Arc<Orchestrator>,
    store: FileReportStore,
}

/// Body of `POST /generate-report`.
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    /// The research question.
    #[serde(default)]
    pub query: String,
    /// Profile id.
    #[serde(default = "default_industry")]
    pub industry: String,
    /// Iteration budget; the configured default when absent.
    #[serde(default)]
    pub max_iterations: Option<u32>,
}

/// Body of `POST /save-report`.
#[derive(Debug, Deserialize)]
pub struct SaveRequest {
    /// The research question.
    #[serde(default)]
    pub query: String,
    /// Profile id.
    #[serde(default = "default_industry")]
    pub industry: String,
    /// Report text to persist.
    #[serde(default)]
    pub report_content: String,
}

fn default_industry() -> String {
    DEFAULT_PROFILE_ID.to_string()
}

/// Extracts a body sent either as JSON or as a urlencoded form.
struct FormOrJson<T>(T);

impl<S, T> FromRequest<S> for FormOrJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));

        if is_json {
            let Json(value) = Json::<T>::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            Ok(Self(value))
        } else {
            let Form(value) = Form::<T>::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            Ok(Self(value))
        }
    }
}

/// Builds the router.
pub fn router(orchestrator: Orchestrator, store: FileReportStore) -> Router {
    let state = AppState {
        orchestrator: Arc::new(orchestrator),
        store,
    };
    Router::new()
        .route("/profiles", get(list_profiles))
        .route("/generate-report", post(generate_report))
        .route("/save-report", post(save_report))
        .with_state(state)
}

/// Serves the report API until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the listener cannot bind or the server fails.
pub async fn serve(
    orchestrator: Orchestrator,
    store: FileReportStore,
    host: &str,
    port: u16,
) -> anyhow::Result<()> {
    let app = router(orchestrator, store);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "report API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}

async fn list_profiles(State(state): State<AppState>) -> Json<Vec<ProfileSummary>> {
    Json(state.orchestrator.profiles().summaries())
}

async fn generate_report(
    State(state): State<AppState>,
    FormOrJson(req): FormOrJson<GenerateRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let max_iterations = req
        .max_iterations
        .unwrap_or_else(|| state.orchestrator.config().max_iterations.get());
    info!(industry = %req.industry, max_iterations, "report requested");

    let run = state
        .orchestrator
        .run(&req.query, &req.industry, max_iterations);
    let events = run
        .map(|event| Ok(to_sse(&event)))
        .chain(stream::once(async { Ok(Event::default().data("[DONE]")) }));

    Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

fn to_sse(event: &RunEvent) -> Event {
    let payload = match event {
        Ok(chunk) => serde_json::json!({
            "content": chunk.text,
            "citations": chunk.citations,
        }),
        Err(e) => serde_json::json!({
            "error": e.to_string(),
            "kind": e.kind(),
        }),
    };
    Event::default().data(payload.to_string())
}

async fn save_report(
    State(state): State<AppState>,
    FormOrJson(req): FormOrJson<SaveRequest>,
) -> Response {
    let store = state.store.clone();
    let saved = tokio::task::spawn_blocking(move || {
        store.save(&req.query, &req.industry, &req.report_content)
    })
    .await;

    match saved {
        Ok(Ok(path)) => {
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            Json(serde_json::json!({ "success": true, "filename": filename })).into_response()
        }
        Ok(Err(e)) => {
            warn!(error = %e, "report not saved");
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": format!("save task failed: {e}") })),
        )
            .into_response(),
    }
}

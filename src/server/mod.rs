//! HTTP surface.
//!
//! Authentication is handled by the fronting proxy, which verifies the
//! worker's session and injects `x-worker-id` and `x-is-manager` headers.
//! This server trusts those headers and enforces manager-only routes on
//! them.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::catalog::{Language, ProtocolCatalog};
use crate::chat::{ChatEvent, ChatOrchestrator};
use crate::db::{Database, Shift};
use crate::error::DatabaseError;
use crate::llm::ChatMessage;
use crate::schedule::{task_status_list, week_schedule, worker_tasks};
use crate::week::{parse_date, sunday_of_week};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn Database>,
    pub catalog: Arc<dyn ProtocolCatalog>,
    pub chat: Arc<ChatOrchestrator>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/schedule-chat", post(schedule_chat))
        .route("/api/schedule", get(get_schedule).post(post_schedule))
        .route("/api/my-tasks", get(my_tasks))
        .route("/api/my-tasks/{assignment_id}/complete", post(complete_task))
        .route("/api/task-status", get(task_status))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind and serve until shutdown.
pub async fn serve(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "Listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ==================== Error mapping ====================

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn forbidden() -> Self {
        Self::new(StatusCode::FORBIDDEN, "Manager access required")
    }

    fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Missing worker identity")
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound => Self::new(StatusCode::NOT_FOUND, "Not found"),
            DatabaseError::UniqueViolation(what) => {
                Self::new(StatusCode::CONFLICT, format!("Already exists: {what}"))
            }
            other => {
                tracing::error!(error = %other, "Storage failure");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Storage failure")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({"error": self.message}));
        (self.status, body).into_response()
    }
}

// ==================== Header identity ====================

fn is_manager(headers: &HeaderMap) -> bool {
    headers
        .get("x-is-manager")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "true")
}

fn acting_worker(headers: &HeaderMap) -> Option<i64> {
    headers
        .get("x-worker-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

fn parse_week(raw: Option<&str>) -> Result<NaiveDate, ApiError> {
    match raw {
        None => Ok(sunday_of_week(today())),
        Some(raw) => parse_date(raw)
            .map(sunday_of_week)
            .ok_or_else(|| ApiError::bad_request(format!("Invalid date: {raw}"))),
    }
}

fn today() -> NaiveDate {
    chrono::Utc::now().date_naive()
}

// ==================== Handlers ====================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    messages: Vec<IncomingMessage>,
    /// Optional date anchoring "today" for the conversation.
    #[serde(default)]
    week: Option<String>,
}

async fn schedule_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    if !is_manager(&headers) {
        return Err(ApiError::forbidden());
    }

    let today = match body.week.as_deref() {
        None => today(),
        Some(raw) => {
            parse_date(raw).ok_or_else(|| ApiError::bad_request(format!("Invalid date: {raw}")))?
        }
    };

    let history: Vec<ChatMessage> = body
        .messages
        .iter()
        .filter_map(|m| match m.role.as_str() {
            "user" => Some(ChatMessage::user(&m.content)),
            "assistant" => Some(ChatMessage::assistant(&m.content)),
            _ => None,
        })
        .collect();
    if history.is_empty() {
        return Err(ApiError::bad_request("No messages"));
    }

    let events = state.chat.run(history, today);
    let stream = ReceiverStream::new(events).map(|event| {
        let event = match event {
            ChatEvent::Done => Event::default().data("[DONE]"),
            other => match serde_json::to_string(&other) {
                Ok(json) => Event::default().data(json),
                Err(_) => Event::default().data(r#"{"error":"serialization failed"}"#),
            },
        };
        Ok(event)
    });

    Ok(Sse::new(stream))
}

#[derive(Debug, Deserialize)]
struct WeekQuery {
    #[serde(default)]
    week: Option<String>,
    #[serde(default)]
    lang: Option<Language>,
}

async fn get_schedule(
    State(state): State<AppState>,
    Query(query): Query<WeekQuery>,
) -> Result<Json<crate::schedule::WeekSchedule>, ApiError> {
    let sunday = parse_week(query.week.as_deref())?;
    let lang = query.lang.unwrap_or_default();
    let grid = week_schedule(state.db.as_ref(), state.catalog.as_ref(), sunday, lang).await?;
    Ok(Json(grid))
}

#[derive(Debug, Deserialize)]
struct BulkAssignment {
    worker_id: i64,
    protocol_slug: String,
    date: String,
    shift: Shift,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BulkAssignRequest {
    assignments: Vec<BulkAssignment>,
}

#[derive(Debug, Serialize)]
struct BulkAssignResponse {
    assigned: usize,
}

async fn post_schedule(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<BulkAssignRequest>,
) -> Result<Json<BulkAssignResponse>, ApiError> {
    if !is_manager(&headers) {
        return Err(ApiError::forbidden());
    }

    let mut assigned = 0;
    for entry in &body.assignments {
        let date = parse_date(&entry.date)
            .ok_or_else(|| ApiError::bad_request(format!("Invalid date: {}", entry.date)))?;
        state
            .db
            .assign(
                entry.worker_id,
                &entry.protocol_slug,
                date,
                entry.shift,
                entry.notes.as_deref(),
            )
            .await?;
        assigned += 1;
    }
    Ok(Json(BulkAssignResponse { assigned }))
}

#[derive(Debug, Deserialize)]
struct MyTasksQuery {
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    lang: Option<Language>,
}

async fn my_tasks(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<MyTasksQuery>,
) -> Result<Json<Vec<crate::db::AssignmentRow>>, ApiError> {
    let worker_id = acting_worker(&headers).ok_or_else(ApiError::unauthorized)?;
    let worker = state
        .db
        .get_worker(worker_id)
        .await?
        .ok_or_else(ApiError::unauthorized)?;
    let date = match query.date.as_deref() {
        None => today(),
        Some(raw) => {
            parse_date(raw).ok_or_else(|| ApiError::bad_request(format!("Invalid date: {raw}")))?
        }
    };
    let lang = query.lang.unwrap_or_default();
    let tasks = worker_tasks(
        state.db.as_ref(),
        state.catalog.as_ref(),
        worker.id,
        date,
        lang,
    )
    .await?;
    Ok(Json(tasks))
}

#[derive(Debug, Serialize)]
struct CompleteResponse {
    completed: bool,
}

async fn complete_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(assignment_id): Path<i64>,
) -> Result<Json<CompleteResponse>, ApiError> {
    let worker_id = acting_worker(&headers).ok_or_else(ApiError::unauthorized)?;
    let completed = state.db.toggle_complete(assignment_id, worker_id).await?;
    Ok(Json(CompleteResponse { completed }))
}

#[derive(Debug, Deserialize)]
struct TaskStatusQuery {
    #[serde(default)]
    week: Option<String>,
    #[serde(default)]
    worker_id: Option<i64>,
    #[serde(default)]
    lang: Option<Language>,
}

async fn task_status(
    State(state): State<AppState>,
    Query(query): Query<TaskStatusQuery>,
) -> Result<Json<Vec<crate::schedule::TaskStatus>>, ApiError> {
    let sunday = parse_week(query.week.as_deref())?;
    let lang = query.lang.unwrap_or_default();
    let statuses = task_status_list(
        state.db.as_ref(),
        state.catalog.as_ref(),
        sunday,
        query.worker_id,
        lang,
    )
    .await?;
    Ok(Json(statuses))
}

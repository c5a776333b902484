use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::Json;
use convo_agent::Transcript;
use convo_core::prompts::PREDEFINED_PROMPTS;
use convo_core::session::{HistoryEntry, SessionSummary};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

type ApiResult<T> = Result<Json<T>, ApiError>;

fn default_session_id() -> String {
    "default_user".to_string()
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub content: String,
    #[serde(default = "default_session_id")]
    pub session_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub messages: Vec<HistoryEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PromptResponse {
    pub prompt: String,
}

#[derive(Debug, Deserialize)]
pub struct SetPromptRequest {
    pub prompt: String,
    /// Accepted for compatibility; the path id is authoritative
    #[serde(default)]
    #[allow(dead_code)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    fn success() -> Json<Self> {
        Json(Self {
            status: "success".to_string(),
        })
    }
}

pub async fn chat_handler(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> ApiResult<ChatResponse> {
    let response = state
        .agent
        .chat(&payload.session_id, &payload.content)
        .await?;
    Ok(Json(ChatResponse { response }))
}

pub async fn list_sessions_handler(State(state): State<AppState>) -> ApiResult<Vec<SessionSummary>> {
    Ok(Json(state.agent.list_sessions().await?))
}

pub async fn history_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<HistoryResponse> {
    let messages = state.agent.history(&session_id).await?;
    Ok(Json(HistoryResponse { messages }))
}

pub async fn full_history_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Transcript> {
    Ok(Json(state.agent.transcript(&session_id).await?))
}

pub async fn get_prompt_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<PromptResponse> {
    let prompt = state.agent.resolve_system_prompt(&session_id).await?;
    Ok(Json(PromptResponse { prompt }))
}

pub async fn set_prompt_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(payload): Json<SetPromptRequest>,
) -> ApiResult<StatusResponse> {
    state
        .agent
        .set_system_prompt(&session_id, &payload.prompt)
        .await?;
    Ok(StatusResponse::success())
}

pub async fn use_prompt_handler(
    State(state): State<AppState>,
    Path((session_id, prompt_type)): Path<(String, String)>,
) -> ApiResult<StatusResponse> {
    match state
        .agent
        .use_predefined_prompt(&session_id, &prompt_type)
        .await
    {
        Ok(_) => Ok(StatusResponse::success()),
        Err(e) if e.is_not_found() => {
            Err(ApiError::NotFound("Prompt type not found".to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn delete_session_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<StatusResponse> {
    state.agent.reset(&session_id).await?;
    Ok(StatusResponse::success())
}

pub async fn prompts_handler() -> Json<BTreeMap<&'static str, &'static str>> {
    Json(PREDEFINED_PROMPTS.iter().copied().collect())
}

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use crate::{
    app_state::{AppState, SharedSession},
    models::{ChatMessage, ResultLink, SearchResult},
    path_links::{self, PathLink},
    render::{self, Segment},
};

type ApiError = (StatusCode, Json<serde_json::Value>);

// --- Payloads y Respuestas de la API ---

#[derive(Deserialize)]
pub struct SendMessagePayload {
    content: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialRequestPayload {
    #[serde(default)]
    consent: bool,
    #[serde(default)]
    user_identification: Option<String>,
}

#[derive(Deserialize)]
pub struct InstructionsPayload {
    instructions: String,
}

#[derive(Deserialize)]
pub struct DecodeQuery {
    link: String,
}

/// Mensaje con su contenido ya dividido en segmentos, línea a línea.
#[derive(Serialize)]
pub struct RenderedMessage {
    #[serde(flatten)]
    message: ChatMessage,
    lines: Vec<Vec<Segment>>,
}

impl From<ChatMessage> for RenderedMessage {
    fn from(message: ChatMessage) -> Self {
        let lines = render::render_message(&message.content);
        Self { message, lines }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    session_id: String,
    messages: Vec<RenderedMessage>,
    results: Vec<SearchResult>,
    error: Option<String>,
}

#[derive(Serialize)]
pub struct SendMessageResponse {
    message: RenderedMessage,
    links: Vec<ResultLink>,
    results: Vec<SearchResult>,
}

#[derive(Serialize)]
pub struct ConfirmationResponse {
    message: RenderedMessage,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/sessions", post(create_session_handler))
        .route("/api/sessions/:id", delete(delete_session_handler))
        .route(
            "/api/sessions/:id/messages",
            get(list_messages_handler).post(send_message_handler),
        )
        .route(
            "/api/sessions/:id/material-request",
            post(material_request_handler),
        )
        .route("/api/sessions/:id/instructions", put(instructions_handler))
        .route("/api/sessions/:id/clear", post(clear_handler))
        .route("/api/paths/decode", get(decode_path_handler))
        .with_state(app_state)
}

// --- Handlers ---

#[axum::debug_handler]
async fn create_session_handler(State(state): State<AppState>) -> (StatusCode, Json<SessionResponse>) {
    let (session_id, shared) = state.create_session();
    info!("Nueva sesión de chat: {session_id}");
    let session = shared.lock().await;
    let messages: Vec<RenderedMessage> =
        session.messages().iter().cloned().map(Into::into).collect();
    (
        StatusCode::CREATED,
        Json(SessionResponse {
            session_id,
            messages,
            results: Vec::new(),
            error: None,
        }),
    )
}

#[axum::debug_handler]
async fn delete_session_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.remove_session(&id) {
        info!("Sesión de chat eliminada: {id}");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Sesión no encontrada: {id}"),
        ))
    }
}

#[axum::debug_handler]
async fn list_messages_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let shared = find_session(&state, &id)?;
    let session = shared.lock().await;

    let results = if session.results_visible() {
        session.current_results().to_vec()
    } else {
        Vec::new()
    };

    Ok(Json(SessionResponse {
        session_id: id,
        messages: session.messages().iter().cloned().map(Into::into).collect(),
        results,
        error: session.last_error().map(str::to_string),
    }))
}

#[axum::debug_handler]
async fn send_message_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<SendMessagePayload>,
) -> Result<Response, ApiError> {
    let shared = find_session(&state, &id)?;
    let mut session = shared.lock().await;

    match session.send_message(state.backend.as_ref(), &payload.content).await {
        Ok(Some(reply)) => Ok(Json(SendMessageResponse {
            message: reply.message.into(),
            links: reply.formatted.links,
            results: reply.results,
        })
        .into_response()),
        Ok(None) => Ok(StatusCode::NO_CONTENT.into_response()),
        Err(e) => {
            error!("Error en la búsqueda de la sesión {id}: {e}");
            Err(api_error(
                StatusCode::BAD_GATEWAY,
                format!("Error al consultar la Perk API: {e}"),
            ))
        }
    }
}

#[axum::debug_handler]
async fn material_request_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<MaterialRequestPayload>,
) -> Result<Json<ConfirmationResponse>, ApiError> {
    let shared = find_session(&state, &id)?;
    let mut session = shared.lock().await;

    session
        .submit_material_request(
            state.backend.as_ref(),
            payload.consent,
            payload.user_identification,
        )
        .await
        .map(|message| {
            Json(ConfirmationResponse {
                message: message.into(),
            })
        })
        .map_err(|e| {
            error!("Error en la solicitud de material de la sesión {id}: {e}");
            api_error(
                StatusCode::BAD_GATEWAY,
                format!("Failed to submit request: {e}"),
            )
        })
}

#[axum::debug_handler]
async fn instructions_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<InstructionsPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let shared = find_session(&state, &id)?;
    let mut session = shared.lock().await;
    session.set_custom_instructions(payload.instructions);
    Ok(Json(json!({ "systemPrompt": session.full_system_prompt() })))
}

#[axum::debug_handler]
async fn clear_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let shared = find_session(&state, &id)?;
    shared.lock().await.clear();
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
async fn decode_path_handler(
    Query(query): Query<DecodeQuery>,
) -> Result<Json<PathLink>, ApiError> {
    path_links::decode(&query.link).map(Json).ok_or_else(|| {
        api_error(
            StatusCode::NOT_FOUND,
            format!("'{}' no es un enlace de ruta.", query.link),
        )
    })
}

// --- Utilidades ---

fn find_session(state: &AppState, id: &str) -> Result<SharedSession, ApiError> {
    state
        .session(id)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("Sesión no encontrada: {id}")))
}

fn api_error(status: StatusCode, message: String) -> ApiError {
    (status, Json(json!({ "error": message })))
}

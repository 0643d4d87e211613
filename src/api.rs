use axum::{
    extract::{Form, Json, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use crate::{
    app_state::{AppState, Status},
    chat::ChatView,
    normalize, render,
    retrieval::RetrievalError,
    session::{session_id_from, ChatSession},
};

// --- Payloads de formularios y de la API ---

#[derive(Deserialize)]
pub struct ChatPayload {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
pub struct PagePayload {
    page: usize,
}

#[derive(Deserialize)]
pub struct TogglePayload {
    item_id: String,
}

#[derive(Deserialize)]
pub struct SearchParams {
    q: Option<String>,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(json!({ "status": "error", "message": message.into() })),
    )
}

// --- Router ---

/// Router completo: vista, API, ficheros estáticos, CORS abierto (el proxy de
/// búsqueda es público) y trazas HTTP.
pub fn create_router(app_state: AppState) -> Router {
    let static_dir = ServeDir::new(&app_state.config.static_dir);
    Router::new()
        .route("/", get(index_handler))
        .route("/chat", post(chat_form_handler))
        .route("/messages/:id/page", post(page_handler))
        .route("/items/toggle", post(toggle_handler))
        .route("/api/chat", post(chat_api_handler))
        .route("/api/messages", get(messages_handler))
        .route("/api/search", get(search_handler))
        .route("/api/status", get(status_handler))
        .nest_service("/static", static_dir)
        .fallback(not_found_handler)
        .with_state(app_state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

// --- Sesiones ---

fn session_of(state: &AppState, headers: &HeaderMap) -> ChatSession {
    state.sessions.resolve(session_id_from(headers).as_deref())
}

/// Añade la cookie de sesión a la respuesta cuando la sesión es nueva.
fn with_session(session: &ChatSession, response: impl IntoResponse) -> Response {
    let mut response = response.into_response();
    if let Some(cookie) = session.set_cookie() {
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => warn!("Cookie de sesión no válida: {}", e),
        }
    }
    response
}

fn snapshot(state: &AppState, session: &ChatSession) -> ChatView {
    state.sessions.with_view(&session.id, |view| view.clone())
}

// --- Handlers de la vista ---

#[axum::debug_handler]
async fn index_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let session = session_of(&state, &headers);
    let page = state
        .sessions
        .with_view(&session.id, |view| render::render_page(view));
    with_session(&session, Html(page))
}

#[axum::debug_handler]
async fn chat_form_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(payload): Form<ChatPayload>,
) -> Response {
    let session = session_of(&state, &headers);
    submit(&state, &session, &payload.text).await;
    with_session(&session, Redirect::to("/"))
}

#[axum::debug_handler]
async fn page_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(message_id): Path<String>,
    Form(payload): Form<PagePayload>,
) -> Response {
    let session = session_of(&state, &headers);
    let page = state
        .sessions
        .with_view(&session.id, |view| view.set_page(&message_id, payload.page));
    let redirect = match page {
        Some(_) => Redirect::to(&format!("/#msg-{message_id}")),
        None => Redirect::to("/"),
    };
    with_session(&session, redirect)
}

#[axum::debug_handler]
async fn toggle_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(payload): Form<TogglePayload>,
) -> Response {
    let session = session_of(&state, &headers);
    let owner = state.sessions.with_view(&session.id, |view| {
        view.toggle_expanded(&payload.item_id)?;
        view.item_message_id(&payload.item_id).map(str::to_string)
    });
    let redirect = match owner {
        Some(message_id) => Redirect::to(&format!("/#msg-{message_id}")),
        None => {
            warn!("Resultado desconocido al expandir: {}", payload.item_id);
            Redirect::to("/")
        }
    };
    with_session(&session, redirect)
}

/// Envía la consulta, espera al servicio de recuperación y añade la respuesta.
/// La vista no queda bloqueada mientras la petición está en vuelo.
async fn submit(state: &AppState, session: &ChatSession, text: &str) {
    let pending = state.sessions.with_view(&session.id, |view| view.send(text));
    let Some(pending) = pending else {
        return;
    };

    info!("Consultando el servicio de recuperación: '{}'", pending.query);
    let reply = state
        .retrieval
        .retrieve(&pending.query)
        .await
        .map(|body| normalize::classify_response(&body, state.config.html_decoder));

    state
        .sessions
        .with_view(&session.id, |view| view.resolve(pending, reply));
}

// --- API JSON ---

#[axum::debug_handler]
async fn chat_api_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ChatPayload>,
) -> Response {
    let session = session_of(&state, &headers);
    submit(&state, &session, &payload.text).await;
    with_session(&session, Json(snapshot(&state, &session)))
}

#[axum::debug_handler]
async fn messages_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let session = session_of(&state, &headers);
    with_session(&session, Json(snapshot(&state, &session)))
}

#[axum::debug_handler]
async fn status_handler(State(state): State<AppState>) -> Json<Status> {
    Json(state.status())
}

/// Proxy hacia el servicio externo: reenvía el JSON tal cual cuando responde 200.
#[axum::debug_handler]
async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Response, ApiError> {
    let query = params
        .q
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| {
            api_error(
                StatusCode::BAD_REQUEST,
                "Falta el parámetro 'q' de búsqueda.",
            )
        })?;

    let _permit = state.proxy_limiter.clone().acquire_owned().await.map_err(|_| {
        api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Pool de conexiones no disponible.",
        )
    })?;

    let fetched = tokio::time::timeout(
        state.config.request_timeout,
        state.retrieval.fetch_raw(&query),
    )
    .await;

    match fetched {
        Ok(Ok(raw)) if raw.status == StatusCode::OK => Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json; charset=utf-8")],
            raw.body,
        )
            .into_response()),
        Ok(Ok(raw)) => {
            warn!("El servicio externo respondió {} para '{}'", raw.status, query);
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error del servicio externo. Código: {}", raw.status.as_u16()),
            ))
        }
        Ok(Err(e)) => {
            error!("Error al conectar con el servicio externo: {}", e);
            let detail = match &e {
                RetrievalError::Transport(inner) => inner.to_string(),
                other => other.to_string(),
            };
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Fallo en la comunicación con el servidor: {detail}"),
            ))
        }
        Err(_) => {
            error!("Tiempo de espera agotado consultando '{}'", query);
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Fallo en la comunicación con el servidor: tiempo de espera agotado",
            ))
        }
    }
}

async fn not_found_handler() -> ApiError {
    api_error(StatusCode::NOT_FOUND, "Ruta no encontrada")
}

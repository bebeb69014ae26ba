use axum::{
    extract::{ws::WebSocketUpgrade, Path, State},
    http::StatusCode,
    response::Response,
    routing::get,
    Json, Router,
};
use tower_http::trace::TraceLayer;

use application::{ConversationDto, PresenceDto};
use config::ServerConfig;
use domain::Identity;

use crate::{cors::cors_layer, error::ApiError, state::AppState, ws_connection::WebSocketConnection};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .with_state(state)
}

/// 带 CORS 与请求追踪的完整应用
pub fn app(state: AppState, server: &ServerConfig) -> Router {
    router(state)
        .layer(cors_layer(&server.cors_origins))
        .layer(TraceLayer::new_for_http())
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(websocket_upgrade))
        .route("/presence/online", get(online_identities))
        .route("/presence/{identity}", get(presence_status))
        .route(
            "/conversations/{identity}/{target}",
            get(conversation_between),
        )
}

async fn health() -> StatusCode {
    StatusCode::OK
}

fn parse_identity(value: String) -> Result<Identity, ApiError> {
    Identity::parse(value).map_err(|err| ApiError::bad_request(err.to_string()))
}

async fn online_identities(State(state): State<AppState>) -> Json<Vec<Identity>> {
    Json(state.chat_service.hub().online_identities().await)
}

async fn presence_status(
    State(state): State<AppState>,
    Path(identity): Path<String>,
) -> Result<Json<PresenceDto>, ApiError> {
    let identity = parse_identity(identity)?;
    let online = state.chat_service.hub().is_online(&identity).await;
    Ok(Json(PresenceDto { identity, online }))
}

async fn conversation_between(
    State(state): State<AppState>,
    Path((identity, target)): Path<(String, String)>,
) -> Result<Json<ConversationDto>, ApiError> {
    let identity = parse_identity(identity)?;
    let target = parse_identity(target)?;
    let conversation = state
        .chat_service
        .store()
        .conversation_between(&identity, &target)
        .await?
        .ok_or_else(|| ApiError::not_found("conversation not found"))?;

    Ok(Json(ConversationDto::from(&conversation)))
}

async fn websocket_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| async move {
        WebSocketConnection::new(socket, state).await.run().await;
    })
}

//! WatchRoom 동기 시청 서버

mod config;
mod error;
mod handlers;
mod protocol;
mod provider;
mod recommend;
mod room;
mod state;

use anyhow::Context;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::HeaderValue,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use config::Config;
use futures::{SinkExt, StreamExt};
use protocol::{ClientMessage, RoomSummary, ServerMessage};
use provider::InvidiousProvider;
use state::AppState;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    // 로깅 초기화
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let provider = InvidiousProvider::new(&config.provider)
        .context("failed to build video provider client")?;
    let state = Arc::new(AppState::new(config.clone(), Arc::new(provider)));

    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("🎬 WatchRoom server started");
    tracing::info!("Address: {}", addr);
    tracing::info!("WebSocket: ws://{}/ws", addr);
    tracing::info!("Video API: {}", config.provider.base_url);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/rooms", get(rooms_handler))
        .route("/ws", get(ws_handler))
        .layer(cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if config.allows_any_origin() {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    cors.allow_origin(origins)
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "server": "watchroom-server",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "rooms": state.rooms.len(),
        "connections": state.peers.len(),
    }))
}

async fn rooms_handler(State(state): State<Arc<AppState>>) -> Json<Vec<RoomSummary>> {
    Json(state.rooms.summaries().await)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    // 연결 처리
    let peer_id = handlers::handle_connection(&state, tx.clone());

    // 송신 태스크
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&msg) {
                if ws_sender.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        }
    });

    // 수신 처리
    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => handle_client_message(&state, &peer_id, &tx, msg),
                Err(e) => {
                    tracing::debug!(peer_id = %peer_id, error = %e, "Malformed frame ignored");
                }
            },
            Ok(Message::Close(_)) => break,
            Err(_) => break,
            _ => {}
        }
    }

    // 연결 해제
    handlers::handle_disconnect(&state, &peer_id);
    send_task.abort();
}

fn handle_client_message(
    state: &Arc<AppState>,
    peer_id: &str,
    sender: &mpsc::UnboundedSender<ServerMessage>,
    msg: ClientMessage,
) {
    match msg {
        ClientMessage::Heartbeat => {
            handlers::handle_heartbeat(sender);
        }
        ClientMessage::JoinRoom {
            room_id,
            session_id,
            username,
            password,
        } => {
            handlers::handle_join_room(state, peer_id, &room_id, &session_id, username, password);
        }
        other => {
            handlers::handle_room_intent(state, peer_id, other);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use provider::MockVideoProvider;
    use tower::ServiceExt;

    fn test_state() -> Arc<AppState> {
        Arc::new(AppState::new(
            Config::default(),
            Arc::new(MockVideoProvider::new()),
        ))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (status, body) = get_json(router(test_state()), "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["server"], "watchroom-server");
        assert_eq!(body["rooms"], 0);
    }

    #[tokio::test]
    async fn rooms_lists_joined_rooms() {
        // given
        let state = test_state();
        let (tx, _rx) = mpsc::unbounded_channel();
        let peer_id = handlers::handle_connection(&state, tx);
        handlers::handle_join_room(&state, &peer_id, "lobby", "s-1", Some("Alice".into()), None);

        // when
        let (status, body) = get_json(router(state), "/api/rooms").await;

        // then
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["id"], "lobby");
        assert_eq!(body[0]["user_count"], 1);
        assert_eq!(body[0]["admin_name"], "Alice");
        assert_eq!(body[0]["is_private"], false);
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let response = router(test_state())
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

//! Rapid Keys 매치 코디네이터 서버

mod config;
mod domain;
mod error;
mod handlers;
mod protocol;
mod session;
mod state;
mod store;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::HeaderValue,
    response::{Html, IntoResponse, Json},
    routing::{get, post},
    Router,
};
use config::Config;
use futures::{SinkExt, StreamExt};
use protocol::{ClientMessage, ServerMessage};
use session::ClientSender;
use state::AppState;
use std::sync::Arc;
use store::InMemoryMatchStore;
use tokio::sync::mpsc;
use tower::ServiceBuilder;
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

    let state = Arc::new(AppState::new(
        config.clone(),
        Arc::new(InMemoryMatchStore::new()),
    ));

    // 종료 매치 정리 스케줄러
    let cleanup_state = state.clone();
    let cleanup_interval = config.matches.cleanup_interval();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_interval);
        loop {
            interval.tick().await;
            handlers::cleanup_finished_matches(&cleanup_state).await;
        }
    });

    // 라우터 설정
    let app = Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .route(
            "/api/match/:name",
            get(handlers::get_match_handler).delete(handlers::delete_match_handler),
        )
        .route("/api/check_room", post(handlers::check_room_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&config)),
        )
        .with_state(state.clone());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Rapid Keys match server started");
    tracing::info!("Address: {}", addr);
    tracing::info!("WebSocket: ws://{}/ws", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

fn cors_layer(config: &Config) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if config.allows_any_origin() {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(origins)
}

async fn index_handler() -> Html<&'static str> {
    Html("<h1>Rapid Keys Match Server</h1><p>WebSocket endpoint: /ws</p>")
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "server": "rapid-keys-server",
        "activeMatches": state.sessions.tracked_matches(),
        "timestamp": domain::now_millis() / 1000
    }))
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

    let connection_id = handlers::handle_connection();

    // 송신 태스크
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(err) => tracing::error!(error = %err, "Failed to encode server message"),
            }
        }
    });

    // 수신 처리
    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                handle_text_frame(&state, &connection_id, &tx, &text).await;
            }
            Ok(Message::Close(_)) => break,
            Err(err) => {
                tracing::debug!(connection_id = %connection_id, error = %err, "WebSocket receive error");
                break;
            }
            _ => {}
        }
    }

    // 연결 해제
    handlers::handle_disconnect(&state, &connection_id).await;
    send_task.abort();
}

/// 텍스트 프레임 처리. 해석할 수 없는 프레임은 오류로 응답하고 연결은 유지한다.
async fn handle_text_frame(state: &AppState, connection_id: &str, sender: &ClientSender, text: &str) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(msg) => handle_client_message(state, connection_id, sender, msg).await,
        Err(err) => {
            tracing::warn!(connection_id = %connection_id, error = %err, "Malformed message");
            let _ = sender.send(ServerMessage::error("Malformed message"));
        }
    }
}

async fn handle_client_message(
    state: &AppState,
    connection_id: &str,
    sender: &ClientSender,
    msg: ClientMessage,
) {
    match msg {
        ClientMessage::RoomJoin {
            player_name,
            room_id,
        } => {
            handlers::handle_room_join(
                state,
                connection_id,
                sender,
                &player_name,
                &room_id.to_string(),
            )
            .await;
        }
        ClientMessage::Join { player_name } => {
            handlers::handle_join(state, connection_id, sender, &player_name).await;
        }
        ClientMessage::Progress {
            match_name,
            player_name,
            progress,
            wpm,
        } => {
            handlers::handle_progress(state, &match_name, &player_name, progress, wpm);
        }
        ClientMessage::Winner { match_name, winner } => {
            handlers::handle_winner_claim(state, connection_id, sender, &match_name, &winner)
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::{stored, test_state, update, TestClient};

    #[tokio::test]
    async fn test_malformed_frames_reply_with_error_and_keep_session() {
        let state = test_state();
        let mut client = TestClient::new();

        handle_text_frame(&state, &client.id, &client.sender, "{not json").await;
        assert_eq!(client.drain(), vec![ServerMessage::error("Malformed message")]);

        handle_text_frame(&state, &client.id, &client.sender, r#"{"type":"chat","text":"hi"}"#).await;
        assert_eq!(client.drain(), vec![ServerMessage::error("Malformed message")]);

        handle_text_frame(&state, &client.id, &client.sender, r#"{"type":"room_join","playerName":"P1"}"#)
            .await;
        assert_eq!(client.drain(), vec![ServerMessage::error("Malformed message")]);

        // 이후의 정상 메시지는 그대로 처리된다
        handle_text_frame(
            &state,
            &client.id,
            &client.sender,
            r#"{"type":"room_join","playerName":"P1","roomId":5}"#,
        )
        .await;
        assert_eq!(client.drain(), vec![update("Match-5", &["P1"])]);
        assert_eq!(stored(&state, "Match-5").await.players, vec!["P1"]);
        assert_eq!(state.sessions.match_of(&client.id).as_deref(), Some("Match-5"));
    }

    #[tokio::test]
    async fn test_text_frames_dispatch_race_messages() {
        let state = test_state();
        let mut p1 = TestClient::new();
        let mut p2 = TestClient::new();
        handle_text_frame(&state, &p1.id, &p1.sender, r#"{"type":"room_join","playerName":"P1","roomId":"8"}"#).await;
        handle_text_frame(&state, &p2.id, &p2.sender, r#"{"type":"room_join","playerName":"P2","roomId":"8"}"#).await;
        p1.drain();
        p2.drain();

        handle_text_frame(
            &state,
            &p1.id,
            &p1.sender,
            r#"{"type":"progress","matchName":"Match-8","playerName":"P1","progress":40,"wpm":72}"#,
        )
        .await;
        assert_eq!(
            p2.drain(),
            vec![ServerMessage::Progress {
                player_name: "P1".into(),
                progress: serde_json::json!(40),
                wpm: serde_json::json!(72),
            }]
        );

        handle_text_frame(
            &state,
            &p2.id,
            &p2.sender,
            r#"{"type":"winner","matchName":"Match-8","winner":"P2"}"#,
        )
        .await;
        let expected = vec![ServerMessage::Winner { winner: "P2".into() }];
        assert_eq!(p1.drain(), expected);
        assert_eq!(stored(&state, "Match-8").await.winner.as_deref(), Some("P2"));
    }
}

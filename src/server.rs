use crate::Result;
use crate::config::AdminConfig;
use crate::engine::GameEngine;
use crate::game::{GameError, RoomId, UserId};
use axum::{
    Router,
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{Path, Query},
    response::Json,
    routing::{get, post},
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info, warn};

const DEFAULT_LEADERBOARD_SIZE: usize = 10;
const DEFAULT_HISTORY_SIZE: usize = 5;

#[derive(Debug, Deserialize)]
pub struct PlayerRequest {
    pub user_id: UserId,
    pub user_name: String,
}

#[derive(Debug, Deserialize)]
pub struct LeaveRequest {
    pub user_id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct WordRequest {
    pub user_id: UserId,
    pub user_name: String,
    pub word: String,
}

#[derive(Debug, Deserialize)]
pub struct EndRequest {
    pub user_id: UserId,
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Envelope for every HTTP response
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ErrorBody>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        })
    }

    fn fail(code: &str, message: String) -> Json<Self> {
        Json(ApiResponse {
            success: false,
            data: None,
            error: Some(ErrorBody {
                code: code.to_string(),
                message,
            }),
        })
    }

    fn from_result(result: std::result::Result<T, GameError>) -> Json<Self> {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::fail(&error_code(&e), e.to_string()),
        }
    }
}

/// Machine-readable name of a rejected command, e.g. `no_session`
fn error_code(error: &GameError) -> String {
    serde_json::to_value(error)
        .ok()
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}

/// HTTP and WebSocket front end over a `GameEngine`
#[derive(Clone)]
pub struct ApiServer {
    engine: GameEngine,
    admin: AdminConfig,
}

impl ApiServer {
    pub fn new(engine: GameEngine, admin: AdminConfig) -> Self {
        ApiServer { engine, admin }
    }

    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route(
                "/rooms/:room_id",
                get({
                    let engine = self.engine.clone();
                    move |Path(room_id): Path<RoomId>| async move {
                        match engine.get_info(room_id).await {
                            Some(snapshot) => ApiResponse::ok(snapshot),
                            None => ApiResponse::fail(
                                &error_code(&GameError::NoSession),
                                GameError::NoSession.to_string(),
                            ),
                        }
                    }
                }),
            )
            .route(
                "/rooms/:room_id/start",
                post({
                    let engine = self.engine.clone();
                    move |Path(room_id): Path<RoomId>, Json(req): Json<PlayerRequest>| async move {
                        ApiResponse::from_result(
                            engine.start(room_id, req.user_id, &req.user_name).await,
                        )
                    }
                }),
            )
            .route(
                "/rooms/:room_id/join",
                post({
                    let engine = self.engine.clone();
                    move |Path(room_id): Path<RoomId>, Json(req): Json<PlayerRequest>| async move {
                        ApiResponse::from_result(
                            engine.join(room_id, req.user_id, &req.user_name).await,
                        )
                    }
                }),
            )
            .route(
                "/rooms/:room_id/leave",
                post({
                    let engine = self.engine.clone();
                    move |Path(room_id): Path<RoomId>, Json(req): Json<LeaveRequest>| async move {
                        ApiResponse::from_result(engine.leave(room_id, req.user_id).await)
                    }
                }),
            )
            .route(
                "/rooms/:room_id/words",
                post({
                    let engine = self.engine.clone();
                    move |Path(room_id): Path<RoomId>, Json(req): Json<WordRequest>| async move {
                        ApiResponse::ok(
                            engine
                                .submit_word(room_id, req.user_id, &req.user_name, &req.word)
                                .await,
                        )
                    }
                }),
            )
            .route(
                "/rooms/:room_id/end",
                post({
                    let engine = self.engine.clone();
                    let admin = self.admin.clone();
                    move |Path(room_id): Path<RoomId>, Json(req): Json<EndRequest>| async move {
                        if !admin.is_admin(req.user_id) {
                            warn!("user {} may not end the game in room {}", req.user_id, room_id);
                            return ApiResponse::fail(
                                "forbidden",
                                "only admins can end a game".to_string(),
                            );
                        }
                        ApiResponse::from_result(engine.end_game(room_id).await)
                    }
                }),
            )
            .route(
                "/rooms/:room_id/history",
                get({
                    let engine = self.engine.clone();
                    move |Path(room_id): Path<RoomId>, Query(query): Query<LimitQuery>| async move {
                        let limit = query.limit.unwrap_or(DEFAULT_HISTORY_SIZE);
                        ApiResponse::ok(engine.room_history(room_id, limit).await)
                    }
                }),
            )
            .route(
                "/rooms/:room_id/events",
                get({
                    let engine = self.engine.clone();
                    move |ws: WebSocketUpgrade, Path(room_id): Path<RoomId>| async move {
                        ws.on_upgrade(move |socket| stream_room_events(socket, room_id, engine))
                    }
                }),
            )
            .route(
                "/leaderboard",
                get({
                    let engine = self.engine.clone();
                    move |Query(query): Query<LimitQuery>| async move {
                        let limit = query.limit.unwrap_or(DEFAULT_LEADERBOARD_SIZE);
                        ApiResponse::ok(engine.leaderboard(limit).await)
                    }
                }),
            )
            .route(
                "/players/:user_id/stats",
                get({
                    let engine = self.engine.clone();
                    move |Path(user_id): Path<UserId>| async move {
                        match engine.player_stats(user_id).await {
                            Some(stats) => ApiResponse::ok(stats),
                            None => ApiResponse::fail(
                                "unknown_player",
                                format!("no stats recorded for {}", user_id),
                            ),
                        }
                    }
                }),
            )
            .layer(cors)
    }

    pub async fn serve(&self, addr: SocketAddr) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| crate::Error::Network(format!("failed to bind {}: {}", addr, e)))?;
        info!("listening on {}", addr);

        axum::serve(listener, self.router())
            .await
            .map_err(|e| {
                error!("server error: {}", e);
                crate::Error::Network(e.to_string())
            })
    }
}

/// Forward one room's outcomes to a WebSocket client until either side closes
async fn stream_room_events(socket: WebSocket, room_id: RoomId, engine: GameEngine) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let mut events = engine.subscribe();
    debug!("event stream opened for room {}", room_id);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) if event.room_id == room_id => {
                    let text = match serde_json::to_string(&event.outcome) {
                        Ok(text) => text,
                        Err(e) => {
                            error!("failed to encode outcome: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!("event stream for room {} skipped {} events", room_id, skipped);
                }
                Err(RecvError::Closed) => break,
            },
            incoming = ws_receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }

    debug!("event stream closed for room {}", room_id);
}

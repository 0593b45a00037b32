use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{Sink, SinkExt, StreamExt};
use pong_shared::config::GameConfig;
use pong_shared::protocol::{
    ClientMsg, ProtocolError, ServerMsg, WelcomeMsg, PROTOCOL_VERSION,
};
use tokio::sync::{mpsc, oneshot};
use tower_http::cors::CorsLayer;

use crate::game_loop::LobbyCommand;

/// Undecodable frames tolerated before the connection is closed.
pub const MAX_PARSE_ERRORS: u32 = 5;

/// Shared app state passed to each WebSocket handler
#[derive(Clone)]
pub struct AppState {
    pub lobby_tx: mpsc::Sender<LobbyCommand>,
    pub outbound_buffer: usize,
    pub game: GameConfig,
}

/// Router serving the game socket at `/ws`.
pub fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

/// HTTP handler for WebSocket upgrade
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, app_state))
}

async fn handle_socket(socket: WebSocket, app_state: AppState) {
    let (mut sink, mut stream) = socket.split();

    // Register with the lobby
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMsg>(app_state.outbound_buffer);
    let (resp_tx, resp_rx) = oneshot::channel();
    if app_state
        .lobby_tx
        .send(LobbyCommand::Connect {
            outbound: out_tx,
            response: resp_tx,
        })
        .await
        .is_err()
    {
        tracing::error!("Failed to send Connect command");
        return;
    }

    let my_id = match resp_rx.await {
        Ok(id) => id,
        Err(_) => {
            tracing::error!("Failed to receive connection id");
            return;
        }
    };

    tracing::info!("Player {} connected", my_id);

    let welcome = ServerMsg::Welcome(WelcomeMsg {
        protocol_version: PROTOCOL_VERSION,
        self_id: my_id,
        config: app_state.game,
    });
    let mut connected = send_msg(&mut sink, &welcome).await;
    let mut parse_errors: u32 = 0;

    while connected {
        tokio::select! {
            // Client -> Server
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match ClientMsg::from_json(text.as_str()) {
                            Ok(client_msg) => {
                                let cmd = match client_msg {
                                    ClientMsg::JoinRoom => LobbyCommand::JoinRoom { conn_id: my_id },
                                    ClientMsg::PaddleMove { direction } => {
                                        LobbyCommand::PaddleMove { conn_id: my_id, direction }
                                    }
                                };
                                if app_state.lobby_tx.send(cmd).await.is_err() {
                                    break;
                                }
                            }
                            Err(ProtocolError::Oversized { len, .. }) => {
                                tracing::warn!("Player {} sent {} byte frame, closing", my_id, len);
                                let _ = sink.send(Message::Close(None)).await;
                                break;
                            }
                            Err(e) => {
                                parse_errors += 1;
                                tracing::debug!("Player {} sent bad frame: {}", my_id, e);
                                if parse_errors >= MAX_PARSE_ERRORS {
                                    tracing::warn!("Player {} exceeded parse error limit, closing", my_id);
                                    let _ = sink.send(Message::Close(None)).await;
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    _ => {} // Ignore ping/pong/binary
                }
            }

            // Server -> Client
            out = out_rx.recv() => {
                match out {
                    Some(msg) => connected = send_msg(&mut sink, &msg).await,
                    None => break,
                }
            }
        }
    }

    // Cleanup on disconnect
    let _ = app_state
        .lobby_tx
        .send(LobbyCommand::Disconnect { conn_id: my_id })
        .await;
    tracing::info!("Player {} disconnected", my_id);
}

/// Encode and send one message. Returns false once the socket is gone.
async fn send_msg<S>(sink: &mut S, msg: &ServerMsg) -> bool
where
    S: Sink<Message> + Unpin,
{
    let json = match msg.to_json() {
        Ok(json) => json,
        Err(e) => {
            tracing::error!("Refusing to send invalid message: {}", e);
            return true;
        }
    };
    sink.send(Message::Text(json.into())).await.is_ok()
}

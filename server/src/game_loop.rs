use std::collections::HashMap;
use std::time::Duration;

use pong_shared::protocol::{ConnId, Direction, ServerMsg};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::lobby::{JoinOutcome, LeaveOutcome, Lobby, MatchHandle, NewMatch};
use crate::match_loop::{deliver_within, run_match, MatchCommand, MatchPeers};

/// Commands from client connections to the lobby task
pub enum LobbyCommand {
    Connect {
        outbound: mpsc::Sender<ServerMsg>,
        response: oneshot::Sender<ConnId>,
    },
    JoinRoom {
        conn_id: ConnId,
    },
    PaddleMove {
        conn_id: ConnId,
        direction: Direction,
    },
    Disconnect {
        conn_id: ConnId,
    },
}

/// Run the lobby. Owns the waiting queue, the match registry and every
/// connection's outbound queue; each paired match runs on its own task.
pub async fn run_lobby(
    mut cmd_rx: mpsc::Receiver<LobbyCommand>,
    server_config: ServerConfig,
    shutdown: CancellationToken,
) {
    let mut lobby = Lobby::new(&server_config, shutdown.clone());
    let mut connections: HashMap<ConnId, mpsc::Sender<ServerMsg>> = HashMap::new();
    let mut next_conn_id: ConnId = 1;
    let (finished_tx, mut finished_rx) = mpsc::unbounded_channel::<String>();

    loop {
        tokio::select! {
            // Finished rooms are unregistered before any later join is seen.
            biased;

            _ = shutdown.cancelled() => break,

            Some(room_id) = finished_rx.recv() => {
                if lobby.finish(&room_id) {
                    tracing::info!(
                        "Match {} finished, {} still running",
                        room_id,
                        lobby.active_matches()
                    );
                }
            }

            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break };
                match cmd {
                    LobbyCommand::Connect { outbound, response } => {
                        let conn_id = alloc_conn_id(&mut next_conn_id, &connections);
                        if response.send(conn_id).is_ok() {
                            connections.insert(conn_id, outbound);
                        }
                    }
                    LobbyCommand::JoinRoom { conn_id } => {
                        if !connections.contains_key(&conn_id) {
                            continue;
                        }
                        match lobby.request_join(conn_id) {
                            JoinOutcome::Queued => {
                                tracing::info!("Player {} waiting for an opponent", conn_id);
                                send_to(&connections, conn_id, ServerMsg::Waiting, server_config.delivery_timeout);
                            }
                            JoinOutcome::AlreadyJoined => {
                                tracing::debug!("Player {} already joined, ignoring", conn_id);
                            }
                            JoinOutcome::Paired(new_match) => {
                                start_match(new_match, &connections, &finished_tx, &server_config);
                            }
                        }
                    }
                    LobbyCommand::PaddleMove { conn_id, direction } => {
                        let Some(handle) = lobby.match_for(conn_id) else {
                            tracing::debug!("Player {} not in a match, move ignored", conn_id);
                            continue;
                        };
                        match handle.commands.try_send(MatchCommand::PaddleMove { conn_id, direction }) {
                            Ok(()) | Err(TrySendError::Closed(_)) => {}
                            Err(TrySendError::Full(_)) => {
                                tracing::warn!("Match input queue full, dropped move from {}", conn_id);
                            }
                        }
                    }
                    LobbyCommand::Disconnect { conn_id } => {
                        connections.remove(&conn_id);
                        match lobby.leave(conn_id) {
                            LeaveOutcome::LeftMatch { room_id, opponent, handle } => {
                                tracing::info!(
                                    "Player {} left match {}, notifying {}",
                                    conn_id,
                                    room_id,
                                    opponent
                                );
                                notify_left(
                                    conn_id,
                                    &handle,
                                    connections.get(&opponent),
                                    opponent,
                                    server_config.delivery_timeout,
                                );
                            }
                            LeaveOutcome::LeftQueue => {
                                tracing::info!("Player {} left the waiting queue", conn_id);
                            }
                            LeaveOutcome::NotJoined => {}
                        }
                    }
                }
            }
        }
    }

    lobby.shutdown();
    tracing::info!("Lobby stopped");
}

/// Next free connection id. Wraps past `u32::MAX`, never hands out 0 or an
/// id still connected.
fn alloc_conn_id(next: &mut ConnId, connections: &HashMap<ConnId, mpsc::Sender<ServerMsg>>) -> ConnId {
    loop {
        let id = *next;
        *next = next.wrapping_add(1);
        if id != 0 && !connections.contains_key(&id) {
            return id;
        }
    }
}

/// Queue `msg` for `conn_id` without blocking the lobby. A full queue gets a
/// bounded wait on a separate task.
fn send_to(
    connections: &HashMap<ConnId, mpsc::Sender<ServerMsg>>,
    conn_id: ConnId,
    msg: ServerMsg,
    timeout: Duration,
) {
    let Some(tx) = connections.get(&conn_id) else {
        return;
    };
    match tx.try_send(msg) {
        Ok(()) | Err(TrySendError::Closed(_)) => {}
        Err(TrySendError::Full(msg)) => {
            tracing::debug!("Outbound queue full for player {}, waiting", conn_id);
            let tx = tx.clone();
            tokio::spawn(async move {
                deliver_within(conn_id, &tx, msg, timeout).await;
            });
        }
    }
}

/// Tell a match that `conn_id` left. If the match is not draining its
/// commands it is cancelled and the lobby notifies the opponent itself.
fn notify_left(
    conn_id: ConnId,
    handle: &MatchHandle,
    opponent_tx: Option<&mpsc::Sender<ServerMsg>>,
    opponent: ConnId,
    timeout: Duration,
) {
    match handle.commands.try_send(MatchCommand::PlayerLeft { conn_id }) {
        // Closed means the match already ended on its own.
        Ok(()) | Err(TrySendError::Closed(_)) => {}
        Err(TrySendError::Full(_)) => {
            tracing::warn!("Match input queue full, cancelling match of {}", conn_id);
            handle.cancel.cancel();
            if let Some(tx) = opponent_tx {
                let tx = tx.clone();
                tokio::spawn(async move {
                    deliver_within(opponent, &tx, ServerMsg::PlayerDisconnected, timeout).await;
                });
            }
        }
    }
}

/// Spawn the loop of a freshly paired match; it announces `game-start`.
fn start_match(
    new_match: NewMatch,
    connections: &HashMap<ConnId, mpsc::Sender<ServerMsg>>,
    finished_tx: &mpsc::UnboundedSender<String>,
    server_config: &ServerConfig,
) {
    let NewMatch {
        state,
        commands,
        cancel,
    } = new_match;
    let [left, right] = state.conn_ids();

    let peer = |id: ConnId| {
        connections
            .get(&id)
            .cloned()
            .map(|tx| (id, tx))
    };
    let (Some(left_peer), Some(right_peer)) = (peer(left), peer(right)) else {
        // Both were registered when they joined; the lobby removes them from
        // the queue before dropping their connection.
        tracing::error!("Paired players {} and {} lack outbound queues", left, right);
        cancel.cancel();
        let _ = finished_tx.send(state.room_id);
        return;
    };

    tracing::info!(
        "Game started in room {} with players {} and {}",
        state.room_id,
        left,
        right
    );

    tokio::spawn(run_match(
        state,
        commands,
        MatchPeers::new([left_peer, right_peer], server_config.delivery_timeout),
        cancel,
        finished_tx.clone(),
        server_config.tick_interval,
    ));
}

use std::time::Duration;

use futures_util::future::join_all;
use pong_shared::protocol::{ConnId, Direction, GameStartMsg, ServerMsg};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::match_state::{MatchState, TickOutcome};

/// Commands routed from the lobby to one match task.
#[derive(Debug)]
pub enum MatchCommand {
    PaddleMove {
        conn_id: ConnId,
        direction: Direction,
    },
    /// `conn_id` disconnected; notify the other player and stop.
    PlayerLeft { conn_id: ConnId },
}

/// Queue `msg` for `conn_id`, waiting at most `timeout` for room in a full
/// queue. Returns false if the message was not queued.
pub async fn deliver_within(
    conn_id: ConnId,
    tx: &mpsc::Sender<ServerMsg>,
    msg: ServerMsg,
    timeout: Duration,
) -> bool {
    match tokio::time::timeout(timeout, tx.send(msg)).await {
        Ok(Ok(())) => true,
        Ok(Err(_)) => false,
        Err(_) => {
            tracing::warn!("Connection {} not draining, dropped message after {:?}", conn_id, timeout);
            false
        }
    }
}

/// Outbound queues of the two connections in a match.
pub struct MatchPeers {
    peers: [(ConnId, mpsc::Sender<ServerMsg>); 2],
    delivery_timeout: Duration,
}

impl MatchPeers {
    pub fn new(peers: [(ConnId, mpsc::Sender<ServerMsg>); 2], delivery_timeout: Duration) -> Self {
        Self {
            peers,
            delivery_timeout,
        }
    }

    /// Best-effort fan-out for state updates. A full queue drops the message;
    /// the next snapshot supersedes it.
    fn push(&self, msg: &ServerMsg) {
        for (conn_id, tx) in &self.peers {
            match tx.try_send(msg.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!("Connection {} lagging, dropped update", conn_id);
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }
    }

    /// Bounded delivery for events that must not be silently superseded.
    async fn deliver(&self, conn_id: ConnId, msg: ServerMsg) {
        if let Some((_, tx)) = self.peers.iter().find(|(id, _)| *id == conn_id) {
            deliver_within(conn_id, tx, msg, self.delivery_timeout).await;
        }
    }

    /// Bounded delivery to both players at once, so a stalled peer costs the
    /// other at most one timeout.
    async fn deliver_all(&self, msg: ServerMsg) {
        join_all(
            self.peers
                .iter()
                .map(|(conn_id, tx)| deliver_within(*conn_id, tx, msg.clone(), self.delivery_timeout)),
        )
        .await;
    }
}

/// Drive one match at a fixed tick until it ends, a player leaves, or
/// `cancel` fires. Ticks and paddle moves are serialized on this task.
///
/// `game-start` goes out from here so it is queued ahead of every update.
/// On a natural end the room id is reported on `finished` before `game-end`
/// is delivered, so the lobby unregisters it even if a peer stalls.
pub async fn run_match(
    mut state: MatchState,
    mut commands: mpsc::Receiver<MatchCommand>,
    peers: MatchPeers,
    cancel: CancellationToken,
    finished: mpsc::UnboundedSender<String>,
    tick_interval: Duration,
) {
    peers
        .deliver_all(ServerMsg::GameStart(GameStartMsg {
            game_state: state.snapshot(),
            room_id: state.room_id.clone(),
        }))
        .await;

    let mut ticker = tokio::time::interval(tick_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick fires immediately; start advancing one interval after
    // game-start went out.
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                tracing::debug!("Match {} cancelled", state.room_id);
                break;
            }

            cmd = commands.recv() => {
                match cmd {
                    Some(MatchCommand::PaddleMove { conn_id, direction }) => {
                        if state.move_paddle(conn_id, direction) {
                            peers.push(&ServerMsg::GameUpdate(state.snapshot()));
                        }
                    }
                    Some(MatchCommand::PlayerLeft { conn_id }) => {
                        if let Some(opponent) = state.opponent_of(conn_id) {
                            peers.deliver(opponent, ServerMsg::PlayerDisconnected).await;
                        }
                        tracing::info!("Match {} abandoned by {}", state.room_id, conn_id);
                        break;
                    }
                    None => break,
                }
            }

            _ = ticker.tick() => {
                match state.tick() {
                    TickOutcome::Running | TickOutcome::Scored(_) => {
                        peers.push(&ServerMsg::GameUpdate(state.snapshot()));
                    }
                    TickOutcome::Ended(side) => {
                        tracing::info!(
                            "Match {} won by {} ({}-{})",
                            state.room_id,
                            side.winner_label(),
                            state.players[0].score,
                            state.players[1].score
                        );
                        if finished.send(state.room_id.clone()).is_err() {
                            tracing::error!("Lobby gone before match {} finished", state.room_id);
                        }
                        peers.deliver_all(ServerMsg::GameEnd(state.snapshot())).await;
                        break;
                    }
                    TickOutcome::Halted => break,
                }
            }
        }
    }

    cancel.cancel();
}

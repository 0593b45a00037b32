use std::collections::{HashMap, VecDeque};

use pong_shared::config::GameConfig;
use pong_shared::protocol::ConnId;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::match_loop::MatchCommand;
use crate::match_state::MatchState;

/// Lobby-side handle to a running match task.
#[derive(Debug, Clone)]
pub struct MatchHandle {
    pub commands: mpsc::Sender<MatchCommand>,
    pub cancel: CancellationToken,
}

struct RoomEntry {
    players: [ConnId; 2],
    handle: MatchHandle,
}

/// A freshly paired match, ready to be handed to its loop.
pub struct NewMatch {
    pub state: MatchState,
    pub commands: mpsc::Receiver<MatchCommand>,
    pub cancel: CancellationToken,
}

pub enum JoinOutcome {
    /// Nobody was waiting; the connection is now queued.
    Queued,
    /// The connection is already queued or playing.
    AlreadyJoined,
    Paired(NewMatch),
}

#[derive(Debug)]
pub enum LeaveOutcome {
    NotJoined,
    LeftQueue,
    LeftMatch {
        room_id: String,
        opponent: ConnId,
        handle: MatchHandle,
    },
}

/// Waiting queue plus the registry of live matches.
///
/// A connection is in at most one of: the queue, one live match.
pub struct Lobby {
    waiting: VecDeque<ConnId>,
    rooms: HashMap<String, RoomEntry>,
    membership: HashMap<ConnId, String>,
    next_room: u64,
    game: GameConfig,
    rng_seed: Option<u64>,
    command_buffer: usize,
    shutdown: CancellationToken,
}

impl Lobby {
    /// `shutdown` is the parent of every match's cancellation token.
    pub fn new(config: &ServerConfig, shutdown: CancellationToken) -> Self {
        Self {
            waiting: VecDeque::new(),
            rooms: HashMap::new(),
            membership: HashMap::new(),
            next_room: 1,
            game: config.game,
            rng_seed: config.rng_seed,
            command_buffer: config.command_buffer,
            shutdown,
        }
    }

    /// Pair `conn_id` with the oldest waiting connection, or queue it.
    pub fn request_join(&mut self, conn_id: ConnId) -> JoinOutcome {
        if self.membership.contains_key(&conn_id) || self.waiting.contains(&conn_id) {
            return JoinOutcome::AlreadyJoined;
        }

        let Some(left) = self.waiting.pop_front() else {
            self.waiting.push_back(conn_id);
            return JoinOutcome::Queued;
        };
        let right = conn_id;

        let room_number = self.next_room;
        self.next_room += 1;
        let room_id = format!("room_{}", room_number);

        let rng = match self.rng_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed.wrapping_add(room_number)),
            None => ChaCha8Rng::from_entropy(),
        };
        let state = MatchState::new(room_id.clone(), left, right, self.game, rng);

        let (cmd_tx, cmd_rx) = mpsc::channel(self.command_buffer);
        let cancel = self.shutdown.child_token();
        let handle = MatchHandle {
            commands: cmd_tx,
            cancel: cancel.clone(),
        };

        self.rooms.insert(
            room_id.clone(),
            RoomEntry {
                players: [left, right],
                handle,
            },
        );
        self.membership.insert(left, room_id.clone());
        self.membership.insert(right, room_id);

        JoinOutcome::Paired(NewMatch {
            state,
            commands: cmd_rx,
            cancel,
        })
    }

    /// Drop `conn_id` from the queue or from its match. A match it was in is
    /// removed from the registry; its opponent is freed.
    pub fn leave(&mut self, conn_id: ConnId) -> LeaveOutcome {
        if let Some(pos) = self.waiting.iter().position(|&id| id == conn_id) {
            self.waiting.remove(pos);
            return LeaveOutcome::LeftQueue;
        }

        let Some(room_id) = self.membership.get(&conn_id).cloned() else {
            return LeaveOutcome::NotJoined;
        };
        let Some(entry) = self.remove_room(&room_id) else {
            return LeaveOutcome::NotJoined;
        };
        let opponent = if entry.players[0] == conn_id {
            entry.players[1]
        } else {
            entry.players[0]
        };
        LeaveOutcome::LeftMatch {
            room_id,
            opponent,
            handle: entry.handle,
        }
    }

    /// Unregister a match whose loop has finished. Returns false if it was
    /// already gone.
    pub fn finish(&mut self, room_id: &str) -> bool {
        self.remove_room(room_id).is_some()
    }

    fn remove_room(&mut self, room_id: &str) -> Option<RoomEntry> {
        let entry = self.rooms.remove(room_id)?;
        for id in entry.players {
            self.membership.remove(&id);
        }
        Some(entry)
    }

    /// Handle of the match `conn_id` is playing in.
    pub fn match_for(&self, conn_id: ConnId) -> Option<&MatchHandle> {
        let room_id = self.membership.get(&conn_id)?;
        self.rooms.get(room_id).map(|entry| &entry.handle)
    }

    pub fn room_of(&self, conn_id: ConnId) -> Option<&str> {
        self.membership.get(&conn_id).map(String::as_str)
    }

    pub fn waiting(&self) -> impl Iterator<Item = ConnId> + '_ {
        self.waiting.iter().copied()
    }

    pub fn is_waiting(&self, conn_id: ConnId) -> bool {
        self.waiting.contains(&conn_id)
    }

    pub fn active_matches(&self) -> usize {
        self.rooms.len()
    }

    /// Cancel every live match.
    pub fn shutdown(&mut self) {
        self.shutdown.cancel();
        self.rooms.clear();
        self.membership.clear();
        self.waiting.clear();
    }
}

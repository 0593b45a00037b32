use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::config::GameConfig;

/// Protocol version - increment when making breaking changes.
pub const PROTOCOL_VERSION: u32 = 1;

/// Largest inbound frame the server accepts, in bytes.
pub const MAX_MESSAGE_SIZE: usize = 1024;

/// Connection identifier assigned by the server.
pub type ConnId = u32;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message of {len} bytes exceeds limit of {max}")]
    Oversized { len: usize, max: usize },
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    /// Label shown to players when this side wins.
    pub fn winner_label(self) -> &'static str {
        match self {
            Side::Left => "Player 1",
            Side::Right => "Player 2",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

// === Server -> Client ===

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(tag = "type")]
pub enum ServerMsg {
    #[serde(rename = "welcome")]
    Welcome(WelcomeMsg),
    #[serde(rename = "waiting")]
    Waiting,
    #[serde(rename = "game-start")]
    GameStart(GameStartMsg),
    #[serde(rename = "game-update")]
    GameUpdate(GameSnapshot),
    #[serde(rename = "game-end")]
    GameEnd(GameSnapshot),
    #[serde(rename = "player-disconnected")]
    PlayerDisconnected,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(rename_all = "camelCase")]
pub struct WelcomeMsg {
    pub protocol_version: u32,
    pub self_id: ConnId,
    pub config: GameConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(rename_all = "camelCase")]
pub struct GameStartMsg {
    pub game_state: GameSnapshot,
    pub room_id: String,
}

/// Full authoritative state of one match, sent on every update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub players: BTreeMap<ConnId, PlayerWire>,
    pub ball: BallWire,
    pub game_started: bool,
    pub game_ended: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub winner: Option<String>,
    pub room_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct PlayerWire {
    pub id: ConnId,
    pub paddle: PaddleWire,
    pub score: u32,
    pub side: Side,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct PaddleWire {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
pub struct BallWire {
    pub x: f64,
    pub y: f64,
    pub dx: f64,
    pub dy: f64,
    pub radius: f64,
    pub speed: f64,
}

// === Client -> Server ===

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(tag = "type")]
pub enum ClientMsg {
    #[serde(rename = "join-room")]
    JoinRoom,
    #[serde(rename = "paddle-move")]
    PaddleMove { direction: Direction },
}

// === Encode / decode ===

impl GameSnapshot {
    /// Check the structural invariants every snapshot must hold.
    pub fn validate(&self, config: &GameConfig) -> Result<(), ProtocolError> {
        let invalid = |msg: String| Err(ProtocolError::InvalidSnapshot(msg));

        if self.room_id.is_empty() {
            return invalid("empty roomId".to_string());
        }
        if self.players.len() != 2 {
            return invalid(format!("expected 2 players, got {}", self.players.len()));
        }

        let mut sides = Vec::with_capacity(2);
        for (key, player) in &self.players {
            if *key != player.id {
                return invalid(format!("player keyed {} has id {}", key, player.id));
            }
            let y = player.paddle.y;
            if !y.is_finite() || y < 0.0 || y > config.paddle_max_y() {
                return invalid(format!("paddle y {} out of range for player {}", y, key));
            }
            if player.score > config.max_score {
                return invalid(format!("score {} above {}", player.score, config.max_score));
            }
            sides.push(player.side);
        }
        if sides[0] == sides[1] {
            return invalid("both players on the same side".to_string());
        }

        let b = &self.ball;
        if ![b.x, b.y, b.dx, b.dy, b.radius, b.speed]
            .iter()
            .all(|v| v.is_finite())
        {
            return invalid("non-finite ball field".to_string());
        }

        if self.game_ended != self.winner.is_some() {
            return invalid("winner must be set exactly when the game has ended".to_string());
        }
        Ok(())
    }
}

impl ServerMsg {
    fn snapshot(&self) -> Option<&GameSnapshot> {
        match self {
            ServerMsg::GameStart(start) => Some(&start.game_state),
            ServerMsg::GameUpdate(snapshot) | ServerMsg::GameEnd(snapshot) => Some(snapshot),
            _ => None,
        }
    }

    /// Serialize for the wire, refusing to emit an invalid snapshot.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        if let Some(snapshot) = self.snapshot() {
            snapshot.validate(&GameConfig::default())?;
        }
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        let msg: ServerMsg = serde_json::from_str(text)?;
        if let Some(snapshot) = msg.snapshot() {
            snapshot.validate(&GameConfig::default())?;
        }
        Ok(msg)
    }
}

impl ClientMsg {
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode an inbound frame. Oversized frames are rejected before parsing.
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        if text.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::Oversized {
                len: text.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        Ok(serde_json::from_str(text)?)
    }
}

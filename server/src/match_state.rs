use std::collections::BTreeMap;

use pong_shared::config::GameConfig;
use pong_shared::protocol::{ConnId, Direction, GameSnapshot, PlayerWire, Side};
use rand_chacha::ChaCha8Rng;

use crate::physics::{self, Ball, Paddle};

#[derive(Debug, Clone)]
pub struct Player {
    pub id: ConnId,
    pub paddle: Paddle,
    pub score: u32,
    pub side: Side,
}

/// Result of advancing a match by one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing scored.
    Running,
    /// `Side` scored and the ball was re-served.
    Scored(Side),
    /// `Side` reached the winning score on this tick.
    Ended(Side),
    /// The match had already ended; nothing was advanced.
    Halted,
}

/// Authoritative state of one room.
pub struct MatchState {
    pub room_id: String,
    /// Indexed by side: left first, right second.
    pub players: [Player; 2],
    pub ball: Ball,
    pub started: bool,
    pub ended: bool,
    pub winner: Option<String>,
    config: GameConfig,
    rng: ChaCha8Rng,
}

impl MatchState {
    pub fn new(
        room_id: String,
        left: ConnId,
        right: ConnId,
        config: GameConfig,
        rng: ChaCha8Rng,
    ) -> Self {
        let player = |id, side| Player {
            id,
            paddle: Paddle::new(side, &config),
            score: 0,
            side,
        };
        Self {
            room_id,
            players: [player(left, Side::Left), player(right, Side::Right)],
            ball: Ball::kickoff(&config),
            started: true,
            ended: false,
            winner: None,
            config,
            rng,
        }
    }

    pub fn player(&self, side: Side) -> &Player {
        match side {
            Side::Left => &self.players[0],
            Side::Right => &self.players[1],
        }
    }

    fn player_mut(&mut self, side: Side) -> &mut Player {
        match side {
            Side::Left => &mut self.players[0],
            Side::Right => &mut self.players[1],
        }
    }

    pub fn side_of(&self, conn_id: ConnId) -> Option<Side> {
        self.players.iter().find(|p| p.id == conn_id).map(|p| p.side)
    }

    /// Connection on the other side from `conn_id`.
    pub fn opponent_of(&self, conn_id: ConnId) -> Option<ConnId> {
        self.side_of(conn_id)
            .map(|side| self.player(side.opposite()).id)
    }

    pub fn conn_ids(&self) -> [ConnId; 2] {
        [self.players[0].id, self.players[1].id]
    }

    /// Apply a paddle-move from `conn_id`. Returns false if the input was
    /// dropped (unknown connection or finished match).
    pub fn move_paddle(&mut self, conn_id: ConnId, direction: Direction) -> bool {
        if self.ended {
            return false;
        }
        let Some(side) = self.side_of(conn_id) else {
            return false;
        };
        let step = self.config.paddle_speed;
        let field_height = self.config.canvas_height;
        self.player_mut(side)
            .paddle
            .step(direction, step, field_height);
        true
    }

    /// Advance ball, resolve collisions, score and detect the winner.
    pub fn tick(&mut self) -> TickOutcome {
        if self.ended {
            return TickOutcome::Halted;
        }

        self.ball.advance();
        physics::reflect_off_walls(&mut self.ball, self.config.canvas_height);
        for player in &self.players {
            physics::resolve_paddle_collision(&mut self.ball, &player.paddle, player.side);
        }

        let Some(scorer) = physics::check_score(&self.ball, self.config.canvas_width) else {
            return TickOutcome::Running;
        };

        self.player_mut(scorer).score += 1;
        physics::serve(&mut self.ball, &self.config, &mut self.rng);

        if self.player(scorer).score >= self.config.max_score {
            self.ended = true;
            self.winner = Some(scorer.winner_label().to_string());
            return TickOutcome::Ended(scorer);
        }
        TickOutcome::Scored(scorer)
    }

    pub fn snapshot(&self) -> GameSnapshot {
        let players: BTreeMap<ConnId, PlayerWire> = self
            .players
            .iter()
            .map(|p| {
                (
                    p.id,
                    PlayerWire {
                        id: p.id,
                        paddle: p.paddle.to_wire(),
                        score: p.score,
                        side: p.side,
                    },
                )
            })
            .collect();

        GameSnapshot {
            players,
            ball: self.ball.to_wire(),
            game_started: self.started,
            game_ended: self.ended,
            winner: self.winner.clone(),
            room_id: self.room_id.clone(),
        }
    }
}

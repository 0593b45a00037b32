//! Ball and paddle geometry.
//!
//! Everything here is a free function over plain structs; the caller owns
//! the state. Collision tests are instantaneous per tick: a ball moving more
//! than a paddle's width in one tick can pass straight through it.

use pong_shared::config::GameConfig;
use pong_shared::protocol::{BallWire, Direction, PaddleWire, Side};
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Paddle {
    pub x: f64,
    /// Top edge.
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ball {
    pub x: f64,
    pub y: f64,
    pub dx: f64,
    pub dy: f64,
    pub radius: f64,
    /// Nominal speed; `|dx|` after every serve.
    pub speed: f64,
}

impl Paddle {
    /// Paddle for `side`, vertically centred.
    pub fn new(side: Side, config: &GameConfig) -> Self {
        let x = match side {
            Side::Left => config.left_paddle_x(),
            Side::Right => config.right_paddle_x(),
        };
        Self {
            x,
            y: config.canvas_height / 2.0 - config.paddle_height / 2.0,
            width: config.paddle_width,
            height: config.paddle_height,
        }
    }

    /// Move one step in `direction`, clamped to the field.
    pub fn step(&mut self, direction: Direction, step: f64, field_height: f64) {
        let max_y = field_height - self.height;
        self.y = match direction {
            Direction::Up => (self.y - step).max(0.0),
            Direction::Down => (self.y + step).min(max_y),
        };
    }

    pub fn to_wire(&self) -> PaddleWire {
        PaddleWire {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
        }
    }
}

impl Ball {
    /// Kick-off ball: centred, moving diagonally towards the right player.
    pub fn kickoff(config: &GameConfig) -> Self {
        Self {
            x: config.canvas_width / 2.0,
            y: config.canvas_height / 2.0,
            dx: config.ball_speed,
            dy: config.ball_speed,
            radius: config.ball_radius,
            speed: config.ball_speed,
        }
    }

    pub fn advance(&mut self) {
        self.x += self.dx;
        self.y += self.dy;
    }

    pub fn to_wire(&self) -> BallWire {
        BallWire {
            x: self.x,
            y: self.y,
            dx: self.dx,
            dy: self.dy,
            radius: self.radius,
            speed: self.speed,
        }
    }
}

/// Bounce off the top or bottom wall. Returns true if the ball bounced.
pub fn reflect_off_walls(ball: &mut Ball, field_height: f64) -> bool {
    let min_y = ball.radius;
    let max_y = field_height - ball.radius;
    if ball.y <= min_y || ball.y >= max_y {
        ball.dy = -ball.dy;
        ball.y = ball.y.clamp(min_y, max_y);
        true
    } else {
        false
    }
}

/// Bounce off `paddle` if the ball's leading edge overlaps its face.
/// Returns true on contact; the ball is left flush against the paddle.
pub fn resolve_paddle_collision(ball: &mut Ball, paddle: &Paddle, side: Side) -> bool {
    let within_span = ball.y >= paddle.y && ball.y <= paddle.y + paddle.height;
    if !within_span {
        return false;
    }
    match side {
        Side::Left => {
            let edge = ball.x - ball.radius;
            if edge <= paddle.x + paddle.width && edge >= paddle.x {
                ball.dx = ball.dx.abs();
                ball.x = paddle.x + paddle.width + ball.radius;
                return true;
            }
        }
        Side::Right => {
            let edge = ball.x + ball.radius;
            if edge >= paddle.x && edge <= paddle.x + paddle.width {
                ball.dx = -ball.dx.abs();
                ball.x = paddle.x - ball.radius;
                return true;
            }
        }
    }
    false
}

/// Side that scored, if the ball has left the field horizontally.
pub fn check_score(ball: &Ball, field_width: f64) -> Option<Side> {
    if ball.x < 0.0 {
        Some(Side::Right)
    } else if ball.x > field_width {
        Some(Side::Left)
    } else {
        None
    }
}

/// Re-centre the ball with a random horizontal direction and a random
/// vertical component in `[-speed/2, speed/2]`.
pub fn serve(ball: &mut Ball, config: &GameConfig, rng: &mut impl Rng) {
    ball.x = config.canvas_width / 2.0;
    ball.y = config.canvas_height / 2.0;
    ball.dx = if rng.gen_bool(0.5) {
        ball.speed
    } else {
        -ball.speed
    };
    let half = ball.speed / 2.0;
    ball.dy = rng.gen_range(-half..=half);
}

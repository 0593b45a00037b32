/// Field width in world units.
pub const FIELD_WIDTH: f64 = 800.0;
/// Field height in world units.
pub const FIELD_HEIGHT: f64 = 400.0;
pub const PADDLE_WIDTH: f64 = 10.0;
pub const PADDLE_HEIGHT: f64 = 80.0;
/// Distance a paddle travels per `paddle-move` event.
pub const PADDLE_SPEED: f64 = 5.0;
pub const BALL_RADIUS: f64 = 8.0;
/// Nominal ball speed, in units per tick.
pub const BALL_SPEED: f64 = 3.0;
/// Points needed to win a match.
pub const MAX_SCORE: u32 = 5;
/// Simulation tick interval in milliseconds (~60 Hz).
pub const TICK_INTERVAL_MS: u64 = 16;

/// Distance from the left wall to the left paddle's x.
pub const LEFT_PADDLE_X: f64 = 20.0;
/// Distance from the right wall to the right paddle's x.
pub const RIGHT_PADDLE_INSET: f64 = 30.0;

/// Fixed game constants. Sent to clients in the welcome message so that
/// rendering and prediction use the same numbers as the server.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize, ts_rs::TS)]
#[ts(export, export_to = "../../web/src/generated/")]
#[serde(rename_all = "camelCase")]
pub struct GameConfig {
    pub canvas_width: f64,
    pub canvas_height: f64,
    pub paddle_width: f64,
    pub paddle_height: f64,
    pub ball_radius: f64,
    pub ball_speed: f64,
    pub paddle_speed: f64,
    pub max_score: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            canvas_width: FIELD_WIDTH,
            canvas_height: FIELD_HEIGHT,
            paddle_width: PADDLE_WIDTH,
            paddle_height: PADDLE_HEIGHT,
            ball_radius: BALL_RADIUS,
            ball_speed: BALL_SPEED,
            paddle_speed: PADDLE_SPEED,
            max_score: MAX_SCORE,
        }
    }
}

impl GameConfig {
    /// Lowest paddle `y` allowed (paddles are anchored at their top edge).
    pub fn paddle_max_y(&self) -> f64 {
        self.canvas_height - self.paddle_height
    }

    pub fn left_paddle_x(&self) -> f64 {
        LEFT_PADDLE_X
    }

    pub fn right_paddle_x(&self) -> f64 {
        self.canvas_width - RIGHT_PADDLE_INSET
    }

    pub fn validate(&self) -> Result<(), String> {
        let dims = [
            ("canvas_width", self.canvas_width),
            ("canvas_height", self.canvas_height),
            ("paddle_width", self.paddle_width),
            ("paddle_height", self.paddle_height),
            ("ball_radius", self.ball_radius),
            ("ball_speed", self.ball_speed),
            ("paddle_speed", self.paddle_speed),
        ];
        for (name, value) in dims {
            if !value.is_finite() || value <= 0.0 {
                return Err(format!("{} must be finite and > 0", name));
            }
        }
        if self.paddle_height >= self.canvas_height {
            return Err("paddle_height must be < canvas_height".to_string());
        }
        if self.ball_radius * 2.0 >= self.canvas_height {
            return Err("ball must fit between the walls".to_string());
        }
        if self.right_paddle_x() <= self.left_paddle_x() + self.paddle_width {
            return Err("paddles overlap".to_string());
        }
        if self.max_score == 0 {
            return Err("max_score must be > 0".to_string());
        }
        Ok(())
    }
}

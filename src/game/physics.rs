//! Pong physics - paddles, ball, wall/paddle reflection and scoring

use std::f32::consts::FRAC_PI_3;
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Playfield width in world units
pub const FIELD_WIDTH: f32 = 800.0;
/// Playfield height in world units
pub const FIELD_HEIGHT: f32 = 500.0;
/// Gap between a paddle and its goal line
pub const PADDLE_INSET: f32 = 18.0;
pub const PADDLE_WIDTH: f32 = 12.0;
pub const PADDLE_HEIGHT: f32 = 90.0;
pub const BALL_RADIUS: f32 = 8.0;
/// Horizontal serve speed (units per tick)
pub const SERVE_SPEED_X: f32 = 5.0;
/// Vertical serve speed (units per tick)
pub const SERVE_SPEED_Y: f32 = 3.0;
/// Ball speed never exceeds this after a paddle hit
pub const MAX_BALL_SPEED: f32 = 12.0;
/// Speed added on every paddle hit
pub const RALLY_SPEEDUP: f32 = 0.5;
/// Bounce angle when the ball clips the very edge of a paddle
pub const MAX_BOUNCE_ANGLE: f32 = FRAC_PI_3;

/// Which half of the court a player defends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }

    /// Sign of horizontal travel toward this side
    pub fn direction(self) -> f32 {
        match self {
            Self::Left => -1.0,
            Self::Right => 1.0,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => f.write_str("left"),
            Self::Right => f.write_str("right"),
        }
    }
}

/// A paddle. `x` is fixed at creation, `y` only moves during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Paddle {
    pub x: f32,
    pub y: f32,
    #[serde(rename = "w")]
    pub width: f32,
    #[serde(rename = "h")]
    pub height: f32,
    /// Last accepted input velocity (units per tick)
    #[serde(rename = "vy")]
    pub velocity_y: f32,
}

impl Paddle {
    /// Paddle centered vertically on its side of a `field_width` x `field_height` court
    pub fn new(side: Side, field_width: f32, field_height: f32) -> Self {
        let x = match side {
            Side::Left => PADDLE_INSET,
            Side::Right => field_width - PADDLE_INSET - PADDLE_WIDTH,
        };
        Self {
            x,
            y: field_height / 2.0 - PADDLE_HEIGHT / 2.0,
            width: PADDLE_WIDTH,
            height: PADDLE_HEIGHT,
            velocity_y: 0.0,
        }
    }

    pub fn center_y(&self) -> f32 {
        self.y + self.height / 2.0
    }

    /// Clamp `y` into `[0, field_height - height]`
    pub fn clamp_into(&mut self, field_height: f32) {
        self.y = self.y.clamp(0.0, (field_height - self.height).max(0.0));
    }

    /// Move by `ticks` worth of the current velocity, staying on the court
    pub fn advance(&mut self, ticks: f32, field_height: f32) {
        self.y += self.velocity_y * ticks;
        self.clamp_into(field_height);
    }

    /// Strict vertical overlap test against the ball's center
    fn spans(&self, y: f32) -> bool {
        y > self.y && y < self.y + self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ball {
    pub x: f32,
    pub y: f32,
    #[serde(rename = "vx")]
    pub velocity_x: f32,
    #[serde(rename = "vy")]
    pub velocity_y: f32,
    #[serde(rename = "r")]
    pub radius: f32,
}

impl Ball {
    /// Ball at the center of the court heading toward `toward`, vertical sign random
    pub fn serve<R: Rng + ?Sized>(field_width: f32, field_height: f32, toward: Side, rng: &mut R) -> Self {
        let vertical = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
        Self {
            x: field_width / 2.0,
            y: field_height / 2.0,
            velocity_x: SERVE_SPEED_X * toward.direction(),
            velocity_y: SERVE_SPEED_Y * vertical,
            radius: BALL_RADIUS,
        }
    }

    pub fn speed(&self) -> f32 {
        self.velocity_x.hypot(self.velocity_y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Scores {
    pub left: u32,
    pub right: u32,
}

impl Scores {
    pub fn award(&mut self, side: Side) {
        match side {
            Side::Left => self.left += 1,
            Side::Right => self.right += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.left + self.right
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Paddles {
    pub left: Paddle,
    pub right: Paddle,
}

impl Paddles {
    pub fn get(&self, side: Side) -> &Paddle {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    pub fn get_mut(&mut self, side: Side) -> &mut Paddle {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }
}

/// Authoritative physical state of one match
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicsState {
    pub width: f32,
    pub height: f32,
    pub paddles: Paddles,
    pub ball: Ball,
    pub scores: Scores,
}

impl PhysicsState {
    /// Standard court with the opening serve toward a random side
    pub fn new<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::with_field(FIELD_WIDTH, FIELD_HEIGHT, rng)
    }

    pub fn with_field<R: Rng + ?Sized>(width: f32, height: f32, rng: &mut R) -> Self {
        let toward = if rng.gen_bool(0.5) { Side::Left } else { Side::Right };
        Self {
            width,
            height,
            paddles: Paddles {
                left: Paddle::new(Side::Left, width, height),
                right: Paddle::new(Side::Right, width, height),
            },
            ball: Ball::serve(width, height, toward, rng),
            scores: Scores::default(),
        }
    }

    /// Replace a paddle's velocity (last write wins)
    pub fn set_paddle_velocity(&mut self, side: Side, velocity_y: f32) {
        self.paddles.get_mut(side).velocity_y = velocity_y;
    }

    /// One-off forward correction of a paddle by `ticks` of its current velocity
    pub fn nudge_paddle(&mut self, side: Side, ticks: f32) {
        let height = self.height;
        self.paddles.get_mut(side).advance(ticks, height);
    }

    /// Advance the simulation by one tick. Returns the side that scored, if any.
    pub fn step<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<Side> {
        let Self {
            width,
            height,
            paddles,
            ball,
            scores,
        } = self;
        let (width, height) = (*width, *height);

        paddles.left.advance(1.0, height);
        paddles.right.advance(1.0, height);

        ball.x += ball.velocity_x;
        ball.y += ball.velocity_y;

        // Walls
        if ball.y - ball.radius < 0.0 {
            ball.y = ball.radius;
            ball.velocity_y = -ball.velocity_y;
        } else if ball.y + ball.radius > height {
            ball.y = height - ball.radius;
            ball.velocity_y = -ball.velocity_y;
        }

        // Paddles: snap the ball onto the face it crossed so it cannot tunnel through
        let left = &paddles.left;
        if ball.x - ball.radius < left.x + left.width && left.spans(ball.y) {
            ball.x = left.x + left.width + ball.radius;
            reflect_from_paddle(ball, left, Side::Right);
        }
        let right = &paddles.right;
        if ball.x + ball.radius > right.x && right.spans(ball.y) {
            ball.x = right.x - ball.radius;
            reflect_from_paddle(ball, right, Side::Left);
        }

        // Goal lines
        let scorer = if ball.x + ball.radius < 0.0 {
            Some(Side::Right)
        } else if ball.x - ball.radius > width {
            Some(Side::Left)
        } else {
            None
        };

        if let Some(side) = scorer {
            scores.award(side);
            *ball = Ball::serve(width, height, side.opposite(), rng);
        }

        scorer
    }
}

/// Send the ball back off `paddle`, travelling toward `away`.
///
/// The further from the paddle center the ball hits, the steeper the bounce, up to
/// [`MAX_BOUNCE_ANGLE`]. Every hit speeds the ball up by [`RALLY_SPEEDUP`], capped at
/// [`MAX_BALL_SPEED`].
pub fn reflect_from_paddle(ball: &mut Ball, paddle: &Paddle, away: Side) {
    let half_height = paddle.height / 2.0;
    let relative_y = (ball.y - paddle.center_y()) / half_height;
    let bounce_angle = relative_y * MAX_BOUNCE_ANGLE;
    let speed = (ball.speed() + RALLY_SPEEDUP).min(MAX_BALL_SPEED);

    ball.velocity_x = speed * bounce_angle.cos() * away.direction();
    ball.velocity_y = speed * bounce_angle.sin();
}

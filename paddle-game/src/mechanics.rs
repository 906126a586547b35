use std::fmt::{Display, Formatter};

use anyhow::Result;
use rand::prelude::ThreadRng;
use rand::Rng;

use ql::prelude::{Action, ModelActionType, QlError};

// field dimensions match the observation frame, one unit per pixel
pub const FIELD_LEN_X: f32 = 80.0;
pub const FIELD_LEN_Y: f32 = 60.0;

const PADDLE_X_OFFSET: f32 = 4.0;
const PADDLE_LEN_X: f32 = 2.0;
const PADDLE_LEN_Y: f32 = 8.0;
/// paddle units per time-step at full deflection
const PADDLE_SPEED: f32 = 4.0;
/// english applied on a paddle hit, proportional to the hit offset
const PADDLE_VERTICAL_FORCE: f32 = 1.0 / 12.0;

const BALL_EDGE_LEN: f32 = 2.0;
const BALL_START_SPEED: f32 = 2.0;
/// gained on every paddle hit
const BALL_ACCELERATION: f32 = 0.2;
const BALL_MAX_SPEED: f32 = 15.0;

pub const PONG_POINTS_TO_WIN: i32 = 10;
pub const SQUASH_MAX_LOST_BALLS: usize = 5;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Paddle control decision of one player for one time-step
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum PaddleAction {
    Up,
    Stay,
    Down,
}

impl PaddleAction {
    /// Velocity factor {-1, 0, +1} - the paddle moves
    /// `factor * PADDLE_SPEED` units this step
    pub fn velocity_factor(&self) -> f32 {
        match self {
            PaddleAction::Up => -1.0,
            PaddleAction::Stay => 0.0,
            PaddleAction::Down => 1.0,
        }
    }
}

impl Display for PaddleAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PaddleAction::Up => f.write_str("↑"),
            PaddleAction::Stay => f.write_str("o"),
            PaddleAction::Down => f.write_str("↓"),
        }
    }
}

impl Action for PaddleAction {
    const ACTION_SPACE: ModelActionType = 3;

    // model output index = velocity factor + 1
    fn numeric(&self) -> ModelActionType {
        match self {
            PaddleAction::Up => 0,
            PaddleAction::Stay => 1,
            PaddleAction::Down => 2,
        }
    }

    fn try_from_numeric(value: ModelActionType) -> Result<Self> {
        match value {
            0 => Ok(PaddleAction::Up),
            1 => Ok(PaddleAction::Stay),
            2 => Ok(PaddleAction::Down),
            _ => Err(QlError(format!("action value {} out of range", value)))?,
        }
    }

    fn no_action() -> Self { PaddleAction::Stay }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameMode {
    /// two players, goal lines left and right
    Pong,
    /// one player on the left, the right wall plays back
    Squash,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayerSide {
    Left,
    Right,
}

impl PlayerSide {
    /// x direction the ball takes after a hit by this player's paddle
    fn hit_direction(&self) -> f32 {
        match self {
            PlayerSide::Left => 1.0,
            PlayerSide::Right => -1.0,
        }
    }

    fn paddle_center_x(&self) -> f32 {
        match self {
            PlayerSide::Left => PADDLE_X_OFFSET,
            PlayerSide::Right => FIELD_LEN_X - PADDLE_X_OFFSET,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Paddle {
    pub side: PlayerSide,
    pub center_y: f32,
    pub score: i32,
}

impl Paddle {
    fn new(side: PlayerSide) -> Self {
        Self {
            side,
            center_y: FIELD_LEN_Y / 2.0,
            score: 0,
        }
    }

    pub fn center_x(&self) -> f32 { self.side.paddle_center_x() }
    pub fn left(&self) -> f32 { self.center_x() - PADDLE_LEN_X / 2.0 }
    pub fn right(&self) -> f32 { self.center_x() + PADDLE_LEN_X / 2.0 }
    pub fn top(&self) -> f32 { self.center_y - PADDLE_LEN_Y / 2.0 }
    pub fn bottom(&self) -> f32 { self.center_y + PADDLE_LEN_Y / 2.0 }

    /// move one time-step and stay inside the field
    fn proceed(&mut self, action: PaddleAction) {
        self.center_y += action.velocity_factor() * PADDLE_SPEED;
        self.center_y = self.center_y.clamp(PADDLE_LEN_Y / 2.0, FIELD_LEN_Y - PADDLE_LEN_Y / 2.0);
    }
}

#[derive(Clone, Debug)]
pub struct Ball {
    pub center: Vec2,
    pub velocity: Vec2,
}

impl Ball {
    pub fn left(&self) -> f32 { self.center.x - BALL_EDGE_LEN / 2.0 }
    pub fn right(&self) -> f32 { self.center.x + BALL_EDGE_LEN / 2.0 }
    pub fn top(&self) -> f32 { self.center.y - BALL_EDGE_LEN / 2.0 }
    pub fn bottom(&self) -> f32 { self.center.y + BALL_EDGE_LEN / 2.0 }

    fn overlaps(&self, paddle: &Paddle) -> bool {
        self.left() < paddle.right()
            && self.right() > paddle.left()
            && self.top() < paddle.bottom()
            && self.bottom() > paddle.top()
    }
}

// x = 0 = left side; y = 0 = top
#[derive(Clone, Debug)]
pub struct GameState {
    pub mode: GameMode,
    pub paddles: Vec<Paddle>,
    pub ball: Ball,
    /// balls gone past the paddle (squash scoring)
    pub lost_balls: usize,
    pub paddle_bounces: usize,
    pub finished: bool,
}

impl GameState {
    fn initial(mode: GameMode) -> Self {
        let paddles = match mode {
            GameMode::Pong => vec![Paddle::new(PlayerSide::Left), Paddle::new(PlayerSide::Right)],
            GameMode::Squash => vec![Paddle::new(PlayerSide::Left)],
        };
        Self {
            mode,
            paddles,
            ball: Ball {
                center: Vec2::new(FIELD_LEN_X / 2.0, FIELD_LEN_Y / 2.0),
                velocity: Vec2::new(0.0, 0.0),
            },
            lost_balls: 0,
            paddle_bounces: 0,
            finished: false,
        }
    }
}

/// What happened during one time-step - the material the reward signals
/// are derived from
#[derive(Clone, Copy, Debug, Default)]
pub struct StepEvents {
    pub paddle_hits: [bool; 2],
    /// goal line the ball fully crossed (= the side which conceded)
    pub ball_out: Option<PlayerSide>,
}

pub struct PaddleGameMechanics {
    state: GameState,
    rng: ThreadRng,
}

impl PaddleGameMechanics {
    pub fn new(mode: GameMode) -> Self {
        let mut mechanics = Self {
            state: GameState::initial(mode),
            rng: rand::thread_rng(),
        };
        let direction = if mechanics.rng.gen_bool(0.5) { 1.0 } else { -1.0 };
        mechanics.serve(direction);
        mechanics
    }

    pub fn from_state(state: GameState) -> Self {
        Self {
            state,
            rng: rand::thread_rng(),
        }
    }

    pub fn state(&self) -> &GameState { &self.state }

    pub fn reset(&mut self) {
        let mode = self.state.mode;
        self.state = GameState::initial(mode);
        let direction = if self.rng.gen_bool(0.5) { 1.0 } else { -1.0 };
        self.serve(direction);
    }

    /// Performs one time/action-step: applies the given paddle actions and
    /// moves the ball, reporting paddle hits and goals.
    ///
    /// Once the game is finished the scene freezes apart from the paddles
    /// (the settle period before the episode reset).
    pub fn time_step(&mut self, actions: &[PaddleAction]) -> StepEvents {
        assert_eq!(actions.len(), self.state.paddles.len());

        let mut events = StepEvents::default();

        for (paddle, &action) in self.state.paddles.iter_mut().zip(actions) {
            paddle.proceed(action);
        }

        if self.state.finished {
            return events;
        }

        let ball = &mut self.state.ball;
        ball.center.x += ball.velocity.x;
        ball.center.y += ball.velocity.y;

        // bouncing off the edges
        if ball.bottom() > FIELD_LEN_Y {
            ball.center.y = FIELD_LEN_Y - BALL_EDGE_LEN / 2.0;
            ball.velocity.y = -ball.velocity.y.abs();
        } else if ball.top() < 0.0 {
            ball.center.y = BALL_EDGE_LEN / 2.0;
            ball.velocity.y = ball.velocity.y.abs();
        }
        if self.state.mode == GameMode::Squash && ball.right() > FIELD_LEN_X {
            ball.center.x = FIELD_LEN_X - BALL_EDGE_LEN / 2.0;
            ball.velocity.x = -ball.velocity.x.abs();
        }

        for i in 0..self.state.paddles.len() {
            if self.state.ball.overlaps(&self.state.paddles[i]) {
                self.bounce_off_paddle(i);
                events.paddle_hits[i] = true;
            }
        }

        if self.state.ball.right() < 0.0 {
            events.ball_out = Some(PlayerSide::Left);
        } else if self.state.mode == GameMode::Pong && self.state.ball.left() > FIELD_LEN_X {
            events.ball_out = Some(PlayerSide::Right);
        }

        if let Some(conceded_side) = events.ball_out {
            self.goal(conceded_side);
        }

        events
    }

    fn bounce_off_paddle(&mut self, paddle_idx: usize) {
        let paddle = &mut self.state.paddles[paddle_idx];
        let ball = &mut self.state.ball;

        // place the ball just in front of the paddle face
        match paddle.side {
            PlayerSide::Left => ball.center.x = paddle.right() + 1.0 + BALL_EDGE_LEN / 2.0,
            PlayerSide::Right => ball.center.x = paddle.left() - 1.0 - BALL_EDGE_LEN / 2.0,
        }

        ball.velocity.x = f32::min(ball.velocity.x.abs() + BALL_ACCELERATION, BALL_MAX_SPEED) * paddle.side.hit_direction();
        ball.velocity.y += (ball.center.y - paddle.center_y) * PADDLE_VERTICAL_FORCE;

        self.state.paddle_bounces += 1;
        if self.state.mode == GameMode::Squash {
            paddle.score += 5;
        }
    }

    fn goal(&mut self, conceded_side: PlayerSide) {
        match self.state.mode {
            GameMode::Pong => {
                for paddle in &mut self.state.paddles {
                    if paddle.side != conceded_side {
                        paddle.score += 1;
                    }
                }
            }
            GameMode::Squash => {
                self.state.paddles[0].score -= 1;
                self.state.lost_balls += 1;
            }
        }

        if self.game_over() {
            self.state.finished = true;
            self.state.ball.velocity = Vec2::new(0.0, 0.0);
        } else {
            let direction = match conceded_side {
                PlayerSide::Left => -1.0,
                PlayerSide::Right => 1.0,
            };
            self.serve(direction);
        }
    }

    fn game_over(&self) -> bool {
        match self.state.mode {
            GameMode::Pong => self.state.paddles.iter().any(|p| p.score >= PONG_POINTS_TO_WIN),
            GameMode::Squash => self.state.lost_balls >= SQUASH_MAX_LOST_BALLS,
        }
    }

    fn serve(&mut self, direction: f32) {
        self.state.ball.center = Vec2::new(FIELD_LEN_X / 2.0, FIELD_LEN_Y / 2.0);
        self.state.ball.velocity = Vec2::new(BALL_START_SPEED * direction, 0.0);
    }
}

use console_engine::pixel;
use console_engine::screen::Screen;

use ql::frame_store::Frame;
use ql::prelude::DebugVisualizer;

use crate::mechanics::GameState;

// one pixel per field unit (FIELD_LEN_X x FIELD_LEN_Y)
pub const FRAME_SIZE_X: usize = 80;
pub const FRAME_SIZE_Y: usize = 60;

/// Rasterizes a [GameState] into the model's visual observation: one
/// grayscale frame of `FRAME_SIZE_X` x `FRAME_SIZE_Y` pixels, white
/// paddles and ball on a black background, intensities in `0.0..=1.0`,
/// flattened row by row.
pub struct FrameDrawer;

impl FrameDrawer {
    pub fn new() -> Self { FrameDrawer }

    pub fn draw(&self, state: &GameState) -> Frame {
        let mut pixels = vec![0.0_f32; FRAME_SIZE_X * FRAME_SIZE_Y];

        for paddle in &state.paddles {
            fill_rect(&mut pixels, paddle.left(), paddle.top(), paddle.right(), paddle.bottom());
        }
        let ball = &state.ball;
        fill_rect(&mut pixels, ball.left(), ball.top(), ball.right(), ball.bottom());

        Frame::new(pixels)
    }
}

impl Default for FrameDrawer {
    fn default() -> Self { Self::new() }
}

fn fill_rect(pixels: &mut [f32], min_x: f32, min_y: f32, max_x: f32, max_y: f32) {
    let x0 = min_x.floor().max(0.0) as usize;
    let y0 = min_y.floor().max(0.0) as usize;
    let x1 = (max_x.ceil().max(0.0) as usize).min(FRAME_SIZE_X);
    let y1 = (max_y.ceil().max(0.0) as usize).min(FRAME_SIZE_Y);

    for y in y0..y1 {
        for x in x0..x1 {
            pixels[y * FRAME_SIZE_X + x] = 1.0;
        }
    }
}

impl DebugVisualizer for GameState {
    fn one_line_info(&self) -> String {
        let scores = self
            .paddles
            .iter()
            .map(|p| p.score.to_string())
            .collect::<Vec<_>>()
            .join(":");
        format!(
            "ball: ({:.1},{:.1}) v=({:.1},{:.1}) | score {} | bounces: {}{}",
            self.ball.center.x,
            self.ball.center.y,
            self.ball.velocity.x,
            self.ball.velocity.y,
            scores,
            self.paddle_bounces,
            if self.finished { " | game over" } else { "" }
        )
    }

    fn render_to_console(&self) -> Screen {
        let mut screen = Screen::new_fill(FRAME_SIZE_X as u32, FRAME_SIZE_Y as u32, pixel::pxl(' '));
        for paddle in &self.paddles {
            for y in paddle.top() as i32..paddle.bottom() as i32 {
                screen.set_pxl(paddle.center_x() as i32, y, pixel::pxl('█'));
            }
        }
        screen.set_pxl(self.ball.center.x as i32, self.ball.center.y as i32, pixel::pxl('●'));
        screen
    }
}

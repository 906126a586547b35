use lazy_static::lazy_static;

use paddle_game::drawer::{FRAME_SIZE_X, FRAME_SIZE_Y};
use ql::model::mlp::Architecture;

#[ctor::ctor]
fn init() {
    use log::LevelFilter;
    env_logger::builder()
        .format_timestamp_secs()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init()
}

pub const TEST_BATCH_SIZE: usize = 4;

#[rustfmt::skip]
lazy_static! {
    /// Deliberately tiny network - the integration tests exercise the
    /// training loop, not the learning quality
    pub static ref TEST_ARCHITECTURE: Architecture = Architecture {
        input_dim: FRAME_SIZE_X * FRAME_SIZE_Y,
        hidden_size: 8,
        hidden_layers: 2,
        num_actions: 3,
        learning_rate: 0.05,
    };
}

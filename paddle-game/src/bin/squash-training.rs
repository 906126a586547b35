use std::path::Path;

use anyhow::Result;
use num_format::ToFormattedString;

use paddle_game::drawer::{FRAME_SIZE_X, FRAME_SIZE_Y};
use paddle_game::mechanics::{GameMode, PaddleAction};
use paddle_game::session::{SessionParameter, TrainingSession};
use ql::learn::realtime_q_learner::LearnerParameter;
use ql::model::mlp::{Architecture, MlpModel};
use ql::prelude::Action;
use ql::util::format;
use ql::util::log::init_logging;

const WEIGHTS_FILE: &str = "squash_model_weights.bin";
const ARCHITECTURE_FILE: &str = "squash_model_architecture.json";
const EPOCHS: usize = 100;

fn main() -> Result<()> {
    init_logging();

    let mut model = MlpModel::new(Architecture {
        input_dim: FRAME_SIZE_X * FRAME_SIZE_Y,
        hidden_size: 500,
        hidden_layers: 2,
        num_actions: PaddleAction::ACTION_SPACE as usize,
        learning_rate: 0.2,
    });

    let weights_file = Path::new(WEIGHTS_FILE);
    if weights_file.exists() {
        match model.read_weights(weights_file) {
            Ok(()) => log::info!("continuing training with weights from '{}'", weights_file.display()),
            Err(e) => log::warn!("ignoring weight file '{}' ({:#}) - starting with fresh weights", weights_file.display(), e),
        }
    }

    let param = SessionParameter {
        learner: LearnerParameter {
            gamma: 0.9,
            epsilon: 0.2,
            batch_size: 20,
            replay_buffer_len: 100,
        },
        max_memory_frames: 30,
        ..SessionParameter::default()
    };
    let mut session = TrainingSession::new(GameMode::Squash, model, param);

    let number_format = format::number_format();
    let mut total_steps = 0_usize;
    let mut total_score = 0_i64;
    for epoch in 0..EPOCHS {
        let summary = session.run_episode()?;
        total_steps += summary.steps;
        total_score += summary.scores[0] as i64;
        log::info!(
            "epoch {:3}/{} | score {:4}, loss {:9.4} | mean score {:6.1} | total steps: {}",
            epoch,
            EPOCHS - 1,
            summary.scores[0],
            summary.losses[0],
            total_score as f64 / (epoch + 1) as f64,
            total_steps.to_formatted_string(&number_format)
        );
    }

    let model = session.into_model();
    model.write_weights(weights_file)?;
    model.write_architecture(Path::new(ARCHITECTURE_FILE))?;
    log::info!("saved model weights to '{}', architecture to '{}'", WEIGHTS_FILE, ARCHITECTURE_FILE);

    Ok(())
}

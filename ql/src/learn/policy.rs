use anyhow::Result;
use rand::prelude::ThreadRng;
use rand::Rng;

use crate::frame_store::SharedFrameStore;
use crate::model::QFunction;
use crate::prelude::{Action, ModelActionType};

/// Epsilon-greedy action selection.
///
/// Stateless apart from the exploration rate: every decision is a pure
/// function of the frame store, the model and one random draw.
pub struct EpsilonGreedy {
    /// Exploration rate 𝜀; probability of picking a uniformly random action
    epsilon: f64,
}

impl EpsilonGreedy {
    pub fn new(epsilon: f64) -> Self {
        assert!((0.0..=1.0).contains(&epsilon));
        Self { epsilon }
    }

    pub fn epsilon(&self) -> f64 { self.epsilon }

    /// Picks the next action.
    ///
    /// Before two frames have ever been observed there is no previous frame
    /// to learn from, so the neutral action is returned unconditionally.
    /// Otherwise: with probability 𝜀 a random action, else the action with
    /// the highest predicted value for the latest frame.
    pub fn decide_action<A: Action, M: QFunction>(
        &self,
        frames: &SharedFrameStore,
        model: &M,
        rng: &mut ThreadRng,
    ) -> Result<A> {
        if frames.current_index() < 2 {
            return Ok(A::no_action());
        }

        if rng.gen::<f64>() <= self.epsilon {
            let value = rng.gen_range(0..A::ACTION_SPACE);
            return A::try_from_numeric(value);
        }

        let latest_frame = frames.get(frames.current_index() - 1);
        let q_values = model.predict(&latest_frame);
        let best = q_values
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(index, _)| index)
            .expect("model predicts at least one action value");
        A::try_from_numeric(best as ModelActionType)
    }
}

use anyhow::Result;
use itertools::Itertools;
use rand::prelude::ThreadRng;
use rustc_hash::FxHashMap;

use crate::frame_store::SharedFrameStore;
use crate::learn::policy::EpsilonGreedy;
use crate::learn::replay_buffer::ReplayBuffer;
use crate::model::QFunction;
use crate::prelude::Action;

#[derive(Clone, Copy, Debug)]
pub struct LearnerParameter {
    /// Discount rate; (0 <= 𝛾 <= 1) represents the value of future rewards. The bigger, the more farsighted the agent becomes
    pub gamma: f32,
    /// Epsilon greedy parameter (fixed for a run)
    pub epsilon: f64,
    /// Transitions per training call
    pub batch_size: usize,
    /// Maximum replay length
    pub replay_buffer_len: usize,
}

impl Default for LearnerParameter {
    fn default() -> Self {
        Self {
            gamma: 0.9,
            epsilon: 0.2,
            batch_size: 20,
            replay_buffer_len: 100,
        }
    }
}

/// One agent learning live inside a running game.
///
/// Every simulation step the agent picks an action for the freshly
/// observed frame and immediately trains the model on one replayed
/// minibatch. All per-episode state lives in this instance and is
/// re-initialized through [Self::reset_episode]; the shared frame store is
/// deliberately left untouched across episodes.
pub struct RealtimeQLearner<A: Action> {
    frames: SharedFrameStore,
    param: LearnerParameter,
    policy: EpsilonGreedy,
    replay_buffer: ReplayBuffer<A>,
    rng: ThreadRng,
    episode_loss: f32,
    action_counts: FxHashMap<A, usize>,
}

impl<A: Action> RealtimeQLearner<A> {
    pub fn new(frames: SharedFrameStore, param: LearnerParameter) -> Self {
        let replay_buffer = ReplayBuffer::new(param.replay_buffer_len, param.gamma, frames.clone());
        Self {
            frames,
            param,
            policy: EpsilonGreedy::new(param.epsilon),
            replay_buffer,
            rng: rand::thread_rng(),
            episode_loss: 0.0,
            action_counts: FxHashMap::default(),
        }
    }

    /// True once enough frames were ever observed to form a
    /// (previous, current) state pair.
    pub fn history_ready(&self) -> bool {
        self.frames.current_index() >= 2
    }

    /// Epsilon-greedy decision for the latest observed frame.
    pub fn decide_action<M: QFunction>(&mut self, model: &M) -> Result<A> {
        let action = self.policy.decide_action(&self.frames, model, &mut self.rng)?;
        *self.action_counts.entry(action).or_insert(0) += 1;
        Ok(action)
    }

    /// Records the step's experience and trains the model on one sampled
    /// minibatch.
    ///
    /// The transition references the frames before and after this step's
    /// observation: `next = current_index() - 1` (the frame appended this
    /// step, ahead of any decision), `prev = next - 1`. Without two frames
    /// of history there is nothing to record yet and the call is a no-op.
    pub fn learn_step<M: QFunction>(
        &mut self,
        model: &mut M,
        action: A,
        reward: f32,
        terminal: bool,
    ) -> Result<()> {
        if !self.history_ready() {
            return Ok(());
        }

        let next_state_index = self.frames.current_index() - 1;
        let state_index = next_state_index - 1;
        self.replay_buffer.remember(state_index, action, reward, next_state_index, terminal);

        let (inputs, targets) = self.replay_buffer.sample_batch(model, self.param.batch_size, &mut self.rng);
        self.episode_loss += model.train_on_batch(&inputs, &targets);
        Ok(())
    }

    /// Loss accumulated over the current episode.
    pub fn episode_loss(&self) -> f32 {
        self.episode_loss
    }

    pub fn replay_buffer_len(&self) -> usize {
        self.replay_buffer.len()
    }

    /// Drops all experience and counters of the finished episode.
    /// The shared frame store keeps its content (and its index space).
    pub fn reset_episode(&mut self) {
        self.replay_buffer = ReplayBuffer::new(self.param.replay_buffer_len, self.param.gamma, self.frames.clone());
        self.episode_loss = 0.0;
        self.action_counts.clear();
    }

    /// E.g. "← 20.3%, o 61.0%, → 18.7%"
    pub fn action_distribution_line(&self) -> String {
        let total: usize = self.action_counts.values().sum();
        if total == 0 {
            return "-".to_string();
        }
        self.action_counts
            .iter()
            .sorted_by_key(|(action, _)| action.numeric())
            .map(|(action, &count)| {
                let ratio = 100.0 * count as f32 / total as f32;
                format!("{} {:.1}%", action, ratio)
            })
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use std::fmt::{Display, Formatter};

    use ndarray::{Array1, Array2};

    use crate::frame_store::Frame;
    use crate::prelude::{ModelActionType, QlError};

    use super::*;

    #[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
    enum TestAction {
        Down,
        Hold,
        Up,
    }

    impl Display for TestAction {
        fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    impl Action for TestAction {
        const ACTION_SPACE: ModelActionType = 3;

        fn numeric(&self) -> ModelActionType {
            match self {
                TestAction::Down => 0,
                TestAction::Hold => 1,
                TestAction::Up => 2,
            }
        }

        fn try_from_numeric(value: ModelActionType) -> Result<Self> {
            match value {
                0 => Ok(TestAction::Down),
                1 => Ok(TestAction::Hold),
                2 => Ok(TestAction::Up),
                _ => Err(QlError::from("action value out of range"))?,
            }
        }

        fn no_action() -> Self { TestAction::Hold }
    }

    struct CountingModel {
        train_calls: usize,
        last_batch_rows: usize,
    }

    impl CountingModel {
        fn new() -> Self {
            Self { train_calls: 0, last_batch_rows: 0 }
        }
    }

    impl QFunction for CountingModel {
        fn num_actions(&self) -> usize { 3 }

        fn predict(&self, _state: &Frame) -> Array1<f32> {
            Array1::zeros(3)
        }

        fn train_on_batch(&mut self, inputs: &Array2<f32>, _targets: &Array2<f32>) -> f32 {
            self.train_calls += 1;
            self.last_batch_rows = inputs.nrows();
            0.25
        }
    }

    fn learner_with_history(history_frames: usize) -> (RealtimeQLearner<TestAction>, SharedFrameStore) {
        let frames = SharedFrameStore::new(30);
        for i in 0..history_frames {
            frames.append(Frame::new(vec![i as f32 * 0.1; 4]));
        }
        let learner = RealtimeQLearner::new(frames.clone(), LearnerParameter::default());
        (learner, frames)
    }

    #[test]
    fn learn_step_without_history_is_a_no_op() {
        let (mut learner, _frames) = learner_with_history(1);
        let mut model = CountingModel::new();

        learner.learn_step(&mut model, TestAction::Hold, 0.0, false).unwrap();

        assert_eq!(model.train_calls, 0);
        assert_eq!(learner.replay_buffer_len(), 0);
    }

    #[test]
    fn learn_step_records_one_transition_and_trains_once() {
        let (mut learner, _frames) = learner_with_history(2);
        let mut model = CountingModel::new();

        learner.learn_step(&mut model, TestAction::Up, 1.0, false).unwrap();

        assert_eq!(learner.replay_buffer_len(), 1);
        assert_eq!(model.train_calls, 1);
        assert_eq!(model.last_batch_rows, 1);
        assert_eq!(learner.episode_loss(), 0.25);
    }

    #[test]
    fn episode_loss_accumulates_over_steps() {
        let (mut learner, frames) = learner_with_history(2);
        let mut model = CountingModel::new();

        for step in 0..4 {
            learner.learn_step(&mut model, TestAction::Hold, 0.0, false).unwrap();
            frames.append(Frame::new(vec![step as f32; 4]));
        }

        assert_eq!(model.train_calls, 4);
        assert_eq!(learner.episode_loss(), 4.0 * 0.25);
    }

    #[test]
    fn episode_reset_drops_experience_but_not_the_frame_store() {
        let (mut learner, frames) = learner_with_history(2);
        let mut model = CountingModel::new();
        learner.learn_step(&mut model, TestAction::Up, 1.0, false).unwrap();

        let frames_before_reset = frames.current_index();
        learner.reset_episode();

        assert_eq!(learner.replay_buffer_len(), 0);
        assert_eq!(learner.episode_loss(), 0.0);
        assert_eq!(frames.current_index(), frames_before_reset);
    }

    #[test]
    fn action_distribution_line_reports_decided_actions() {
        let (mut learner, _frames) = learner_with_history(2);
        let model = CountingModel::new();

        for _ in 0..4 {
            learner.decide_action(&model).unwrap();
        }

        let line = learner.action_distribution_line();
        assert!(line.contains('%'));
    }
}

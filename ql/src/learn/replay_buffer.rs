use std::collections::VecDeque;

use ndarray::{Array2, ArrayView1};
use rand::prelude::ThreadRng;
use rand::Rng;

use crate::frame_store::SharedFrameStore;
use crate::model::QFunction;
use crate::prelude::Action;

/// One recorded experience. Frames are referenced by their global index in
/// the shared [FrameStore](crate::frame_store::FrameStore) - never copied.
///
/// A transition stays resolvable only as long as both referenced frames are
/// retained; once the frame store has moved on, lookups clamp to the oldest
/// retained frame. Keep the frame store at least as large as the replay
/// buffer if that matters.
#[derive(Clone, Copy, Debug)]
pub struct Transition<A: Action> {
    pub state_index: usize,
    pub action: A,
    pub reward: f32,
    pub next_state_index: usize,
    pub terminal: bool,
}

/// Bounded FIFO buffer of [Transition]s with uniform minibatch sampling and
/// one-step Q-learning target construction.
pub struct ReplayBuffer<A: Action> {
    max_transitions: usize,
    /// Discount rate; (0 <= 𝛾 <= 1) represents the value of future rewards
    discount: f32,
    frames: SharedFrameStore,
    buffer: VecDeque<Transition<A>>,
}

impl<A: Action> ReplayBuffer<A> {
    pub fn new(max_transitions: usize, discount: f32, frames: SharedFrameStore) -> Self {
        assert!(max_transitions > 0);
        assert!((0.0..=1.0).contains(&discount));
        Self {
            max_transitions,
            discount,
            frames,
            buffer: VecDeque::with_capacity(max_transitions),
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn discount(&self) -> f32 {
        self.discount
    }

    /// Records one transition; evicts the oldest one beyond capacity.
    pub fn remember(&mut self, state_index: usize, action: A, reward: f32, next_state_index: usize, terminal: bool) {
        if (self.buffer.len() + 1) > self.max_transitions {
            self.buffer.pop_front();
        }
        self.buffer.push_back(Transition {
            state_index,
            action,
            reward,
            next_state_index,
            terminal,
        });
    }

    /// Draws `min(batch_size, len)` transitions uniformly at random - with
    /// replacement - and builds one training batch:
    ///
    /// Each target row starts as the model's current prediction for the
    /// transition's state, then only the taken action's column is replaced
    /// by the one-step target: the plain reward for terminal transitions,
    /// `reward + 𝛾 * max Q(next_state)` otherwise. The very same (live)
    /// model provides both the prediction copy and the bootstrap value -
    /// there is no frozen target network in this design.
    ///
    /// Calling this on an empty buffer is a caller error (there is no
    /// transition to even infer the input width from).
    ///
    /// # Returns
    ///   (inputs [rows, frame_len], targets [rows, num_actions])
    pub fn sample_batch<M: QFunction>(
        &self,
        model: &M,
        batch_size: usize,
        rng: &mut ThreadRng,
    ) -> (Array2<f32>, Array2<f32>) {
        assert!(!self.buffer.is_empty(), "sample_batch called on an empty replay buffer");
        assert!(batch_size > 0);

        let rows = usize::min(batch_size, self.buffer.len());
        let samples: Vec<Transition<A>> = (0..rows)
            .map(|_| self.buffer[rng.gen_range(0..self.buffer.len())])
            .collect();

        let frame_len = self.frames.get(samples[0].state_index).len();
        let mut inputs = Array2::zeros((rows, frame_len));
        let mut targets = Array2::zeros((rows, model.num_actions()));

        for (i, transition) in samples.iter().enumerate() {
            let state = self.frames.get(transition.state_index);
            let mut target_row = model.predict(&state);

            let q = if transition.terminal {
                transition.reward
            } else {
                let next_state = self.frames.get(transition.next_state_index);
                let max_next_q = model
                    .predict(&next_state)
                    .iter()
                    .copied()
                    .fold(f32::NEG_INFINITY, f32::max);
                transition.reward + self.discount * max_next_q
            };
            target_row[transition.action.numeric() as usize] = q;

            inputs.row_mut(i).assign(&ArrayView1::from(state.values()));
            targets.row_mut(i).assign(&target_row);
        }

        (inputs, targets)
    }

    #[cfg(test)]
    pub(crate) fn transitions(&self) -> impl Iterator<Item = &Transition<A>> {
        self.buffer.iter()
    }
}

#[cfg(test)]
mod tests {
    use std::fmt::{Display, Formatter};

    use anyhow::Result;
    use ndarray::Array1;

    use crate::frame_store::Frame;
    use crate::prelude::ModelActionType;

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
                _ => Err(crate::prelude::QlError::from("action value out of range"))?,
            }
        }

        fn no_action() -> Self { TestAction::Hold }
    }

    /// Predicts one fixed row for frames filled with 0.0 and another for
    /// everything else.
    struct StubModel {
        q_for_zero_frame: Vec<f32>,
        q_otherwise: Vec<f32>,
    }

    impl QFunction for StubModel {
        fn num_actions(&self) -> usize { 3 }

        fn predict(&self, state: &Frame) -> Array1<f32> {
            if state.values()[0] == 0.0 {
                Array1::from(self.q_for_zero_frame.clone())
            } else {
                Array1::from(self.q_otherwise.clone())
            }
        }

        fn train_on_batch(&mut self, _inputs: &Array2<f32>, _targets: &Array2<f32>) -> f32 {
            0.0
        }
    }

    fn store_with_two_frames() -> SharedFrameStore {
        let frames = SharedFrameStore::new(10);
        frames.append(Frame::new(vec![0.0; 4]));
        frames.append(Frame::new(vec![1.0; 4]));
        frames
    }

    #[test]
    fn overflow_evicts_the_first_inserted_transition() {
        let frames = store_with_two_frames();
        let mut buffer = ReplayBuffer::new(3, 0.9, frames);

        for reward in 0..4 {
            buffer.remember(0, TestAction::Hold, reward as f32, 1, false);
        }

        assert_eq!(buffer.len(), 3);
        let rewards: Vec<f32> = buffer.transitions().map(|t| t.reward).collect();
        assert_eq!(rewards, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn non_terminal_target_bootstraps_from_the_next_state() {
        // reward 1, 𝛾 = 0.9, max next-state prediction 2.0 => target 2.8
        let frames = store_with_two_frames();
        let mut buffer = ReplayBuffer::new(10, 0.9, frames);
        buffer.remember(0, TestAction::Up, 1.0, 1, false);

        let model = StubModel {
            q_for_zero_frame: vec![0.1, 0.2, 0.3],
            q_otherwise: vec![2.0, 0.5, 1.5],
        };
        let mut rng = rand::thread_rng();
        let (inputs, targets) = buffer.sample_batch(&model, 1, &mut rng);

        assert_eq!(inputs.nrows(), 1);
        assert_eq!(inputs.row(0).to_vec(), vec![0.0; 4]);
        // untouched columns keep the current prediction
        assert_eq!(targets.row(0).to_vec(), vec![0.1, 0.2, 1.0 + 0.9 * 2.0]);
    }

    #[test]
    fn terminal_target_is_the_plain_reward() {
        // reward -1, terminal => target -1, discount and next state ignored
        let frames = store_with_two_frames();
        let mut buffer = ReplayBuffer::new(10, 0.9, frames);
        buffer.remember(0, TestAction::Down, -1.0, 1, true);

        let model = StubModel {
            q_for_zero_frame: vec![0.1, 0.2, 0.3],
            q_otherwise: vec![100.0, 100.0, 100.0],
        };
        let mut rng = rand::thread_rng();
        let (_, targets) = buffer.sample_batch(&model, 1, &mut rng);

        assert_eq!(targets.row(0).to_vec(), vec![-1.0, 0.2, 0.3]);
    }

    #[test]
    fn batch_shrinks_to_the_available_transition_count() {
        let frames = store_with_two_frames();
        let mut buffer = ReplayBuffer::new(10, 0.9, frames);
        buffer.remember(0, TestAction::Hold, 0.0, 1, false);
        buffer.remember(0, TestAction::Up, 0.5, 1, false);

        let model = StubModel {
            q_for_zero_frame: vec![0.0, 0.0, 0.0],
            q_otherwise: vec![0.0, 0.0, 0.0],
        };
        let mut rng = rand::thread_rng();
        let (inputs, targets) = buffer.sample_batch(&model, 5, &mut rng);

        assert_eq!(inputs.nrows(), 2);
        assert_eq!(targets.nrows(), 2);
        assert_eq!(targets.ncols(), 3);
    }

    #[test]
    #[should_panic(expected = "empty replay buffer")]
    fn sampling_an_empty_buffer_is_a_caller_error() {
        let frames = store_with_two_frames();
        let buffer: ReplayBuffer<TestAction> = ReplayBuffer::new(10, 0.9, frames);

        let model = StubModel {
            q_for_zero_frame: vec![0.0, 0.0, 0.0],
            q_otherwise: vec![0.0, 0.0, 0.0],
        };
        let mut rng = rand::thread_rng();
        buffer.sample_batch(&model, 1, &mut rng);
    }

    #[test]
    fn transitions_referencing_evicted_frames_resolve_to_the_oldest_retained() {
        // frame store smaller than the replay buffer: old transitions
        // silently resolve to the clamped frame - recorded behavior
        let frames = SharedFrameStore::new(2);
        let mut buffer = ReplayBuffer::new(10, 0.9, frames.clone());

        frames.append(Frame::new(vec![0.0; 4]));
        frames.append(Frame::new(vec![1.0; 4]));
        buffer.remember(0, TestAction::Hold, 0.0, 1, false);
        frames.append(Frame::new(vec![2.0; 4]));
        frames.append(Frame::new(vec![3.0; 4]));

        let model = StubModel {
            q_for_zero_frame: vec![0.0, 0.0, 0.0],
            q_otherwise: vec![0.0, 0.0, 0.0],
        };
        let mut rng = rand::thread_rng();
        let (inputs, _) = buffer.sample_batch(&model, 1, &mut rng);

        // indices 0 and 1 both fell out of the retention window; the row
        // carries the oldest retained frame instead
        assert_eq!(inputs.row(0).to_vec(), vec![2.0; 4]);
    }
}

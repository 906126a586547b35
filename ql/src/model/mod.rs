use ndarray::{Array1, Array2};

use crate::frame_store::Frame;

pub mod mlp;

/// 'Physical' AI model abstraction - the contract the learning subsystem
/// consumes. How the model computes or updates its parameters is its own
/// business; the learner only ever predicts action values and feeds
/// training batches.
pub trait QFunction {
    /// Size of the model's output vector = number of possible actions.
    fn num_actions(&self) -> usize;

    /// Predicts the action values for a single observation frame.
    ///
    /// # Returns
    ///   vector of length [Self::num_actions]
    fn predict(&self, state: &Frame) -> Array1<f32>;

    /// Performs a single training step using a batch of data.
    ///
    /// # Arguments
    /// * `inputs` matrix [batch_len, frame_len]
    /// * `targets` matrix [batch_len, num_actions]
    ///
    /// # Returns
    ///   calculated loss
    fn train_on_batch(
        &mut self,
        inputs: &Array2<f32>,
        targets: &Array2<f32>,
    ) -> f32;
}

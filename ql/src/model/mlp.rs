use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{bail, Context, Result};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::distributions::Uniform;
use rand::prelude::ThreadRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::frame_store::Frame;
use crate::model::QFunction;

/// Weight init range ('uniform' init of the reference network)
const INIT_WEIGHT_LIMIT: f32 = 0.05;

/// Structured description of an [MlpModel]'s shape - written next to the
/// weight blob so a later run (or a visualization tool) knows what it is
/// looking at.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Architecture {
    pub input_dim: usize,
    pub hidden_size: usize,
    /// number of hidden (ReLU) layers in front of the linear output layer
    pub hidden_layers: usize,
    pub num_actions: usize,
    pub learning_rate: f32,
}

#[derive(Clone, Serialize, Deserialize)]
struct DenseLayer {
    /// [input_dim, output_dim]
    weights: Array2<f32>,
    bias: Array1<f32>,
}

impl DenseLayer {
    fn random(rng: &mut ThreadRng, input_dim: usize, output_dim: usize) -> Self {
        let distribution = Uniform::new_inclusive(-INIT_WEIGHT_LIMIT, INIT_WEIGHT_LIMIT);
        Self {
            weights: Array2::from_shape_simple_fn((input_dim, output_dim), || rng.sample(distribution)),
            bias: Array1::zeros(output_dim),
        }
    }
}

/// Small fully connected action-value network: `hidden_layers` ReLU layers
/// followed by a linear output head, trained by plain SGD on a
/// mean-squared-error loss.
pub struct MlpModel {
    architecture: Architecture,
    layers: Vec<DenseLayer>,
}

impl MlpModel {
    pub fn new(architecture: Architecture) -> Self {
        assert!(architecture.input_dim > 0);
        assert!(architecture.hidden_size > 0);
        assert!(architecture.num_actions > 0);

        let mut rng = rand::thread_rng();
        let mut layers = Vec::with_capacity(architecture.hidden_layers + 1);
        let mut input_dim = architecture.input_dim;
        for _ in 0..architecture.hidden_layers {
            layers.push(DenseLayer::random(&mut rng, input_dim, architecture.hidden_size));
            input_dim = architecture.hidden_size;
        }
        layers.push(DenseLayer::random(&mut rng, input_dim, architecture.num_actions));

        Self { architecture, layers }
    }

    pub fn architecture(&self) -> &Architecture { &self.architecture }

    /// Forward pass over a batch. Returns the post-activation output of
    /// every layer; the last entry is the network output.
    fn forward(&self, inputs: ArrayView2<f32>) -> Vec<Array2<f32>> {
        let last = self.layers.len() - 1;
        let mut activations = Vec::with_capacity(self.layers.len());
        let mut current = inputs.to_owned();
        for (i, layer) in self.layers.iter().enumerate() {
            let mut z = current.dot(&layer.weights) + &layer.bias;
            if i < last {
                z.mapv_inplace(|v| v.max(0.0));
            }
            activations.push(z.clone());
            current = z;
        }
        activations
    }

    /// Writes the weights as one opaque binary blob.
    pub fn write_weights(&self, file: &Path) -> Result<()> {
        let writer = BufWriter::new(File::create(file).with_context(|| format!("creating weight file '{}'", file.display()))?);
        bincode::serialize_into(writer, &self.layers).with_context(|| format!("writing weights to '{}'", file.display()))?;
        Ok(())
    }

    /// Replaces the current weights with the content of a previously
    /// written weight blob. Fails if the file is missing, unreadable or
    /// does not match this model's architecture.
    pub fn read_weights(&mut self, file: &Path) -> Result<()> {
        let reader = BufReader::new(File::open(file).with_context(|| format!("opening weight file '{}'", file.display()))?);
        let layers: Vec<DenseLayer> = bincode::deserialize_from(reader).with_context(|| format!("reading weights from '{}'", file.display()))?;

        if layers.len() != self.layers.len() {
            bail!("weight file '{}' holds {} layers, model expects {}", file.display(), layers.len(), self.layers.len());
        }
        for (loaded, own) in layers.iter().zip(&self.layers) {
            if loaded.weights.dim() != own.weights.dim() || loaded.bias.len() != own.bias.len() {
                bail!("weight file '{}' does not match the model architecture", file.display());
            }
        }

        self.layers = layers;
        Ok(())
    }

    pub fn write_architecture(&self, file: &Path) -> Result<()> {
        let writer = BufWriter::new(File::create(file).with_context(|| format!("creating architecture file '{}'", file.display()))?);
        serde_json::to_writer_pretty(writer, &self.architecture).with_context(|| format!("writing architecture to '{}'", file.display()))?;
        Ok(())
    }
}

impl QFunction for MlpModel {
    fn num_actions(&self) -> usize { self.architecture.num_actions }

    fn predict(&self, state: &Frame) -> Array1<f32> {
        assert_eq!(state.len(), self.architecture.input_dim, "frame length mismatch. Expected {}, got {}", self.architecture.input_dim, state.len());
        let input = ArrayView2::from_shape((1, state.len()), state.values()).expect("one frame forms one input row");
        let activations = self.forward(input);
        activations.last().expect("network has at least one layer").row(0).to_owned()
    }

    fn train_on_batch(
        &mut self,
        inputs: &Array2<f32>,
        targets: &Array2<f32>,
    ) -> f32 {
        assert_eq!(inputs.nrows(), targets.nrows());
        assert_eq!(inputs.ncols(), self.architecture.input_dim);
        assert_eq!(targets.ncols(), self.architecture.num_actions);

        let activations = self.forward(inputs.view());
        let output = activations.last().expect("network has at least one layer");

        let diff = output - targets;
        let loss = diff.mapv(|e| e * e).mean().expect("batch is non-empty");

        // backpropagation: d(mse)/d(output), then layer by layer backwards
        let mut delta = diff * (2.0 / (output.len() as f32));
        for i in (0..self.layers.len()).rev() {
            let layer_input = if i == 0 { inputs.view() } else { activations[i - 1].view() };
            let weight_gradient = layer_input.t().dot(&delta);
            let bias_gradient = delta.sum_axis(Axis(0));

            if i > 0 {
                // ReLU derivative: the cached activation is positive exactly
                // where the pre-activation was
                let mask = activations[i - 1].mapv(|v| if v > 0.0 { 1.0 } else { 0.0 });
                delta = delta.dot(&self.layers[i].weights.t()) * mask;
            }

            let lr = self.architecture.learning_rate;
            let layer = &mut self.layers[i];
            layer.weights.scaled_add(-lr, &weight_gradient);
            layer.bias.scaled_add(-lr, &bias_gradient);
        }

        loss
    }
}

use ndarray::Array4;
use std::path::Path;
use std::time::Duration;
use tch::nn::{self, ModuleT};
use tch::{Device, Kind, Tensor};

use super::preprocess::{INPUT_CHANNELS, INPUT_SIZE, PreprocessError};

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Preprocessing error: {0}")]
    Preprocessing(#[from] PreprocessError),
    #[error("Model error: {0}")]
    Model(#[from] tch::TchError),
    #[error("Unexpected input shape {0:?}")]
    InputShape(Vec<usize>),
    #[error("Model produced {actual} logits, expected {expected}")]
    OutputShape { expected: usize, actual: usize },
    #[error("Model produced a non-finite logit at index {0}")]
    NonFiniteOutput(usize),
    #[error("Inference timed out after {0:?}")]
    Timeout(Duration),
    #[error("Inference task failed: {0}")]
    Blocking(String),
}

/// Maps a preprocessed `(1, 3, 256, 256)` input to one logit per class.
pub trait Classifier: Send + Sync {
    fn logits(&self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError>;

    fn num_classes(&self) -> usize;
}

/// conv 3x3 (padding 1) -> batch norm -> relu, optionally followed by a 4x max pool.
#[derive(Debug)]
struct ConvBlock {
    conv: nn::Conv2D,
    norm: nn::BatchNorm,
    pool: bool,
}

impl ConvBlock {
    fn new(p: &nn::Path, in_channels: i64, out_channels: i64, pool: bool) -> Self {
        let config = nn::ConvConfig {
            padding: 1,
            ..Default::default()
        };
        Self {
            conv: nn::conv2d(p / "0", in_channels, out_channels, 3, config),
            norm: nn::batch_norm2d(p / "1", out_channels, Default::default()),
            pool,
        }
    }
}

impl ModuleT for ConvBlock {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        let out = xs.apply(&self.conv).apply_t(&self.norm, train).relu();
        if self.pool {
            out.max_pool2d_default(4)
        } else {
            out
        }
    }
}

/// Two channel-preserving conv blocks with an identity shortcut.
#[derive(Debug)]
struct Residual {
    first: ConvBlock,
    second: ConvBlock,
}

impl Residual {
    fn new(p: &nn::Path, channels: i64) -> Self {
        Self {
            first: ConvBlock::new(&(p / "0"), channels, channels, false),
            second: ConvBlock::new(&(p / "1"), channels, channels, false),
        }
    }
}

impl ModuleT for Residual {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        xs.apply_t(&self.first, train).apply_t(&self.second, train) + xs
    }
}

/// ResNet-9 as used for the leaf disease classifier. Variable paths follow the
/// PyTorch state dict of the trained network (`conv1.0.weight`,
/// `res2.1.1.running_var`, `classifier.2.bias`, ...).
#[derive(Debug)]
pub struct ResNet9 {
    conv1: ConvBlock,
    conv2: ConvBlock,
    res1: Residual,
    conv3: ConvBlock,
    conv4: ConvBlock,
    res2: Residual,
    classifier: nn::Linear,
}

impl ResNet9 {
    pub fn new(p: &nn::Path, in_channels: i64, num_classes: i64) -> Self {
        Self {
            conv1: ConvBlock::new(&(p / "conv1"), in_channels, 64, false),
            conv2: ConvBlock::new(&(p / "conv2"), 64, 128, true),
            res1: Residual::new(&(p / "res1"), 128),
            conv3: ConvBlock::new(&(p / "conv3"), 128, 256, true),
            conv4: ConvBlock::new(&(p / "conv4"), 256, 512, true),
            res2: Residual::new(&(p / "res2"), 512),
            classifier: nn::linear(p / "classifier" / "2", 512, num_classes, Default::default()),
        }
    }
}

impl ModuleT for ResNet9 {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        xs.apply_t(&self.conv1, train)
            .apply_t(&self.conv2, train)
            .apply_t(&self.res1, train)
            .apply_t(&self.conv3, train)
            .apply_t(&self.conv4, train)
            .apply_t(&self.res2, train)
            .max_pool2d_default(4)
            .flat_view()
            .apply(&self.classifier)
    }
}

/// The trained classifier, loaded once and shared read-only between requests.
pub struct PlantDiseaseModel {
    _vs: nn::VarStore,
    net: ResNet9,
    device: Device,
    num_classes: usize,
}

impl PlantDiseaseModel {
    pub fn load(weights_path: &Path, num_classes: usize) -> Result<Self, InferenceError> {
        let device = Device::cuda_if_available();
        let mut vs = nn::VarStore::new(device);
        let net = ResNet9::new(&vs.root(), INPUT_CHANNELS as i64, num_classes as i64);
        vs.load(weights_path)?;
        vs.freeze();
        log::info!(
            "Loaded classifier weights from {} on {:?}",
            weights_path.display(),
            device
        );
        Ok(Self {
            _vs: vs,
            net,
            device,
            num_classes,
        })
    }
}

impl Classifier for PlantDiseaseModel {
    fn logits(&self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
        let side = INPUT_SIZE as usize;
        if input.shape() != [1, INPUT_CHANNELS, side, side] {
            return Err(InferenceError::InputShape(input.shape().to_vec()));
        }
        let data = input
            .as_slice()
            .ok_or_else(|| InferenceError::InputShape(input.shape().to_vec()))?;
        let dims: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();

        let tensor = Tensor::from_slice(data)
            .view(dims.as_slice())
            .to_device(self.device);
        let output = tch::no_grad(|| self.net.forward_t(&tensor, false));
        let output = output.to_kind(Kind::Float).to_device(Device::Cpu).view([-1]);
        let logits = Vec::<f32>::try_from(&output)?;

        if logits.len() != self.num_classes {
            return Err(InferenceError::OutputShape {
                expected: self.num_classes,
                actual: logits.len(),
            });
        }
        Ok(logits)
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }
}

/// Index of the largest logit. `total_cmp` ranks a positive NaN above every
/// number, so callers must reject non-finite logits first.
pub fn argmax(logits: &[f32]) -> Option<usize> {
    logits
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(index, _)| index)
}

pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|v| v / sum).collect()
}

/// Fraction of rows whose arg-max matches the expected class.
#[cfg(test)]
pub fn accuracy(outputs: &[Vec<f32>], labels: &[usize]) -> f32 {
    if outputs.is_empty() || outputs.len() != labels.len() {
        return 0.0;
    }
    let correct = outputs
        .iter()
        .zip(labels)
        .filter(|(row, label)| argmax(row) == Some(**label))
        .count();
    correct as f32 / outputs.len() as f32
}

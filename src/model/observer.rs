use std::fmt;

use burn::prelude::*;

use super::ModelError;

/// The eight observable encoder/decoder stages of the network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Encoder1,
    Encoder2,
    Encoder3,
    Encoder4,
    Decoder1,
    Decoder2,
    Decoder3,
    Decoder4,
}

impl Stage {
    pub const ALL: [Stage; 8] = [
        Stage::Encoder1,
        Stage::Encoder2,
        Stage::Encoder3,
        Stage::Encoder4,
        Stage::Decoder1,
        Stage::Decoder2,
        Stage::Decoder3,
        Stage::Decoder4,
    ];

    /// File stem used when dumping this stage's output activations.
    pub fn activation_name(&self) -> &'static str {
        match self {
            Stage::Encoder1 => "enc1_out",
            Stage::Encoder2 => "enc2_out",
            Stage::Encoder3 => "enc3_out",
            Stage::Encoder4 => "enc4_out",
            Stage::Decoder1 => "dec1_out",
            Stage::Decoder2 => "dec2_out",
            Stage::Decoder3 => "dec3_out",
            Stage::Decoder4 => "dec4_out",
        }
    }

    /// File stem used when dumping this stage's first convolution kernel.
    pub fn kernel_name(&self) -> &'static str {
        match self {
            Stage::Encoder1 => "encoder1",
            Stage::Encoder2 => "encoder2",
            Stage::Encoder3 => "encoder3",
            Stage::Encoder4 => "encoder4",
            Stage::Decoder1 => "decoder1",
            Stage::Decoder2 => "decoder2",
            Stage::Decoder3 => "decoder3",
            Stage::Decoder4 => "decoder4",
        }
    }

    pub fn is_encoder(&self) -> bool {
        matches!(
            self,
            Stage::Encoder1 | Stage::Encoder2 | Stage::Encoder3 | Stage::Encoder4
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kernel_name())
    }
}

/// Hook invoked by [`UNet::forward_observed`](super::UNet::forward_observed).
///
/// Encoder activations are reported as they enter the skip connection (so they are
/// all zeros when skip ablation is on), decoder activations right after their block.
/// Kernels are reported once per pass, after the decoder has run.
pub trait StageObserver<B: Backend> {
    fn on_activation(&mut self, _stage: Stage, _features: &Tensor<B, 4>) -> Result<(), ModelError> {
        Ok(())
    }

    fn on_kernel(&mut self, _stage: Stage, _weight: &Tensor<B, 4>) -> Result<(), ModelError> {
        Ok(())
    }
}

impl<B: Backend> StageObserver<B> for () {}

/// Records the activation shape of every stage seen during a forward pass.
#[derive(Clone, Debug, Default)]
pub struct ShapeRecorder {
    activations: Vec<(Stage, [usize; 4])>,
}

impl ShapeRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dims(&self, stage: Stage) -> Option<[usize; 4]> {
        self.activations
            .iter()
            .rev()
            .find(|(s, _)| *s == stage)
            .map(|(_, dims)| *dims)
    }

    pub fn channels(&self, stage: Stage) -> Option<usize> {
        self.dims(stage).map(|dims| dims[1])
    }

    pub fn len(&self) -> usize {
        self.activations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activations.is_empty()
    }
}

impl<B: Backend> StageObserver<B> for ShapeRecorder {
    fn on_activation(&mut self, stage: Stage, features: &Tensor<B, 4>) -> Result<(), ModelError> {
        self.activations.push((stage, features.dims()));
        Ok(())
    }
}

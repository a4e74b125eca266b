use burn::{
    nn::{
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Relu,
        conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig},
        pool::MaxPool2d,
    },
    prelude::*,
};
use nn::{PaddingConfig2d, pool::MaxPool2dConfig};

use super::{ModelError, Stage};

/// Two `conv 3x3 (no bias) -> batch norm -> relu` stages at constant resolution.
#[derive(Module, Debug)]
pub struct DoubleConv<B: Backend> {
    conv1: Conv2d<B>,
    norm1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    norm2: BatchNorm<B, 2>,
    activation: Relu,
}

impl<B: Backend> DoubleConv<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv1.forward(x);
        let x = self.norm1.forward(x);
        let x = self.activation.forward(x);
        let x = self.conv2.forward(x);
        let x = self.norm2.forward(x);

        self.activation.forward(x)
    }

    /// Kernel of the first convolution, shaped `[num_filters, input_channels, 3, 3]`.
    pub fn first_conv_weight(&self) -> Tensor<B, 4> {
        self.conv1.weight.val()
    }
}

#[derive(Config, Debug)]
pub struct DoubleConvConfig {
    input_channels: usize,
    num_filters: usize,
}

impl DoubleConvConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DoubleConv<B> {
        DoubleConv {
            conv1: Conv2dConfig::new([self.input_channels, self.num_filters], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(false)
                .init(device),
            norm1: BatchNormConfig::new(self.num_filters).init(device),
            conv2: Conv2dConfig::new([self.num_filters, self.num_filters], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(false)
                .init(device),
            norm2: BatchNormConfig::new(self.num_filters).init(device),
            activation: Relu::new(),
        }
    }
}

#[derive(Module, Debug)]
pub struct EncoderBlock<B: Backend> {
    conv_block: DoubleConv<B>,
    dropout: Dropout,
    max_pool: MaxPool2d,
}

impl<B: Backend> EncoderBlock<B> {
    /// Returns the pooled map for the next stage and the full-resolution skip features.
    pub fn forward(&self, x: Tensor<B, 4>) -> (Tensor<B, 4>, Tensor<B, 4>) {
        let skip_features = self.dropout.forward(self.conv_block.forward(x));
        let x = self.max_pool.forward(skip_features.clone());

        (x, skip_features)
    }

    pub fn conv_block(&self) -> &DoubleConv<B> {
        &self.conv_block
    }
}

#[derive(Config, Debug)]
pub struct EncoderBlockConfig {
    conv_block: DoubleConvConfig,
    #[config(default = "0.2")]
    dropout: f64,
}

impl EncoderBlockConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> EncoderBlock<B> {
        EncoderBlock {
            conv_block: self.conv_block.init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            max_pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }
}

#[derive(Module, Debug)]
pub struct DecoderBlock<B: Backend> {
    conv_transpose: ConvTranspose2d<B>,
    conv_block: DoubleConv<B>,
}

impl<B: Backend> DecoderBlock<B> {
    /// Upsamples `x`, concatenates `skip_features` along channels and fuses them.
    ///
    /// Fails with [`ModelError::ShapeMismatch`] when the upsampled map and the skip
    /// features disagree on any non-channel dimension.
    pub fn forward(
        &self,
        stage: Stage,
        x: Tensor<B, 4>,
        skip_features: Tensor<B, 4>,
    ) -> Result<Tensor<B, 4>, ModelError> {
        let x = self.conv_transpose.forward(x);

        let [batch, _, height, width] = x.dims();
        let [skip_batch, _, skip_height, skip_width] = skip_features.dims();
        if (batch, height, width) != (skip_batch, skip_height, skip_width) {
            return Err(ModelError::ShapeMismatch {
                stage,
                upsampled: x.dims(),
                skip: skip_features.dims(),
            });
        }

        let x = Tensor::cat(vec![x, skip_features], 1);

        Ok(self.conv_block.forward(x))
    }

    pub fn conv_block(&self) -> &DoubleConv<B> {
        &self.conv_block
    }
}

#[derive(Config, Debug)]
pub struct DecoderBlockConfig {
    input_channels: usize,
    num_filters: usize,
    conv_block: DoubleConvConfig,
}

impl DecoderBlockConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DecoderBlock<B> {
        DecoderBlock {
            conv_transpose: ConvTranspose2dConfig::new(
                [self.input_channels, self.num_filters],
                [2, 2],
            )
            .with_stride([2, 2])
            .init(device),
            conv_block: self.conv_block.init(device),
        }
    }
}

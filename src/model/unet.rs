use std::path::{Path, PathBuf};

use burn::{
    module::Ignored,
    nn::conv::{Conv2d, Conv2dConfig},
    prelude::*,
    tensor::activation::sigmoid,
};

use super::blocks::{
    DecoderBlock, DecoderBlockConfig, DoubleConv, DoubleConvConfig, EncoderBlock,
    EncoderBlockConfig,
};
use super::{DiagnosticWriter, ModelError, Stage, StageObserver};

/// Number of 2x2 poolings between the input and the bottleneck.
pub const DEPTH: usize = 4;

/// Input height and width must be multiples of this for the skip connections to align.
pub const SPATIAL_MULTIPLE: usize = 1 << DEPTH;

/// Four-level U-Net producing a per-pixel probability map.
///
/// ```text
/// (batch, in_channels, H, W)
///   -> enc1 (f)  -> pool -> enc2 (2f) -> pool -> enc3 (4f) -> pool -> enc4 (8f) -> pool
///   -> bottleneck (16f)
///   -> up + [enc4] -> dec4 (8f) -> up + [enc3] -> dec3 (4f)
///   -> up + [enc2] -> dec2 (2f) -> up + [enc1] -> dec1 (f)
///   -> conv 1x1 -> sigmoid
///   -> (batch, out_channels, H, W)
/// ```
#[derive(Module, Debug)]
pub struct UNet<B: Backend> {
    encoder_block_1: EncoderBlock<B>,
    encoder_block_2: EncoderBlock<B>,
    encoder_block_3: EncoderBlock<B>,
    encoder_block_4: EncoderBlock<B>,
    bottleneck: DoubleConv<B>,
    decoder_block_4: DecoderBlock<B>,
    decoder_block_3: DecoderBlock<B>,
    decoder_block_2: DecoderBlock<B>,
    decoder_block_1: DecoderBlock<B>,
    conv_1x1: Conv2d<B>,
    in_channels: usize,
    out_channels: usize,
    skip_ablation: bool,
    diagnostic_dir: Ignored<Option<PathBuf>>,
}

#[derive(Config, Debug)]
pub struct UNetConfig {
    #[config(default = "3")]
    pub in_channels: usize,
    #[config(default = "1")]
    pub out_channels: usize,
    /// Width of the first encoder stage; every level below doubles it.
    #[config(default = "32")]
    pub features: usize,
    /// Dropout probability applied to each encoder stage output.
    #[config(default = "0.2")]
    pub dropout: f64,
    /// Replace every skip connection with zeros ("cutpath").
    #[config(default = "false")]
    pub skip_ablation: bool,
    /// When set, every forward pass dumps stage activations and kernels here.
    pub diagnostic_dir: Option<PathBuf>,
}

impl UNetConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> UNet<B> {
        let f = self.features;
        let encoder = |input_channels: usize, num_filters: usize| -> EncoderBlock<B> {
            EncoderBlockConfig::new(DoubleConvConfig::new(input_channels, num_filters))
                .with_dropout(self.dropout)
                .init(device)
        };
        // Decoder input after concatenation is twice the stage width.
        let decoder = |input_channels: usize, num_filters: usize| -> DecoderBlock<B> {
            DecoderBlockConfig::new(
                input_channels,
                num_filters,
                DoubleConvConfig::new(num_filters * 2, num_filters),
            )
            .init(device)
        };

        UNet {
            encoder_block_1: encoder(self.in_channels, f),
            encoder_block_2: encoder(f, f * 2),
            encoder_block_3: encoder(f * 2, f * 4),
            encoder_block_4: encoder(f * 4, f * 8),
            bottleneck: DoubleConvConfig::new(f * 8, f * 16).init(device),
            decoder_block_4: decoder(f * 16, f * 8),
            decoder_block_3: decoder(f * 8, f * 4),
            decoder_block_2: decoder(f * 4, f * 2),
            decoder_block_1: decoder(f * 2, f),
            conv_1x1: Conv2dConfig::new([f, self.out_channels], [1, 1]).init(device),
            in_channels: self.in_channels,
            out_channels: self.out_channels,
            skip_ablation: self.skip_ablation,
            diagnostic_dir: Ignored(self.diagnostic_dir.clone()),
        }
    }
}

impl<B: Backend> UNet<B> {
    /// Runs the network, dumping diagnostics when a diagnostic directory is configured.
    ///
    /// Inputs with the wrong channel count fail with [`ModelError::ChannelMismatch`],
    /// inputs with a side below [`SPATIAL_MULTIPLE`] pixels with
    /// [`ModelError::InputTooSmall`]. Any other side that is not a multiple of
    /// [`SPATIAL_MULTIPLE`] fails with [`ModelError::ShapeMismatch`] at the first skip
    /// concatenation that no longer lines up.
    pub fn forward(&self, images: Tensor<B, 4>) -> Result<Tensor<B, 4>, ModelError> {
        match self.diagnostic_dir() {
            Some(dir) => {
                let mut writer = DiagnosticWriter::new(dir)?;
                self.forward_observed(images, &mut writer)
            }
            None => self.forward_observed(images, &mut ()),
        }
    }

    /// Runs the network, reporting every stage activation and first-layer kernel to
    /// `observer`.
    pub fn forward_observed<O: StageObserver<B>>(
        &self,
        images: Tensor<B, 4>,
        observer: &mut O,
    ) -> Result<Tensor<B, 4>, ModelError> {
        self.check_input(&images)?;

        let (x, skip_features_1) = self.encoder_block_1.forward(images);
        let (x, skip_features_2) = self.encoder_block_2.forward(x);
        let (x, skip_features_3) = self.encoder_block_3.forward(x);
        let (x, skip_features_4) = self.encoder_block_4.forward(x);

        let x = self.bottleneck.forward(x);

        let skips = [
            skip_features_1,
            skip_features_2,
            skip_features_3,
            skip_features_4,
        ];
        let [skip_features_1, skip_features_2, skip_features_3, skip_features_4] =
            if self.skip_ablation {
                skips.map(|skip| skip.zeros_like())
            } else {
                skips
            };

        observer.on_activation(Stage::Encoder1, &skip_features_1)?;
        observer.on_activation(Stage::Encoder2, &skip_features_2)?;
        observer.on_activation(Stage::Encoder3, &skip_features_3)?;
        observer.on_activation(Stage::Encoder4, &skip_features_4)?;

        let x = self
            .decoder_block_4
            .forward(Stage::Decoder4, x, skip_features_4)?;
        observer.on_activation(Stage::Decoder4, &x)?;
        let x = self
            .decoder_block_3
            .forward(Stage::Decoder3, x, skip_features_3)?;
        observer.on_activation(Stage::Decoder3, &x)?;
        let x = self
            .decoder_block_2
            .forward(Stage::Decoder2, x, skip_features_2)?;
        observer.on_activation(Stage::Decoder2, &x)?;
        let x = self
            .decoder_block_1
            .forward(Stage::Decoder1, x, skip_features_1)?;
        observer.on_activation(Stage::Decoder1, &x)?;

        for stage in Stage::ALL {
            observer.on_kernel(stage, &self.stage_block(stage).first_conv_weight())?;
        }

        Ok(sigmoid(self.conv_1x1.forward(x)))
    }

    /// The double-convolution block of an encoder or decoder stage.
    pub fn stage_block(&self, stage: Stage) -> &DoubleConv<B> {
        match stage {
            Stage::Encoder1 => self.encoder_block_1.conv_block(),
            Stage::Encoder2 => self.encoder_block_2.conv_block(),
            Stage::Encoder3 => self.encoder_block_3.conv_block(),
            Stage::Encoder4 => self.encoder_block_4.conv_block(),
            Stage::Decoder1 => self.decoder_block_1.conv_block(),
            Stage::Decoder2 => self.decoder_block_2.conv_block(),
            Stage::Decoder3 => self.decoder_block_3.conv_block(),
            Stage::Decoder4 => self.decoder_block_4.conv_block(),
        }
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    pub fn skip_ablation(&self) -> bool {
        self.skip_ablation
    }

    pub fn diagnostic_dir(&self) -> Option<&Path> {
        self.diagnostic_dir.0.as_deref()
    }

    fn check_input(&self, images: &Tensor<B, 4>) -> Result<(), ModelError> {
        let [_, channels, height, width] = images.dims();

        if channels != self.in_channels {
            return Err(ModelError::ChannelMismatch {
                expected: self.in_channels,
                actual: channels,
            });
        }

        if height < SPATIAL_MULTIPLE || width < SPATIAL_MULTIPLE {
            return Err(ModelError::InputTooSmall {
                height,
                width,
                min: SPATIAL_MULTIPLE,
            });
        }

        Ok(())
    }
}

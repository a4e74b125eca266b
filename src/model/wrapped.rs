use burn::{
    nn::conv::{Conv2d, Conv2dConfig},
    prelude::*,
};

use super::{ModelError, UNet};

/// A [`UNet`] followed by an extra 1x1 convolution remapping its output channels.
///
/// No activation follows the extra convolution, so outputs are not bounded to `[0, 1]`.
#[derive(Module, Debug)]
pub struct WrappedUNet<B: Backend> {
    unet: UNet<B>,
    conv: Conv2d<B>,
}

/// The extra convolution reads the wrapped network's `out_channels`, so only the
/// remapped width is configured here.
#[derive(Config, Debug)]
pub struct WrappedUNetConfig {
    pub out_channels: usize,
}

impl WrappedUNetConfig {
    pub fn init<B: Backend>(&self, unet: UNet<B>, device: &B::Device) -> WrappedUNet<B> {
        let conv = Conv2dConfig::new([unet.out_channels(), self.out_channels], [1, 1]).init(device);

        WrappedUNet { unet, conv }
    }
}

impl<B: Backend> WrappedUNet<B> {
    pub fn forward(&self, images: Tensor<B, 4>) -> Result<Tensor<B, 4>, ModelError> {
        let x = self.unet.forward(images)?;

        Ok(self.conv.forward(x))
    }

    pub fn unet(&self) -> &UNet<B> {
        &self.unet
    }

    pub fn into_unet(self) -> UNet<B> {
        self.unet
    }
}

mod blocks;
mod diagnostics;
mod error;
mod observer;
mod unet;
mod wrapped;

pub use blocks::{
    DecoderBlock, DecoderBlockConfig, DoubleConv, DoubleConvConfig, EncoderBlock,
    EncoderBlockConfig,
};
pub use diagnostics::DiagnosticWriter;
pub use error::ModelError;
pub use observer::{ShapeRecorder, Stage, StageObserver};
pub use unet::{DEPTH, SPATIAL_MULTIPLE, UNet, UNetConfig};
pub use wrapped::{WrappedUNet, WrappedUNetConfig};

pub mod model;

#[cfg(feature = "dataset")]
pub mod dataset;

pub use model::{ModelError, UNet, UNetConfig, WrappedUNet, WrappedUNetConfig};

#[cfg(feature = "dataset")]
pub use dataset::{DatasetError, InputMode, PairedImageDataset, ResizeToTensor};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

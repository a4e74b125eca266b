use std::path::PathBuf;

use thiserror::Error;

use super::Stage;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error(
        "Shape mismatch at {stage}: upsampled features {upsampled:?} cannot be concatenated with skip features {skip:?}"
    )]
    ShapeMismatch {
        stage: Stage,
        upsampled: [usize; 4],
        skip: [usize; 4],
    },

    #[error("Input has {actual} channels, network expects {expected}")]
    ChannelMismatch { expected: usize, actual: usize },

    #[error("Input of spatial size {height}x{width} is too small, both sides must be at least {min}")]
    InputTooSmall {
        height: usize,
        width: usize,
        min: usize,
    },

    #[error("Failed to write diagnostic image {path:?}: {source}")]
    Diagnostic {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unreadable tensor data: {0}")]
    TensorData(String),
}

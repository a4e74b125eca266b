use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("Invalid dataset configuration: {0}")]
    Configuration(String),

    #[error("Index {index} is out of range for a dataset of {len} pairs")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Failed to decode image {path:?}: {source}")]
    Decode {
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

    #[error("Transform failed: {0}")]
    Transform(String),
}

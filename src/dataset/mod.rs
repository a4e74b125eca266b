mod error;
mod paired;
mod segmentation;
mod transform;

pub use error::DatasetError;
pub use paired::{ImagePair, ImagePairItem, PairSample, PairedImageDataset};
pub use segmentation::{SegmentationBatch, SegmentationBatcher};
pub use transform::{ImageTransform, InputMode, ResizeToTensor};

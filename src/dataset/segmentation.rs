use std::sync::Arc;

use burn::{data::dataloader::batcher::Batcher, prelude::*};
use derive_new::new;

use super::{DatasetError, ImagePairItem, PairSample};

/// Stacks [`ImagePairItem`]s into device tensors for the data loader.
#[derive(new, Clone)]
pub struct SegmentationBatcher<B: Backend> {
    device: B::Device,
}

#[derive(Clone, Debug)]
pub struct SegmentationBatch<B: Backend> {
    /// `[batch, channels, height, width]`
    pub images: Tensor<B, 4>,
    /// `[batch, mask_channels, height, width]`
    pub masks: Tensor<B, 4>,
}

impl<B: Backend> SegmentationBatcher<B> {
    fn stack(&self, items: &[ImagePairItem]) -> SegmentationBatch<B> {
        let (images, masks): (Vec<_>, Vec<_>) = items
            .iter()
            .map(|item| item.to_tensors::<B>(&self.device))
            .unzip();

        let images: Tensor<B, 4> = Tensor::stack::<4>(images, 0);
        let masks: Tensor<B, 4> = Tensor::stack::<4>(masks, 0);

        SegmentationBatch { images, masks }
    }
}

impl<B: Backend> Batcher<ImagePairItem, SegmentationBatch<B>> for SegmentationBatcher<B> {
    fn batch(&self, items: Vec<ImagePairItem>) -> SegmentationBatch<B> {
        self.stack(&items)
    }
}

/// Batches straight from [`PairedImageDataset`](super::PairedImageDataset): the batch
/// is the first load error among its samples, if any.
impl<B: Backend> Batcher<PairSample, Result<SegmentationBatch<B>, Arc<DatasetError>>>
    for SegmentationBatcher<B>
{
    fn batch(&self, items: Vec<PairSample>) -> Result<SegmentationBatch<B>, Arc<DatasetError>> {
        let items = items.into_iter().collect::<Result<Vec<_>, _>>()?;

        Ok(self.stack(&items))
    }
}

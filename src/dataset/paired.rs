use std::path::{Path, PathBuf};
use std::sync::Arc;

use burn::data::dataset::Dataset;
use burn::prelude::*;
use derive_new::new;
use rand::{SeedableRng, rngs::StdRng, seq::index};

use super::{DatasetError, ImageTransform, ResizeToTensor};

/// A raw image and its mask, paired by position in the sorted directory listings.
#[derive(new, Clone, Debug, PartialEq, Eq)]
pub struct ImagePair {
    pub raw: PathBuf,
    pub mask: PathBuf,
}

/// One transformed sample, both tensors shaped `[channels, height, width]`.
#[derive(new, Clone, Debug)]
pub struct ImagePairItem {
    pub raw: TensorData,
    pub mask: TensorData,
}

impl ImagePairItem {
    pub fn to_tensors<B: Backend>(&self, device: &B::Device) -> (Tensor<B, 3>, Tensor<B, 3>) {
        (
            Tensor::from_data(self.raw.clone().convert::<B::FloatElem>(), device),
            Tensor::from_data(self.mask.clone().convert::<B::FloatElem>(), device),
        )
    }
}

/// Raw/mask image pairs read from two directories.
///
/// Both directories are listed once at construction and sorted by file name; the
/// i-th raw file is paired with the i-th mask file. Only the counts are checked, so
/// matching names across the two directories is up to the caller. Every [`get`]
/// decodes both files from disk again.
///
/// [`get`]: PairedImageDataset::get
pub struct PairedImageDataset {
    pairs: Vec<ImagePair>,
    transform: Box<dyn ImageTransform>,
}

impl PairedImageDataset {
    /// Pairs the two directories with the default 256x256 [`ResizeToTensor`] transform.
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(
        raw_dir: P,
        mask_dir: Q,
    ) -> Result<Self, DatasetError> {
        Self::with_transform(raw_dir, mask_dir, ResizeToTensor::default())
    }

    pub fn with_transform<P, Q, T>(
        raw_dir: P,
        mask_dir: Q,
        transform: T,
    ) -> Result<Self, DatasetError>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
        T: ImageTransform + 'static,
    {
        let raw_dir = raw_dir.as_ref();
        let mask_dir = mask_dir.as_ref();
        let raw = sorted_files(raw_dir)?;
        let mask = sorted_files(mask_dir)?;

        if raw.len() != mask.len() {
            return Err(DatasetError::Configuration(format!(
                "{} raw images in {:?} but {} masks in {:?}",
                raw.len(),
                raw_dir,
                mask.len(),
                mask_dir
            )));
        }

        let pairs: Vec<_> = raw
            .into_iter()
            .zip(mask)
            .map(|(raw, mask)| ImagePair::new(raw, mask))
            .collect();

        tracing::info!(
            pairs = pairs.len(),
            raw_dir = %raw_dir.display(),
            mask_dir = %mask_dir.display(),
            "Enumerated image pairs"
        );

        Ok(Self {
            pairs,
            transform: Box::new(transform),
        })
    }

    /// Keeps `k` pairs chosen with a generator seeded by `seed`, in their sorted order.
    ///
    /// The same seed always selects the same pairs for the same directory contents.
    pub fn with_sample(mut self, k: usize, seed: u64) -> Result<Self, DatasetError> {
        let available = self.pairs.len();
        if k > available {
            return Err(DatasetError::Configuration(format!(
                "Cannot sample {k} pairs from a dataset of {available}"
            )));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut keep = index::sample(&mut rng, available, k).into_vec();
        keep.sort_unstable();

        self.pairs = keep.into_iter().map(|i| self.pairs[i].clone()).collect();

        tracing::debug!(kept = k, available, seed, "Subsampled image pairs");
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> &[ImagePair] {
        &self.pairs
    }

    /// Decodes and transforms the pair at `index`.
    pub fn get(&self, index: usize) -> Result<ImagePairItem, DatasetError> {
        let pair = self
            .pairs
            .get(index)
            .ok_or(DatasetError::IndexOutOfRange {
                index,
                len: self.pairs.len(),
            })?;

        let raw = self.transform.apply(decode(&pair.raw)?)?;
        let mask = self.transform.apply(decode(&pair.mask)?)?;

        Ok(ImagePairItem::new(raw, mask))
    }
}

/// What the data loader sees for one index: the decoded pair, or why it failed.
///
/// A failed load is still an item, so a bad file surfaces in its batch instead of
/// ending the iteration early.
pub type PairSample = Result<ImagePairItem, Arc<DatasetError>>;

impl Dataset<PairSample> for PairedImageDataset {
    fn get(&self, index: usize) -> Option<PairSample> {
        match PairedImageDataset::get(self, index) {
            Err(DatasetError::IndexOutOfRange { .. }) => None,
            result => Some(result.map_err(Arc::new)),
        }
    }

    fn len(&self) -> usize {
        self.pairs.len()
    }
}

fn decode(path: &Path) -> Result<image::DynamicImage, DatasetError> {
    image::open(path).map_err(|source| DatasetError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

/// Regular, non-hidden files of `dir`, sorted by file name.
fn sorted_files(dir: &Path) -> Result<Vec<PathBuf>, DatasetError> {
    let io_error = |source| DatasetError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_error)? {
        let path = entry.map_err(io_error)?.path();
        let hidden = path
            .file_name()
            .is_some_and(|name| name.to_string_lossy().starts_with('.'));

        if path.is_file() && !hidden {
            files.push(path);
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
    use tempfile::TempDir;

    type TestBackend = NdArray<f32>;

    struct Fixture {
        _root: TempDir,
        raw: PathBuf,
        mask: PathBuf,
    }

    fn fixture(raw_names: &[&str], mask_names: &[&str]) -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let raw = root.path().join("raw");
        let mask = root.path().join("mask");
        std::fs::create_dir_all(&raw).unwrap();
        std::fs::create_dir_all(&mask).unwrap();

        for (i, name) in raw_names.iter().enumerate() {
            RgbImage::from_pixel(20 + i as u32, 12, Rgb([i as u8 * 10, 100, 200]))
                .save(raw.join(name))
                .unwrap();
        }
        for name in mask_names {
            GrayImage::from_pixel(33, 17, Luma([255])).save(mask.join(name)).unwrap();
        }

        Fixture {
            _root: root,
            raw,
            mask,
        }
    }

    #[test]
    fn pairs_by_sorted_position() {
        let f = fixture(&["b.png", "a.png", "c.png"], &["3.png", "1.png", "2.png"]);

        let dataset = PairedImageDataset::new(&f.raw, &f.mask).unwrap();

        let names: Vec<_> = dataset
            .pairs()
            .iter()
            .map(|p| {
                (
                    p.raw.file_name().unwrap().to_string_lossy().into_owned(),
                    p.mask.file_name().unwrap().to_string_lossy().into_owned(),
                )
            })
            .collect();
        assert_eq!(
            names,
            vec![
                ("a.png".to_string(), "1.png".to_string()),
                ("b.png".to_string(), "2.png".to_string()),
                ("c.png".to_string(), "3.png".to_string()),
            ]
        );
    }

    #[test]
    fn count_mismatch_is_a_configuration_error() {
        let f = fixture(&["a.png", "b.png"], &["a.png"]);

        let result = PairedImageDataset::new(&f.raw, &f.mask);

        assert!(matches!(result, Err(DatasetError::Configuration(_))));
    }

    #[test]
    fn hidden_files_and_subdirectories_are_ignored() {
        let f = fixture(&["a.png"], &["a.png"]);
        std::fs::write(f.raw.join(".DS_Store"), b"junk").unwrap();
        std::fs::create_dir(f.mask.join("nested")).unwrap();

        let dataset = PairedImageDataset::new(&f.raw, &f.mask).unwrap();

        assert_eq!(dataset.len(), 1);
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let f = fixture(&[], &[]);

        let result = PairedImageDataset::new(f.raw.join("absent"), &f.mask);

        assert!(matches!(result, Err(DatasetError::Io { .. })));
    }

    #[test]
    fn get_resizes_both_images() {
        let f = fixture(&["a.png", "b.png"], &["a.png", "b.png"]);
        let dataset = PairedImageDataset::new(&f.raw, &f.mask).unwrap();

        let item = dataset.get(1).unwrap();

        assert_eq!(item.raw.shape, vec![3, 256, 256]);
        assert_eq!(item.mask.shape, vec![1, 256, 256]);
        let (raw, mask) = item.to_tensors::<TestBackend>(&Default::default());
        assert_eq!(raw.dims(), [3, 256, 256]);
        assert_eq!(mask.dims(), [1, 256, 256]);
    }

    #[test]
    fn get_out_of_range_fails() {
        let f = fixture(&["a.png"], &["a.png"]);
        let dataset = PairedImageDataset::new(&f.raw, &f.mask).unwrap();

        let err = dataset.get(1).unwrap_err();

        assert!(matches!(err, DatasetError::IndexOutOfRange { index: 1, len: 1 }));
        assert!(Dataset::get(&dataset, 1).is_none());
    }

    #[test]
    fn undecodable_file_is_a_decode_error() {
        let f = fixture(&["a.png"], &[]);
        std::fs::write(f.mask.join("a.png"), b"not an image").unwrap();
        let dataset = PairedImageDataset::new(&f.raw, &f.mask).unwrap();

        let err = dataset.get(0).unwrap_err();

        assert!(matches!(err, DatasetError::Decode { .. }));
        match Dataset::get(&dataset, 0) {
            Some(Err(e)) => assert!(matches!(*e, DatasetError::Decode { .. })),
            other => panic!("expected a failed sample, got {other:?}"),
        }
    }

    #[test]
    fn get_rereads_files_on_every_call() {
        let f = fixture(&["a.png"], &["a.png"]);
        let dataset = PairedImageDataset::with_transform(
            &f.raw,
            &f.mask,
            ResizeToTensor::new().with_size([4, 4]),
        )
        .unwrap();

        let before = dataset.get(0).unwrap();
        GrayImage::from_pixel(5, 5, Luma([0]))
            .save(f.mask.join("a.png"))
            .unwrap();
        let after = dataset.get(0).unwrap();

        let first = |data: &TensorData| data.clone().convert::<f32>().to_vec::<f32>().unwrap()[0];
        assert!((first(&before.mask) - 1.0).abs() < 1e-6);
        assert!(first(&after.mask).abs() < 1e-6);
    }

    #[test]
    fn custom_transform_is_applied_to_both_images() {
        let f = fixture(&["a.png"], &["a.png"]);
        let dataset = PairedImageDataset::with_transform(
            &f.raw,
            &f.mask,
            |image: DynamicImage| -> Result<TensorData, DatasetError> {
                Ok(TensorData::new(
                    vec![image.width() as f32],
                    [1, 1, 1],
                ))
            },
        )
        .unwrap();

        let item = dataset.get(0).unwrap();

        assert_eq!(item.raw.clone().to_vec::<f32>().unwrap(), vec![20.0]);
        assert_eq!(item.mask.clone().to_vec::<f32>().unwrap(), vec![33.0]);
    }

    #[test]
    fn sampling_is_deterministic_and_keeps_alignment() {
        let names = ["a.png", "b.png", "c.png", "d.png", "e.png", "f.png"];
        let f = fixture(&names, &names);

        let first = PairedImageDataset::new(&f.raw, &f.mask)
            .unwrap()
            .with_sample(3, 7)
            .unwrap();
        let second = PairedImageDataset::new(&f.raw, &f.mask)
            .unwrap()
            .with_sample(3, 7)
            .unwrap();

        assert_eq!(first.len(), 3);
        assert_eq!(first.pairs(), second.pairs());
        for pair in first.pairs() {
            assert_eq!(pair.raw.file_name(), pair.mask.file_name());
        }
        let mut sorted = first.pairs().to_vec();
        sorted.sort_by(|a, b| a.raw.cmp(&b.raw));
        assert_eq!(sorted, first.pairs());
    }

    #[test]
    fn oversized_sample_is_rejected() {
        let f = fixture(&["a.png"], &["a.png"]);

        let result = PairedImageDataset::new(&f.raw, &f.mask)
            .unwrap()
            .with_sample(2, 0);

        assert!(matches!(result, Err(DatasetError::Configuration(_))));
    }

    #[test]
    fn dataset_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PairedImageDataset>();
    }
}

use std::path::{Path, PathBuf};

use burn::prelude::*;
use image::{GrayImage, ImageFormat, Luma};

use super::{ModelError, Stage, StageObserver};

/// Tiles per grid row.
const GRID_COLUMNS: usize = 8;
/// Black border between tiles, in pixels.
const GRID_PADDING: usize = 2;

/// Dumps stage activations and first-layer kernels as PNG grids into a directory.
///
/// Each file is overwritten on every forward pass:
///
/// * `enc1_out.png` .. `dec4_out.png`: one tile per channel of the first batch element.
/// * `encoder1.png` .. `decoder4.png`: one tile per filter, first input channel only.
///
/// Values are clamped to `[0, 1]` before quantisation, nothing is rescaled.
#[derive(Clone, Debug)]
pub struct DiagnosticWriter {
    dir: PathBuf,
}

impl DiagnosticWriter {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self, ModelError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|source| ModelError::Io {
            path: dir.clone(),
            source,
        })?;

        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.png"))
    }

    fn write_tiles<B: Backend>(&self, name: &str, tiles: Tensor<B, 3>) -> Result<(), ModelError> {
        let dims = tiles.dims();
        let values = tiles
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| ModelError::TensorData(format!("{e:?}")))?;

        let path = self.path_for(name);
        tile_grid(&values, dims)
            .save_with_format(&path, ImageFormat::Png)
            .map_err(|source| ModelError::Diagnostic {
                path: path.clone(),
                source,
            })?;

        tracing::debug!(path = %path.display(), tiles = dims[0], "Wrote diagnostic image");
        Ok(())
    }
}

impl<B: Backend> StageObserver<B> for DiagnosticWriter {
    fn on_activation(&mut self, stage: Stage, features: &Tensor<B, 4>) -> Result<(), ModelError> {
        let first = features.clone().slice([0..1]).squeeze::<3>(0);
        self.write_tiles(stage.activation_name(), first)
    }

    fn on_kernel(&mut self, stage: Stage, weight: &Tensor<B, 4>) -> Result<(), ModelError> {
        let [filters, _, kh, kw] = weight.dims();
        let first_input = weight
            .clone()
            .slice([0..filters, 0..1])
            .reshape([filters, kh, kw]);
        self.write_tiles(stage.kernel_name(), first_input)
    }
}

/// Lays `n` single-channel `h x w` tiles (row-major in `values`) out on a padded grid.
///
/// A single tile is written as is, without a border.
fn tile_grid(values: &[f32], [n, h, w]: [usize; 3]) -> GrayImage {
    let padding = if n == 1 { 0 } else { GRID_PADDING };
    let columns = n.clamp(1, GRID_COLUMNS);
    let rows = n.div_ceil(columns).max(1);
    let cell_h = h + padding;
    let cell_w = w + padding;

    let mut grid = GrayImage::new(
        (columns * cell_w + padding) as u32,
        (rows * cell_h + padding) as u32,
    );

    for tile in 0..n {
        let top = (tile / columns) * cell_h + padding;
        let left = (tile % columns) * cell_w + padding;
        let offset = tile * h * w;

        for y in 0..h {
            for x in 0..w {
                let v = values[offset + y * w + x];
                let level = (v * 255.0 + 0.5).clamp(0.0, 255.0) as u8;
                grid.put_pixel((left + x) as u32, (top + y) as u32, Luma([level]));
            }
        }
    }

    grid
}

use burn::prelude::*;
use image::{DynamicImage, imageops::FilterType};

use super::DatasetError;

#[derive(Config, Debug)]
pub enum InputMode {
    Grayscale,
    RGB,
}

impl InputMode {
    pub fn channels(&self) -> usize {
        match self {
            InputMode::Grayscale => 1,
            InputMode::RGB => 3,
        }
    }
}

/// Turns a decoded image into a `[channels, height, width]` float tensor.
pub trait ImageTransform: Send + Sync {
    fn apply(&self, image: DynamicImage) -> Result<TensorData, DatasetError>;
}

impl<F> ImageTransform for F
where
    F: Fn(DynamicImage) -> Result<TensorData, DatasetError> + Send + Sync,
{
    fn apply(&self, image: DynamicImage) -> Result<TensorData, DatasetError> {
        self(image)
    }
}

/// Bilinear resize to a fixed size, then scale pixel values to `[0, 1]`.
///
/// 8-bit samples are divided by 255, 16-bit samples by 65535 and float samples are
/// kept as decoded. Without a `mode` the decoded channel count is preserved, so an
/// RGBA PNG yields four channels and a grayscale mask yields one.
#[derive(Config, Debug)]
pub struct ResizeToTensor {
    /// Target `[height, width]`.
    #[config(default = "[256, 256]")]
    pub size: [usize; 2],
    /// Force a channel count instead of keeping the decoded one.
    pub mode: Option<InputMode>,
}

impl Default for ResizeToTensor {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageTransform for ResizeToTensor {
    fn apply(&self, image: DynamicImage) -> Result<TensorData, DatasetError> {
        let [height, width] = self.size;
        if height == 0 || width == 0 {
            return Err(DatasetError::Transform(format!(
                "Cannot resize to {height}x{width}"
            )));
        }

        let image = image.resize_exact(width as u32, height as u32, FilterType::Triangle);
        let image = match self.mode {
            Some(InputMode::Grayscale) => DynamicImage::ImageLuma16(image.to_luma16()),
            Some(InputMode::RGB) => DynamicImage::ImageRgb32F(image.to_rgb32f()),
            None => image,
        };

        let (channels, interleaved) = normalized_samples(&image);

        let mut planar = Vec::with_capacity(interleaved.len());
        for c in 0..channels {
            for y in 0..height {
                for x in 0..width {
                    planar.push(interleaved[(y * width + x) * channels + c]);
                }
            }
        }

        Ok(TensorData::new(planar, [channels, height, width]))
    }
}

/// Channel count and interleaved samples scaled to `[0, 1]`.
fn normalized_samples(image: &DynamicImage) -> (usize, Vec<f32>) {
    fn u8s(raw: &[u8]) -> Vec<f32> {
        raw.iter().map(|&v| v as f32 / 255.0).collect()
    }
    fn u16s(raw: &[u16]) -> Vec<f32> {
        raw.iter().map(|&v| v as f32 / 65535.0).collect()
    }

    match image {
        DynamicImage::ImageLuma8(buf) => (1, u8s(buf.as_raw())),
        DynamicImage::ImageLumaA8(buf) => (2, u8s(buf.as_raw())),
        DynamicImage::ImageRgb8(buf) => (3, u8s(buf.as_raw())),
        DynamicImage::ImageRgba8(buf) => (4, u8s(buf.as_raw())),
        DynamicImage::ImageLuma16(buf) => (1, u16s(buf.as_raw())),
        DynamicImage::ImageLumaA16(buf) => (2, u16s(buf.as_raw())),
        DynamicImage::ImageRgb16(buf) => (3, u16s(buf.as_raw())),
        DynamicImage::ImageRgba16(buf) => (4, u16s(buf.as_raw())),
        DynamicImage::ImageRgb32F(buf) => (3, buf.as_raw().clone()),
        DynamicImage::ImageRgba32F(buf) => (4, buf.as_raw().clone()),
        other => (4, other.to_rgba32f().into_raw()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage, Rgba, RgbaImage};

    fn values(data: &TensorData) -> Vec<f32> {
        data.clone().convert::<f32>().to_vec::<f32>().unwrap()
    }

    #[test]
    fn default_resizes_to_256_and_keeps_channels() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 30, Rgb([255, 0, 51])));

        let data = ResizeToTensor::default().apply(image).unwrap();

        assert_eq!(data.shape, vec![3, 256, 256]);
        let values = values(&data);
        let plane = 256 * 256;
        assert!((values[0] - 1.0).abs() < 1e-6);
        assert!(values[plane].abs() < 1e-6);
        assert!((values[2 * plane] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn grayscale_mask_stays_single_channel() {
        let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(64, 64, Luma([255])));

        let data = ResizeToTensor::new()
            .with_size([32, 16])
            .apply(image)
            .unwrap();

        assert_eq!(data.shape, vec![1, 32, 16]);
        assert!(values(&data).iter().all(|v| (*v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn mode_forces_channel_count() {
        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([10, 20, 30, 255])));
        let gray = DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 8, Luma([128])));

        let to_gray = ResizeToTensor::new()
            .with_size([8, 8])
            .with_mode(Some(InputMode::Grayscale));
        let to_rgb = ResizeToTensor::new()
            .with_size([8, 8])
            .with_mode(Some(InputMode::RGB));

        assert_eq!(to_gray.apply(rgba).unwrap().shape, vec![1, 8, 8]);
        let rgb = to_rgb.apply(gray).unwrap();
        assert_eq!(rgb.shape, vec![InputMode::RGB.channels(), 8, 8]);
        assert!(values(&rgb).iter().all(|v| (*v - 128.0 / 255.0).abs() < 1e-5));
    }

    #[test]
    fn sixteen_bit_samples_are_normalized() {
        let image = DynamicImage::ImageLuma16(image::ImageBuffer::from_pixel(4, 4, Luma([65535u16])));

        let data = ResizeToTensor::new().with_size([4, 4]).apply(image).unwrap();

        assert!(values(&data).iter().all(|v| (*v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn layout_is_channel_major() {
        let mut image = RgbImage::new(2, 1);
        image.put_pixel(0, 0, Rgb([255, 0, 0]));
        image.put_pixel(1, 0, Rgb([0, 255, 0]));

        let data = ResizeToTensor::new()
            .with_size([1, 2])
            .apply(DynamicImage::ImageRgb8(image))
            .unwrap();

        assert_eq!(values(&data), vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn rejects_empty_target() {
        let image = DynamicImage::ImageLuma8(GrayImage::new(4, 4));

        let err = ResizeToTensor::new().with_size([0, 4]).apply(image);

        assert!(matches!(err, Err(DatasetError::Transform(_))));
    }

    #[test]
    fn closures_are_transforms() {
        let transform = |image: DynamicImage| -> Result<TensorData, DatasetError> {
            Ok(TensorData::new(vec![image.width() as f32], [1, 1, 1]))
        };

        let data = transform.apply(DynamicImage::ImageLuma8(GrayImage::new(7, 3))).unwrap();

        assert_eq!(values(&data), vec![7.0]);
    }
}

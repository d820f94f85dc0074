//! Grayscale image loading and preview writing.

use std::path::Path;

use anyhow::{Context, Result};
use image::{DynamicImage, GrayImage};
use imgref::{ImgRef, ImgVec};
use tracing::debug;
use vst_eval::Plane;

/// A grayscale plane with the sample depth it was stored in.
pub struct Loaded {
    pub plane: Plane,
    /// Largest representable sample value.
    pub peak: f64,
    /// Bytes per sample of the stored file.
    pub bytes_per_sample: usize,
}

/// Load any image as a single luminance plane.
///
/// Sources deeper than 8 bits per channel are read as 16-bit.
pub fn load_plane(path: &Path) -> Result<Loaded> {
    let img = image::open(path).with_context(|| format!("Failed to read image {}", path.display()))?;
    let loaded = from_dynamic(&img);
    debug!(
        path = %path.display(),
        width = loaded.plane.width(),
        height = loaded.plane.height(),
        peak = loaded.peak,
        "loaded image"
    );
    Ok(loaded)
}

fn from_dynamic(img: &DynamicImage) -> Loaded {
    let color = img.color();
    let deep = color.bytes_per_pixel() / color.channel_count() > 1;
    let (width, height) = (img.width() as usize, img.height() as usize);

    if deep {
        let pixels = img.to_luma16().into_raw().into_iter().map(f64::from).collect();
        Loaded {
            plane: ImgVec::new(pixels, width, height),
            peak: f64::from(u16::MAX),
            bytes_per_sample: 2,
        }
    } else {
        let pixels = img.to_luma8().into_raw().into_iter().map(f64::from).collect();
        Loaded {
            plane: ImgVec::new(pixels, width, height),
            peak: f64::from(u8::MAX),
            bytes_per_sample: 1,
        }
    }
}

/// Write `img` as an 8-bit PNG, mapping `[0, peak]` onto `[0, 255]`.
pub fn save_preview(img: ImgRef<'_, f64>, peak: f64, path: &Path) -> Result<()> {
    let scale = 255.0 / peak;
    let pixels: Vec<u8> = img
        .pixels()
        .map(|v| (v * scale).round().clamp(0.0, 255.0) as u8)
        .collect();
    let gray = GrayImage::from_raw(img.width() as u32, img.height() as u32, pixels)
        .context("preview buffer does not match image dimensions")?;
    gray.save(path)
        .with_context(|| format!("Failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma};

    #[test]
    fn test_from_dynamic_8bit() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_raw(2, 1, vec![0, 200]).unwrap());
        let loaded = from_dynamic(&img);
        assert_eq!(loaded.peak, 255.0);
        assert_eq!(loaded.bytes_per_sample, 1);
        assert_eq!(loaded.plane.buf(), &[0.0, 200.0]);
    }

    #[test]
    fn test_from_dynamic_16bit() {
        let buf: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::from_raw(1, 2, vec![1000, 60000]).unwrap();
        let loaded = from_dynamic(&DynamicImage::ImageLuma16(buf));
        assert_eq!(loaded.peak, 65535.0);
        assert_eq!(loaded.bytes_per_sample, 2);
        assert_eq!(loaded.plane.height(), 2);
        assert_eq!(loaded.plane.buf(), &[1000.0, 60000.0]);
    }

    #[test]
    fn test_preview_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preview.png");
        let plane = ImgVec::new(vec![0.0, 127.6, 300.0, -4.0], 2, 2);
        save_preview(plane.as_ref(), 255.0, &path).unwrap();

        let loaded = load_plane(&path).unwrap();
        assert_eq!(loaded.plane.buf(), &[0.0, 128.0, 255.0, 0.0]);
    }
}

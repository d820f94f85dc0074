//! Codec adapter contract.
//!
//! The sweep only needs three things from a lossy codec: compress a plane at a
//! quantization level, decompress the result, and report the bitstream size.
//! Any bitstream format lives behind [`CodecAdapter`].

#[cfg(feature = "external-codec")]
pub mod command;

use imgref::{ImgRef, ImgVec};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::plane::{self, Plane};

#[cfg(feature = "external-codec")]
pub use command::{CommandTemplate, ExternalCommandCodec};

/// Compressed payload plus the metadata needed to decode it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bitstream {
    /// Encoded bytes as produced by the codec.
    pub bytes: Vec<u8>,
    /// Width of the encoded plane.
    pub width: usize,
    /// Height of the encoded plane.
    pub height: usize,
    /// Float range mapped onto 8-bit samples before encoding, if any.
    ///
    /// Side information; not part of [`CodecAdapter::size_bytes`].
    pub range: Option<SampleRange>,
}

impl Bitstream {
    /// Bitstream without range side information.
    #[must_use]
    pub fn new(bytes: Vec<u8>, width: usize, height: usize) -> Self {
        Self {
            bytes,
            width,
            height,
            range: None,
        }
    }
}

/// A lossy image codec driven by a quantization parameter.
///
/// Implementations must tolerate concurrent calls from several threads.
pub trait CodecAdapter: Send + Sync {
    /// Stable identifier used in reports and errors.
    fn id(&self) -> &str;

    /// Compress `image` at quantization level `q`.
    fn compress(&self, image: ImgRef<'_, f64>, q: u32) -> Result<Bitstream>;

    /// Decompress a bitstream produced by [`compress`](Self::compress).
    fn decompress(&self, bitstream: &Bitstream) -> Result<Plane>;

    /// Size charged to the rate axis.
    fn size_bytes(&self, bitstream: &Bitstream) -> usize {
        bitstream.bytes.len()
    }
}

/// Linear mapping between a float plane's `[min, max]` and `[0, 255]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleRange {
    /// Smallest sample of the fitted plane.
    pub min: f64,
    /// Largest sample of the fitted plane.
    pub max: f64,
}

impl SampleRange {
    /// Fit the range of `img`.
    pub fn fit(img: ImgRef<'_, f64>) -> Result<Self> {
        plane::ensure_finite(img, "codec input")?;
        let (min, max) = plane::min_max(img).ok_or(Error::EmptyInput("codec input"))?;
        Ok(Self { min, max })
    }

    /// Map samples to 8 bits by truncation. A constant plane maps to zeros.
    #[must_use]
    pub fn quantize(&self, img: ImgRef<'_, f64>) -> ImgVec<u8> {
        let span = self.max - self.min;
        let pixels: Vec<u8> = img
            .pixels()
            .map(|v| {
                if span > 0.0 {
                    ((v - self.min) / span * 255.0).clamp(0.0, 255.0) as u8
                } else {
                    0
                }
            })
            .collect();
        ImgVec::new(pixels, img.width(), img.height())
    }

    /// Map 8-bit samples back into `[min, max]`.
    #[must_use]
    pub fn dequantize(&self, img: ImgRef<'_, u8>) -> Plane {
        let span = self.max - self.min;
        let pixels: Vec<f64> = img
            .pixels()
            .map(|v| self.min + f64::from(v) / 255.0 * span)
            .collect();
        ImgVec::new(pixels, img.width(), img.height())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plane::linear_ramp;

    struct Identity;

    impl CodecAdapter for Identity {
        fn id(&self) -> &str {
            "identity"
        }

        fn compress(&self, image: ImgRef<'_, f64>, _q: u32) -> Result<Bitstream> {
            let bytes = image.pixels().flat_map(f64::to_le_bytes).collect();
            Ok(Bitstream::new(bytes, image.width(), image.height()))
        }

        fn decompress(&self, bitstream: &Bitstream) -> Result<Plane> {
            let pixels = bitstream
                .bytes
                .chunks_exact(8)
                .map(|c| f64::from_le_bytes(c.try_into().unwrap()))
                .collect();
            Ok(ImgVec::new(pixels, bitstream.width, bitstream.height))
        }
    }

    #[test]
    fn test_default_size_is_payload_length() {
        let img = linear_ramp(4, 2, 0.0, 1.0).unwrap();
        let bitstream = Identity.compress(img.as_ref(), 0).unwrap();
        assert_eq!(Identity.size_bytes(&bitstream), 64);
        assert_eq!(Identity.decompress(&bitstream).unwrap().buf(), img.buf());
    }

    #[test]
    fn test_sample_range_round_trip_error_bound() {
        let img = linear_ramp(37, 3, -20.0, 80.0).unwrap();
        let range = SampleRange::fit(img.as_ref()).unwrap();
        assert_eq!(range.min, -20.0);
        assert_eq!(range.max, 80.0);

        let quantized = range.quantize(img.as_ref());
        assert_eq!(quantized.buf()[0], 0);
        assert_eq!(quantized.buf()[36], 255);

        let restored = range.dequantize(quantized.as_ref());
        let step = 100.0 / 255.0;
        for (a, b) in img.pixels().zip(restored.pixels()) {
            assert!(b <= a + 1e-9 && a - b < step + 1e-9);
        }
    }

    #[test]
    fn test_constant_plane_quantizes_to_zero() {
        let flat = ImgVec::new(vec![42.0; 16], 4, 4);
        let range = SampleRange::fit(flat.as_ref()).unwrap();
        let quantized = range.quantize(flat.as_ref());
        assert!(quantized.pixels().all(|v| v == 0));
        assert!(range.dequantize(quantized.as_ref()).pixels().all(|v| v == 42.0));
    }

    #[test]
    fn test_fit_rejects_empty_and_nan() {
        let empty: Plane = ImgVec::new(Vec::new(), 4, 0);
        assert!(matches!(SampleRange::fit(empty.as_ref()), Err(Error::EmptyInput(_))));
        let bad = ImgVec::new(vec![1.0, f64::NAN], 2, 1);
        assert!(matches!(SampleRange::fit(bad.as_ref()), Err(Error::NonFiniteInput(_))));
    }
}

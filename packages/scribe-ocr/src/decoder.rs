//! Validation and normalization of encoded image bytes.
//!
//! Every backend receives the same packed, upright bitmap no matter which
//! container format the caller sent.

use std::io::Cursor;

use image::{DynamicImage, ImageDecoder, ImageError, ImageReader, Limits};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Default bound on each side of a decoded image.
pub const DEFAULT_MAX_DIMENSION: u32 = 16_384;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid image format: {0}")]
    InvalidFormat(String),
    #[error("unsupported color space: {0}")]
    UnsupportedColorSpace(String),
    #[error("image dimensions exceed limits: {0}")]
    DimensionsExceeded(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PixelFormat {
    Luma8,
    Rgb8,
    Rgba8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Luma8 => 1,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }
}

/// Upper bounds enforced while decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderLimits {
    pub max_width: u32,
    pub max_height: u32,
    /// Maximum bytes the decoder may allocate.
    pub max_alloc: u64,
}

impl Default for DecoderLimits {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_MAX_DIMENSION,
            max_height: DEFAULT_MAX_DIMENSION,
            max_alloc: 1 << 30,
        }
    }
}

impl DecoderLimits {
    fn to_image_limits(self) -> Limits {
        let mut limits = Limits::default();
        limits.max_image_width = Some(self.max_width);
        limits.max_image_height = Some(self.max_height);
        limits.max_alloc = Some(self.max_alloc);
        limits
    }
}

/// A validated bitmap, rows packed without padding.
#[derive(Clone, PartialEq, Eq)]
pub struct DecodedImage {
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
    pixels: Vec<u8>,
}

impl std::fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("pixel_format", &self.pixel_format)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

impl DecodedImage {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn bytes_per_row(&self) -> usize {
        self.width as usize * self.pixel_format.bytes_per_pixel()
    }

    /// Expands the bitmap to RGBA, the layout most backends consume.
    pub fn to_rgba8(&self) -> Vec<u8> {
        match self.pixel_format {
            PixelFormat::Rgba8 => self.pixels.clone(),
            PixelFormat::Rgb8 => self
                .pixels
                .chunks_exact(3)
                .flat_map(|px| [px[0], px[1], px[2], u8::MAX])
                .collect(),
            PixelFormat::Luma8 => self
                .pixels
                .iter()
                .flat_map(|&l| [l, l, l, u8::MAX])
                .collect(),
        }
    }
}

/// Decodes `bytes` with [`DecoderLimits::default`].
pub fn decode(bytes: &[u8]) -> Result<DecodedImage, DecodeError> {
    decode_with_limits(bytes, DecoderLimits::default())
}

pub fn decode_with_limits(bytes: &[u8], limits: DecoderLimits) -> Result<DecodedImage, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::InvalidFormat("empty input".into()));
    }

    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| DecodeError::InvalidFormat(e.to_string()))?;
    let format = reader
        .format()
        .ok_or_else(|| DecodeError::InvalidFormat("unrecognized image signature".into()))?;
    reader.limits(limits.to_image_limits());

    let mut decoder = reader.into_decoder().map_err(classify)?;
    let orientation = decoder.orientation().map_err(classify)?;
    let mut img = DynamicImage::from_decoder(decoder).map_err(classify)?;
    img.apply_orientation(orientation);

    let (width, height) = (img.width(), img.height());
    if width == 0 || height == 0 {
        return Err(DecodeError::InvalidFormat("image has no pixels".into()));
    }

    let (pixel_format, pixels) = normalize(img)?;
    debug!(?format, width, height, ?pixel_format, "decoded image");

    Ok(DecodedImage {
        width,
        height,
        pixel_format,
        pixels,
    })
}

fn normalize(img: DynamicImage) -> Result<(PixelFormat, Vec<u8>), DecodeError> {
    let normalized = match img {
        DynamicImage::ImageLuma8(buf) => (PixelFormat::Luma8, buf.into_raw()),
        DynamicImage::ImageLuma16(_) => (PixelFormat::Luma8, img.to_luma8().into_raw()),
        DynamicImage::ImageRgb8(buf) => (PixelFormat::Rgb8, buf.into_raw()),
        DynamicImage::ImageRgb16(_) | DynamicImage::ImageRgb32F(_) => {
            (PixelFormat::Rgb8, img.to_rgb8().into_raw())
        }
        DynamicImage::ImageRgba8(buf) => (PixelFormat::Rgba8, buf.into_raw()),
        DynamicImage::ImageLumaA8(_)
        | DynamicImage::ImageLumaA16(_)
        | DynamicImage::ImageRgba16(_)
        | DynamicImage::ImageRgba32F(_) => (PixelFormat::Rgba8, img.to_rgba8().into_raw()),
        other => {
            return Err(DecodeError::UnsupportedColorSpace(format!(
                "{:?}",
                other.color()
            )))
        }
    };
    Ok(normalized)
}

fn classify(err: ImageError) -> DecodeError {
    match err {
        ImageError::Limits(e) => DecodeError::DimensionsExceeded(e.to_string()),
        ImageError::Unsupported(e) => DecodeError::UnsupportedColorSpace(e.to_string()),
        other => DecodeError::InvalidFormat(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageFormat, Luma, Rgb, RgbImage, Rgba, RgbaImage};

    fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, format).unwrap();
        out.into_inner()
    }

    #[test]
    fn empty_bytes_are_invalid() {
        assert!(matches!(decode(&[]), Err(DecodeError::InvalidFormat(_))));
    }

    #[test]
    fn garbage_is_invalid() {
        let result = decode(b"definitely not an image");
        assert!(matches!(result, Err(DecodeError::InvalidFormat(_))));
    }

    #[test]
    fn truncated_png_is_invalid() {
        let bytes = encode(
            DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([1, 2, 3]))),
            ImageFormat::Png,
        );
        let result = decode(&bytes[..bytes.len() / 2]);
        assert!(matches!(result, Err(DecodeError::InvalidFormat(_))));
    }

    #[test]
    fn png_rgb_keeps_layout() {
        let bytes = encode(
            DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 2, Rgb([10, 20, 30]))),
            ImageFormat::Png,
        );
        let img = decode(&bytes).unwrap();
        assert_eq!((img.width(), img.height()), (4, 2));
        assert_eq!(img.pixel_format(), PixelFormat::Rgb8);
        assert_eq!(img.pixels().len(), 4 * 2 * 3);
        assert_eq!(img.bytes_per_row(), 12);
        assert_eq!(&img.to_rgba8()[..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn grayscale_and_alpha_are_normalized() {
        let gray = encode(
            DynamicImage::ImageLuma8(GrayImage::from_pixel(3, 3, Luma([128]))),
            ImageFormat::Png,
        );
        assert_eq!(decode(&gray).unwrap().pixel_format(), PixelFormat::Luma8);

        let rgba = encode(
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(3, 3, Rgba([1, 2, 3, 4]))),
            ImageFormat::Png,
        );
        let img = decode(&rgba).unwrap();
        assert_eq!(img.pixel_format(), PixelFormat::Rgba8);
        assert_eq!(&img.pixels()[..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn decoding_is_deterministic() {
        let bytes = encode(
            DynamicImage::ImageRgb8(RgbImage::from_fn(16, 9, |x, y| {
                Rgb([x as u8 * 10, y as u8 * 20, 7])
            })),
            ImageFormat::Bmp,
        );
        assert_eq!(decode(&bytes).unwrap(), decode(&bytes).unwrap());
    }

    #[test]
    fn oversized_image_is_rejected() {
        let bytes = encode(
            DynamicImage::ImageLuma8(GrayImage::new(64, 8)),
            ImageFormat::Png,
        );
        let limits = DecoderLimits {
            max_width: 32,
            ..DecoderLimits::default()
        };
        assert!(matches!(
            decode_with_limits(&bytes, limits),
            Err(DecodeError::DimensionsExceeded(_))
        ));
    }
}

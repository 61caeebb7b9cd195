use async_trait::async_trait;

use crate::decoder::DecodedImage;
use crate::engine::{EngineError, RecognitionEngine, RecognitionOptions};
use crate::region::TextObservation;

use super::ffi;

/// Runs `VNRecognizeTextRequest` on a blocking thread.
pub struct AppleVisionEngine;

impl AppleVisionEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AppleVisionEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecognitionEngine for AppleVisionEngine {
    fn name(&self) -> &'static str {
        "apple-vision"
    }

    async fn recognize(
        &self,
        image: &DecodedImage,
        options: &RecognitionOptions,
    ) -> Result<Vec<TextObservation>, EngineError> {
        let (width, height) = (image.width(), image.height());
        let rgba = image.to_rgba8();
        let options = options.clone();
        tokio::task::spawn_blocking(move || ffi::recognize_rgba(&rgba, width, height, &options))
            .await
            .map_err(|e| EngineError::InternalFailure(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::decode;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_recognize_image_file() {
        let img_path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_sample.png");
        if !img_path.exists() {
            eprintln!("skipping test: test_sample.png not found");
            return;
        }
        let bytes = std::fs::read(&img_path).unwrap();
        let image = decode(&bytes).unwrap();
        let engine = AppleVisionEngine::new();
        let observations = engine
            .recognize(&image, &RecognitionOptions::default())
            .await
            .unwrap();
        for o in &observations {
            println!("  [{:.2}] {}", o.top_candidate().confidence, o.top_candidate().text);
        }
        assert!(!observations.is_empty(), "expected some text from image");
    }

    #[tokio::test]
    async fn test_blank_image_has_no_text() {
        use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
        let mut out = std::io::Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 64, Rgb([255, 255, 255])))
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        let image = decode(&out.into_inner()).unwrap();
        let observations = AppleVisionEngine::new()
            .recognize(&image, &RecognitionOptions::default())
            .await
            .unwrap();
        assert!(observations.is_empty());
    }
}

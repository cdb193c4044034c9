pub mod amg;
pub mod app;
pub mod batch;
pub mod config;
pub mod errors;
pub mod gui;
pub mod mocks;
pub mod model;
pub mod overlay;
pub mod traits;
pub mod walker;

use std::path::{Path, PathBuf};

use image::RgbImage;
use log::{error, info};

pub use amg::{GeneratorSettings, MaskRecord};
pub use app::SegmentationApp;
pub use batch::{BatchRun, BatchSummary, StepOutcome};
pub use config::{Config, ErrorPolicy, ModelType};
pub use errors::{Result, SamSegError};
pub use model::{SamModel, SamModelLoader};
pub use traits::*;
pub use walker::{has_image_extension, BatchWalker};

/// Blended result for one source image, ready for display.
#[derive(Debug, Clone)]
pub struct SegmentedFrame {
    pub path: PathBuf,
    pub image: RgbImage,
    pub mask_count: usize,
}

/// Read, segment and overlay one image.
pub struct ImageSegmenter<M: MaskGenerator> {
    model: M,
}

impl<M: MaskGenerator> ImageSegmenter<M> {
    pub const fn new(model: M) -> Self {
        Self { model }
    }

    /// `Ok(None)` when the file cannot be decoded; the failure is logged and the
    /// caller moves on. Errors from mask generation are returned.
    pub fn segment(&self, path: &Path) -> Result<Option<SegmentedFrame>> {
        let image = match read_image(path) {
            Ok(image) => image,
            Err(err) => {
                error!("Error: Could not read the image {}. ({err})", path.display());
                return Ok(None);
            }
        };

        let masks = self
            .model
            .generate(&image)
            .map_err(|e| SamSegError::ImageProcessing {
                path: path.display().to_string(),
                operation: "マスク生成".to_string(),
                source: Box::new(e),
            })?;
        info!("{}: {} masks", path.display(), masks.len());

        let image = overlay::overlay_masks(&image, &masks)?;
        Ok(Some(SegmentedFrame {
            path: path.to_path_buf(),
            image,
            mask_count: masks.len(),
        }))
    }
}

/// Decodes by content rather than by extension, so a JPEG saved as `.png`
/// still loads.
fn read_image(path: &Path) -> Result<RgbImage> {
    let wrap = |e: Box<dyn std::error::Error + Send + Sync>| SamSegError::ImageProcessing {
        path: path.display().to_string(),
        operation: "画像読み込み".to_string(),
        source: e,
    };
    let image = image::ImageReader::open(path)
        .map_err(|e| wrap(Box::new(e)))?
        .with_guessed_format()
        .map_err(|e| wrap(Box::new(e)))?
        .decode()
        .map_err(|e| wrap(Box::new(e)))?;
    Ok(image.into_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MockMaskGenerator;
    use image::Rgb;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_unreadable_image_is_skipped_without_inference() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("broken.png");
        fs::write(&path, b"not an image")?;

        let generator = MockMaskGenerator::left_half();
        let segmenter = ImageSegmenter::new(generator.clone());

        assert!(segmenter.segment(&path)?.is_none());
        assert_eq!(generator.call_count(), 0);
        Ok(())
    }

    #[test]
    fn test_segment_overlays_generated_masks() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("plain.png");
        RgbImage::from_pixel(8, 6, Rgb([40, 40, 40])).save(&path)?;

        let generator = MockMaskGenerator::left_half();
        let segmenter = ImageSegmenter::new(generator.clone());
        let frame = segmenter.segment(&path)?.expect("frame for a valid png");

        assert_eq!(generator.call_count(), 1);
        assert_eq!(frame.path, path);
        assert_eq!(frame.mask_count, 1);
        assert_eq!(frame.image.get_pixel(0, 0), &Rgb([40, 168, 40]));
        assert_eq!(frame.image.get_pixel(7, 5), &Rgb([40, 40, 40]));
        Ok(())
    }

    #[test]
    fn test_image_is_decoded_by_content_not_extension() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("photo.png");
        RgbImage::from_pixel(8, 6, Rgb([40, 40, 40]))
            .save_with_format(&path, image::ImageFormat::Jpeg)?;

        let generator = MockMaskGenerator::left_half();
        let segmenter = ImageSegmenter::new(generator.clone());
        let frame = segmenter.segment(&path)?.expect("jpeg bytes behind a .png name");

        assert_eq!(generator.call_count(), 1);
        assert_eq!(frame.image.dimensions(), (8, 6));
        Ok(())
    }

    #[test]
    fn test_generation_failure_is_returned() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("plain.jpg");
        RgbImage::from_pixel(4, 4, Rgb([0, 0, 0])).save(&path)?;

        let segmenter = ImageSegmenter::new(MockMaskGenerator::failing());
        assert!(matches!(
            segmenter.segment(&path),
            Err(SamSegError::ImageProcessing { .. })
        ));
        Ok(())
    }
}

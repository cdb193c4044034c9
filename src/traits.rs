use std::path::PathBuf;

use image::RgbImage;

use crate::amg::{MaskRecord, PointPrediction};
use crate::errors::Result;

/// Produces the region masks of one image.
///
/// Implemented by the ONNX-backed SAM model and by the test mocks, so the batch
/// logic never depends on a concrete inference backend.
pub trait MaskGenerator: Send + Sync {
    /// Runs automatic mask generation once. Every returned segmentation has the
    /// image's dimensions.
    fn generate(&self, image: &RgbImage) -> Result<Vec<MaskRecord>>;
}

/// Decodes masks for single-point prompts against an already embedded image.
pub trait PointPredictor {
    /// `points` are in image coordinates, one prompt per point.
    fn predict_points(&self, points: &[[f32; 2]]) -> Result<PointPrediction>;
}

/// Source of the folder to process.
pub trait FolderPicker {
    /// `None` when the user cancels.
    fn pick_folder(&mut self) -> Option<PathBuf>;
}

/// Loads a fresh model handle for each folder-processing run.
pub trait ModelLoader {
    type Model: MaskGenerator;

    fn load(&self) -> Result<Self::Model>;
}

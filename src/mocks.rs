use std::path::PathBuf;
use std::sync::Arc;

use image::RgbImage;
use ndarray::Array2;
use parking_lot::Mutex;

use crate::amg::MaskRecord;
use crate::errors::{Result, SamSegError};
use crate::traits::{FolderPicker, MaskGenerator, ModelLoader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockMasks {
    /// No regions.
    Empty,
    /// One region covering the left half of the image.
    LeftHalf,
    /// Every call fails.
    Fail,
}

/// Mask generator for tests. Clones share the call log.
#[derive(Debug, Clone)]
pub struct MockMaskGenerator {
    masks: MockMasks,
    calls: Arc<Mutex<Vec<(u32, u32)>>>,
}

impl MockMaskGenerator {
    pub fn new(masks: MockMasks) -> Self {
        Self {
            masks,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn empty() -> Self {
        Self::new(MockMasks::Empty)
    }

    pub fn left_half() -> Self {
        Self::new(MockMasks::LeftHalf)
    }

    pub fn failing() -> Self {
        Self::new(MockMasks::Fail)
    }

    /// Dimensions of every image passed to `generate`, in call order.
    pub fn calls(&self) -> Vec<(u32, u32)> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl MaskGenerator for MockMaskGenerator {
    fn generate(&self, image: &RgbImage) -> Result<Vec<MaskRecord>> {
        let (width, height) = image.dimensions();
        self.calls.lock().push((width, height));

        match self.masks {
            MockMasks::Empty => Ok(Vec::new()),
            MockMasks::LeftHalf => {
                let half = width as usize / 2;
                let segmentation =
                    Array2::from_shape_fn((height as usize, width as usize), |(_, x)| x < half);
                Ok(vec![MaskRecord::new(segmentation, 0.95, [0.0, 0.0], 0.98)])
            }
            MockMasks::Fail => Err(SamSegError::model("mock inference", "mock failure")),
        }
    }
}

/// Returns a fixed answer and counts how often the dialog was opened.
#[derive(Debug, Clone, Default)]
pub struct MockFolderPicker {
    pub folder: Option<PathBuf>,
    pub picks: Arc<Mutex<usize>>,
}

impl MockFolderPicker {
    pub fn returning(folder: Option<PathBuf>) -> Self {
        Self {
            folder,
            picks: Arc::default(),
        }
    }
}

impl FolderPicker for MockFolderPicker {
    fn pick_folder(&mut self) -> Option<PathBuf> {
        *self.picks.lock() += 1;
        self.folder.clone()
    }
}

/// Hands out clones of one mock generator, or fails when asked to.
#[derive(Debug, Clone)]
pub struct MockModelLoader {
    pub generator: MockMaskGenerator,
    pub fail: bool,
    pub loads: Arc<Mutex<usize>>,
}

impl MockModelLoader {
    pub fn new(generator: MockMaskGenerator) -> Self {
        Self {
            generator,
            fail: false,
            loads: Arc::default(),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(MockMaskGenerator::empty())
        }
    }

    pub fn load_count(&self) -> usize {
        *self.loads.lock()
    }
}

impl ModelLoader for MockModelLoader {
    type Model = MockMaskGenerator;

    fn load(&self) -> Result<MockMaskGenerator> {
        *self.loads.lock() += 1;
        if self.fail {
            return Err(SamSegError::model(
                "mock model load",
                "checkpoint not found",
            ));
        }
        Ok(self.generator.clone())
    }
}

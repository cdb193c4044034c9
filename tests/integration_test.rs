use std::fs;

use image::{Rgb, RgbImage};
use tempfile::TempDir;

use sam_seg_viewer::{
    app::{COMPLETE_LABEL, INITIAL_LABEL},
    mocks::{MockFolderPicker, MockMaskGenerator, MockModelLoader},
    ErrorPolicy, MaskGenerator, MaskRecord, SegmentationApp,
};

// Model defined inside the integration test, outside the crate's own mocks.
struct CornerModel;

impl MaskGenerator for CornerModel {
    fn generate(&self, image: &RgbImage) -> sam_seg_viewer::Result<Vec<MaskRecord>> {
        let (w, h) = image.dimensions();
        let segmentation =
            ndarray::Array2::from_shape_fn((h as usize, w as usize), |(y, x)| x == 0 && y == 0);
        Ok(vec![MaskRecord::new(segmentation, 0.9, [0.5, 0.5], 0.96)])
    }
}

#[test]
fn test_full_session_through_the_controller() {
    let temp_dir = TempDir::new().unwrap();
    for name in ["first.png", "second.jpeg"] {
        RgbImage::from_pixel(5, 5, Rgb([0, 0, 0]))
            .save(temp_dir.path().join(name))
            .unwrap();
    }
    fs::write(temp_dir.path().join("notes.md"), b"# skip me").unwrap();

    let picker = MockFolderPicker::returning(Some(temp_dir.path().to_path_buf()));
    let generator = MockMaskGenerator::left_half();
    let loader = MockModelLoader::new(generator.clone());
    let mut app = SegmentationApp::new(picker, loader.clone(), ErrorPolicy::Skip);
    assert_eq!(app.label(), INITIAL_LABEL);

    app.select_folder();
    assert!(app.is_busy());

    let mut shown = 0;
    while app.advance().is_some() {
        shown += 1;
        assert_eq!(app.label(), INITIAL_LABEL);
        app.dismiss();
    }

    assert_eq!(shown, 2);
    assert_eq!(generator.call_count(), 2);
    assert_eq!(loader.load_count(), 1);
    assert_eq!(app.label(), COMPLETE_LABEL);
    assert_eq!(app.completed_runs(), 1);
    assert!(!app.is_busy());
}

#[test]
fn test_second_run_loads_a_fresh_model() {
    let temp_dir = TempDir::new().unwrap();
    RgbImage::new(3, 3)
        .save(temp_dir.path().join("x.png"))
        .unwrap();

    let picker = MockFolderPicker::returning(Some(temp_dir.path().to_path_buf()));
    let loader = MockModelLoader::new(MockMaskGenerator::empty());
    let mut app = SegmentationApp::new(picker, loader.clone(), ErrorPolicy::Skip);

    for _ in 0..2 {
        app.select_folder();
        while app.advance().is_some() {
            app.dismiss();
        }
    }

    assert_eq!(loader.load_count(), 2);
    assert_eq!(app.completed_runs(), 2);
}

#[test]
fn test_custom_generator_through_segmenter() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("corner.png");
    RgbImage::from_pixel(3, 3, Rgb([10, 10, 10]))
        .save(&path)
        .unwrap();

    let segmenter = sam_seg_viewer::ImageSegmenter::new(CornerModel);
    let frame = segmenter.segment(&path).unwrap().unwrap();

    assert_eq!(frame.image.get_pixel(0, 0), &Rgb([10, 138, 10]));
    assert_eq!(frame.image.get_pixel(1, 0), &Rgb([10, 10, 10]));
}

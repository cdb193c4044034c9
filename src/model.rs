use std::path::{Path, PathBuf};

use image::{imageops, imageops::FilterType, RgbImage};
use log::{debug, info};
use ndarray::prelude::*;
use nshare::AsNdarray3;
use ort::value::TensorRef;
use ort::{
    execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider},
    session::{builder::SessionBuilder, Session},
};
use parking_lot::Mutex;

use crate::{
    amg::{self, GeneratorSettings, MaskRecord, PointPrediction},
    config::Config,
    errors::{Result, SamSegError},
    traits::{MaskGenerator, ModelLoader, PointPredictor},
};

/// Side of the square encoder input.
pub const ENCODER_INPUT_SIZE: u32 = 1024;
/// Side of the low resolution mask prompt accepted by the decoder.
const MASK_INPUT_SIZE: usize = 256;

const PIXEL_MEAN: [f32; 3] = [123.675, 116.28, 103.53];
const PIXEL_STD: [f32; 3] = [58.395, 57.12, 57.375];

/// Segment Anything split into an image encoder and a prompt decoder session.
pub struct SamModel {
    encoder: Mutex<Session>,
    encoder_input: String,
    encoder_output: String,
    decoder: Mutex<Session>,
    /// Whether the decoder takes several prompts in one run (dynamic axis 0 of
    /// `point_coords`). The standard export fixes that axis to 1.
    batched_prompts: bool,
    settings: GeneratorSettings,
}

/// Encoder output for one image, reused by every prompt batch.
pub struct ImageEmbedding {
    embeddings: Array4<f32>,
    original_size: (u32, u32),
    resized_size: (u32, u32),
}

impl SamModel {
    pub fn new(
        encoder_path: &Path,
        decoder_path: &Path,
        device_id: i32,
        settings: GeneratorSettings,
    ) -> Result<Self> {
        let encoder = build_session(encoder_path, device_id, "エンコーダー")?;
        let decoder = build_session(decoder_path, device_id, "デコーダー")?;

        let encoder_input = encoder
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| SamSegError::model("エンコーダー入力名取得", "model has no inputs"))?;
        let encoder_output = encoder
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| SamSegError::model("エンコーダー出力名取得", "model has no outputs"))?;

        let batched_prompts = decoder
            .inputs
            .iter()
            .find(|input| input.name == "point_coords")
            .and_then(|input| input.input_type.tensor_shape())
            .is_some_and(|shape| shape.len() == 3 && shape[0] < 0);
        debug!("decoder accepts prompt batches: {batched_prompts}");

        Ok(Self {
            encoder: Mutex::new(encoder),
            encoder_input,
            encoder_output,
            decoder: Mutex::new(decoder),
            batched_prompts,
            settings,
        })
    }

    pub fn embed(&self, image: &RgbImage) -> Result<ImageEmbedding> {
        let (tensor, resized_size) = preprocess(image, ENCODER_INPUT_SIZE);

        let mut session = self.encoder.lock();
        let outputs = session.run(ort::inputs![
            self.encoder_input.as_str() => TensorRef::from_array_view(&tensor)?
        ])?;
        let embeddings = outputs[self.encoder_output.as_str()]
            .try_extract_array::<f32>()?
            .into_dimensionality::<Ix4>()?
            .to_owned();
        debug!("image embeddings: {:?}", embeddings.shape());

        Ok(ImageEmbedding {
            embeddings,
            original_size: image.dimensions(),
            resized_size,
        })
    }
}

impl MaskGenerator for SamModel {
    fn generate(&self, image: &RgbImage) -> Result<Vec<MaskRecord>> {
        let embedding = self.embed(image)?;
        let (width, height) = image.dimensions();
        let prompts = PromptContext {
            model: self,
            embedding: &embedding,
        };
        amg::generate_masks(&prompts, width, height, &self.settings)
    }
}

struct PromptContext<'a> {
    model: &'a SamModel,
    embedding: &'a ImageEmbedding,
}

impl PromptContext<'_> {
    fn decode(&self, prompts: &PromptTensors) -> Result<PointPrediction> {
        let mask_input = Array4::<f32>::zeros((1, 1, MASK_INPUT_SIZE, MASK_INPUT_SIZE));
        let has_mask_input = Array1::<f32>::zeros(1);

        let mut session = self.model.decoder.lock();
        let outputs = session.run(ort::inputs![
            "image_embeddings" => TensorRef::from_array_view(&self.embedding.embeddings)?,
            "point_coords" => TensorRef::from_array_view(&prompts.point_coords)?,
            "point_labels" => TensorRef::from_array_view(&prompts.point_labels)?,
            "mask_input" => TensorRef::from_array_view(&mask_input)?,
            "has_mask_input" => TensorRef::from_array_view(&has_mask_input)?,
            "orig_im_size" => TensorRef::from_array_view(&prompts.orig_im_size)?,
        ])?;

        let masks = outputs["masks"]
            .try_extract_array::<f32>()?
            .into_dimensionality::<Ix4>()?
            .to_owned();
        let iou_predictions = outputs["iou_predictions"]
            .try_extract_array::<f32>()?
            .into_dimensionality::<Ix2>()?
            .to_owned();

        Ok(PointPrediction {
            masks,
            iou_predictions,
        })
    }
}

impl PointPredictor for PromptContext<'_> {
    fn predict_points(&self, points: &[[f32; 2]]) -> Result<PointPrediction> {
        let original_size = self.embedding.original_size;
        let resized_size = self.embedding.resized_size;

        if self.model.batched_prompts {
            return self.decode(&prompt_tensors(points, original_size, resized_size));
        }

        let predictions = points
            .iter()
            .map(|point| {
                let prompts = prompt_tensors(std::slice::from_ref(point), original_size, resized_size);
                self.decode(&prompts)
            })
            .collect::<Result<Vec<_>>>()?;
        stack_predictions(&predictions)
    }
}

/// Decoder inputs describing one prompt per point.
#[derive(Debug, Clone)]
pub struct PromptTensors {
    /// `B x 2 x 2`: the point in the resized frame plus the padding point.
    pub point_coords: Array3<f32>,
    /// `B x 2`: `1` for the point, `-1` for the padding point.
    pub point_labels: Array2<f32>,
    /// `[H, W]` of the original image.
    pub orig_im_size: Array1<f32>,
}

/// Packs `points` (image coordinates) into decoder prompt tensors.
///
/// Each prompt is the point itself followed by the padding point `(0, 0)`
/// that stands in for a missing box.
pub fn prompt_tensors(
    points: &[[f32; 2]],
    original_size: (u32, u32),
    resized_size: (u32, u32),
) -> PromptTensors {
    let batch = points.len();
    let mut point_coords = Array3::<f32>::zeros((batch, 2, 2));
    let mut point_labels = Array2::<f32>::zeros((batch, 2));
    for (i, &point) in points.iter().enumerate() {
        let [x, y] = to_model_coords(point, original_size, resized_size);
        point_coords[[i, 0, 0]] = x;
        point_coords[[i, 0, 1]] = y;
        point_labels[[i, 0]] = 1.0;
        point_labels[[i, 1]] = -1.0;
    }

    let (width, height) = original_size;
    PromptTensors {
        point_coords,
        point_labels,
        orig_im_size: array![height as f32, width as f32],
    }
}

/// Joins per-prompt decoder outputs along the batch axis.
pub fn stack_predictions(predictions: &[PointPrediction]) -> Result<PointPrediction> {
    let masks: Vec<_> = predictions.iter().map(|p| p.masks.view()).collect();
    let iou_predictions: Vec<_> = predictions.iter().map(|p| p.iou_predictions.view()).collect();

    Ok(PointPrediction {
        masks: ndarray::concatenate(Axis(0), &masks)?,
        iou_predictions: ndarray::concatenate(Axis(0), &iou_predictions)?,
    })
}

fn build_session(model_path: &Path, device_id: i32, role: &str) -> Result<Session> {
    if !model_path.exists() {
        return Err(SamSegError::FileSystem {
            path: model_path.to_path_buf(),
            operation: format!("{role}モデル存在確認"),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "モデルファイルが存在しません",
            ),
        });
    }

    SessionBuilder::new()
        .map_err(|e| SamSegError::model("セッションビルダー初期化", e))?
        .with_execution_providers([
            TensorRTExecutionProvider::default()
                .with_device_id(device_id)
                .build(),
            CUDAExecutionProvider::default()
                .with_device_id(device_id)
                .build(),
        ])
        .map_err(|e| SamSegError::model("実行プロバイダー設定", e))?
        .with_memory_pattern(true)
        .map_err(|e| SamSegError::model("メモリパターン設定", e))?
        .commit_from_file(model_path)
        .map_err(|e| {
            SamSegError::model(
                format!("{role}モデルファイル読み込み: {}", model_path.display()),
                e,
            )
        })
}

/// Size of an image whose longest side is scaled to `target`.
pub fn resize_longest_side(width: u32, height: u32, target: u32) -> (u32, u32) {
    let scale = target as f64 / width.max(height) as f64;
    let scaled = |v: u32| ((v as f64 * scale + 0.5) as u32).max(1);
    (scaled(width), scaled(height))
}

/// Maps a point from original image coordinates into the resized encoder frame.
pub fn to_model_coords(
    [x, y]: [f32; 2],
    (width, height): (u32, u32),
    (new_width, new_height): (u32, u32),
) -> [f32; 2] {
    [
        x * new_width as f32 / width as f32,
        y * new_height as f32 / height as f32,
    ]
}

/// Resizes, normalizes and zero-pads an image into a `1 x 3 x size x size`
/// tensor. Also returns the size of the resized (unpadded) content.
pub fn preprocess(image: &RgbImage, size: u32) -> (Array4<f32>, (u32, u32)) {
    let (width, height) = image.dimensions();
    let (new_width, new_height) = resize_longest_side(width, height, size);
    let resized = imageops::resize(image, new_width, new_height, FilterType::Triangle);
    let pixels = resized.as_ndarray3();

    let side = size as usize;
    let (h, w) = (new_height as usize, new_width as usize);
    let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
    for c in 0..3 {
        let (mean, std) = (PIXEL_MEAN[c], PIXEL_STD[c]);
        tensor
            .slice_mut(s![0, c, ..h, ..w])
            .zip_mut_with(&pixels.index_axis(Axis(0), c), |dst, &v| {
                *dst = (v as f32 - mean) / std;
            });
    }

    (tensor, (new_width, new_height))
}

/// Builds a [`SamModel`] from the configured model files on every run.
#[derive(Debug, Clone)]
pub struct SamModelLoader {
    encoder_path: PathBuf,
    decoder_path: PathBuf,
    device_id: i32,
    settings: GeneratorSettings,
}

impl SamModelLoader {
    pub fn from_config(config: &Config) -> Self {
        Self {
            encoder_path: config.encoder_path(),
            decoder_path: config.decoder_path(),
            device_id: config.device_id,
            settings: config.generator_settings(),
        }
    }
}

impl ModelLoader for SamModelLoader {
    type Model = SamModel;

    fn load(&self) -> Result<SamModel> {
        info!(
            "Loading SAM encoder {} and decoder {}",
            self.encoder_path.display(),
            self.decoder_path.display()
        );
        SamModel::new(
            &self.encoder_path,
            &self.decoder_path,
            self.device_id,
            self.settings.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_resize_longest_side() {
        assert_eq!(resize_longest_side(2048, 1536, 1024), (1024, 768));
        assert_eq!(resize_longest_side(300, 600, 1024), (512, 1024));
        assert_eq!(resize_longest_side(1024, 1, 1024), (1024, 1));
    }

    #[test]
    fn test_to_model_coords_scales_each_axis() {
        let coords = to_model_coords([100.0, 50.0], (200, 100), (1024, 512));
        assert_eq!(coords, [512.0, 256.0]);
    }

    #[test]
    fn test_preprocess_normalizes_and_pads() {
        let image = RgbImage::from_pixel(8, 4, Rgb([123, 116, 103]));
        let (tensor, resized) = preprocess(&image, 16);

        assert_eq!(resized, (16, 8));
        assert_eq!(tensor.shape(), &[1, 3, 16, 16]);

        let expected = (123.0 - PIXEL_MEAN[0]) / PIXEL_STD[0];
        assert!((tensor[[0, 0, 0, 0]] - expected).abs() < 1e-4);
        assert!((tensor[[0, 0, 7, 15]] - expected).abs() < 1e-4);
        // padding rows stay zero
        assert_eq!(tensor[[0, 0, 8, 0]], 0.0);
        assert_eq!(tensor[[0, 2, 15, 15]], 0.0);
    }

    #[test]
    fn test_prompt_tensors_pack_point_and_padding() {
        let prompts = prompt_tensors(&[[100.0, 50.0], [10.0, 20.0]], (200, 100), (1024, 512));

        assert_eq!(prompts.point_coords.shape(), &[2, 2, 2]);
        assert_eq!(prompts.point_labels.shape(), &[2, 2]);
        assert_eq!(
            prompts.point_coords.slice(s![0, .., ..]),
            array![[512.0, 256.0], [0.0, 0.0]]
        );
        assert_eq!(
            prompts.point_coords.slice(s![1, .., ..]),
            array![[51.2, 102.4], [0.0, 0.0]]
        );
        assert_eq!(prompts.point_labels, array![[1.0, -1.0], [1.0, -1.0]]);
        // height first
        assert_eq!(prompts.orig_im_size, array![100.0, 200.0]);
    }

    #[test]
    fn test_single_prompt_layout() {
        let prompts = prompt_tensors(&[[30.0, 40.0]], (60, 80), (768, 1024));

        assert_eq!(prompts.point_coords.shape(), &[1, 2, 2]);
        assert_eq!(prompts.point_coords, array![[[384.0, 512.0], [0.0, 0.0]]]);
        assert_eq!(prompts.point_labels, array![[1.0, -1.0]]);
        assert_eq!(prompts.orig_im_size, array![80.0, 60.0]);
    }

    #[test]
    fn test_stack_predictions_joins_batch_axis() -> Result<()> {
        let single = |value: f32| PointPrediction {
            masks: Array4::from_elem((1, 3, 4, 5), value),
            iou_predictions: Array2::from_elem((1, 3), value),
        };
        let stacked = stack_predictions(&[single(1.0), single(2.0)])?;

        assert_eq!(stacked.masks.shape(), &[2, 3, 4, 5]);
        assert_eq!(stacked.iou_predictions.shape(), &[2, 3]);
        assert_eq!(stacked.masks[[0, 2, 3, 4]], 1.0);
        assert_eq!(stacked.masks[[1, 0, 0, 0]], 2.0);
        assert_eq!(stacked.iou_predictions[[1, 2]], 2.0);
        Ok(())
    }

    #[test]
    fn test_loader_reports_missing_model_files() {
        let config = Config {
            encoder_path: Some(PathBuf::from("/nonexistent/encoder.onnx")),
            ..Config::default()
        };
        let result = SamModelLoader::from_config(&config).load();
        assert!(matches!(result, Err(SamSegError::FileSystem { .. })));
    }
}

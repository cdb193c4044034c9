use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::amg::GeneratorSettings;
use crate::errors::{Result, SamSegError};

/// SAM backbone variant. Only used to derive the default model file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModelType {
    VitH,
    VitL,
    VitB,
}

impl ModelType {
    pub const fn file_stem(self) -> &'static str {
        match self {
            ModelType::VitH => "sam_vit_h",
            ModelType::VitL => "sam_vit_l",
            ModelType::VitB => "sam_vit_b",
        }
    }
}

/// What a failed mask generation does to the rest of the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ErrorPolicy {
    /// Log the failure and move on to the next file.
    Skip,
    /// Stop the batch and report the failure in the window.
    Abort,
}

#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[arg(long, value_enum, default_value_t = ModelType::VitH)]
    pub model_type: ModelType,

    /// Image encoder ONNX file (defaults to models/<model type>_encoder.onnx)
    #[arg(long)]
    pub encoder_path: Option<PathBuf>,

    /// Prompt decoder ONNX file (defaults to models/<model type>_decoder.onnx)
    #[arg(long)]
    pub decoder_path: Option<PathBuf>,

    #[arg(short, long, default_value_t = 0)]
    pub device_id: i32,

    #[arg(long, default_value_t = 32)]
    pub points_per_side: u32,

    #[arg(long, default_value_t = 64)]
    pub points_per_batch: usize,

    #[arg(long, default_value_t = 0.88)]
    pub pred_iou_thresh: f32,

    #[arg(long, default_value_t = 0.95)]
    pub stability_score_thresh: f32,

    #[arg(long, default_value_t = 1.0)]
    pub stability_score_offset: f32,

    #[arg(long, default_value_t = 0.7)]
    pub box_nms_thresh: f32,

    #[arg(long, default_value_t = 0)]
    pub min_mask_region_area: u32,

    #[arg(long, value_enum, default_value_t = ErrorPolicy::Skip)]
    pub on_inference_error: ErrorPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_from(["sam-seg-viewer"])
    }
}

impl Config {
    pub fn encoder_path(&self) -> PathBuf {
        self.encoder_path.clone().unwrap_or_else(|| {
            PathBuf::from("models").join(format!("{}_encoder.onnx", self.model_type.file_stem()))
        })
    }

    pub fn decoder_path(&self) -> PathBuf {
        self.decoder_path.clone().unwrap_or_else(|| {
            PathBuf::from("models").join(format!("{}_decoder.onnx", self.model_type.file_stem()))
        })
    }

    pub fn generator_settings(&self) -> GeneratorSettings {
        GeneratorSettings {
            points_per_side: self.points_per_side,
            points_per_batch: self.points_per_batch,
            pred_iou_thresh: self.pred_iou_thresh,
            stability_score_thresh: self.stability_score_thresh,
            stability_score_offset: self.stability_score_offset,
            box_nms_thresh: self.box_nms_thresh,
            min_mask_region_area: self.min_mask_region_area,
            ..GeneratorSettings::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.points_per_side == 0 {
            return Err(SamSegError::validation("points_per_side", "must be at least 1"));
        }
        if self.points_per_batch == 0 {
            return Err(SamSegError::validation("points_per_batch", "must be at least 1"));
        }
        for (field, value) in [
            ("pred_iou_thresh", self.pred_iou_thresh),
            ("stability_score_thresh", self.stability_score_thresh),
            ("box_nms_thresh", self.box_nms_thresh),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(SamSegError::validation(field, "must be within [0, 1]"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_generator_defaults() {
        let config = Config::default();
        assert_eq!(config.model_type, ModelType::VitH);
        assert_eq!(config.on_inference_error, ErrorPolicy::Skip);
        assert_eq!(config.generator_settings(), GeneratorSettings::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_model_paths_follow_model_type() {
        let config = Config::parse_from(["sam-seg-viewer", "--model-type", "vit-b"]);
        assert_eq!(
            config.encoder_path(),
            PathBuf::from("models/sam_vit_b_encoder.onnx")
        );
        assert_eq!(
            config.decoder_path(),
            PathBuf::from("models/sam_vit_b_decoder.onnx")
        );

        let config = Config::parse_from([
            "sam-seg-viewer",
            "--encoder-path",
            "/tmp/enc.onnx",
            "--on-inference-error",
            "abort",
        ]);
        assert_eq!(config.encoder_path(), PathBuf::from("/tmp/enc.onnx"));
        assert_eq!(config.on_inference_error, ErrorPolicy::Abort);
    }

    #[test]
    fn test_validation_rejects_bad_settings() {
        let config = Config::parse_from(["sam-seg-viewer", "--points-per-side", "0"]);
        assert!(matches!(
            config.validate(),
            Err(SamSegError::Validation { .. })
        ));

        let config = Config::parse_from(["sam-seg-viewer", "--box-nms-thresh", "1.5"]);
        assert!(config.validate().is_err());
    }
}

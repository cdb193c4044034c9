//! Automatic mask generation on top of a point-promptable segmenter.
//!
//! A regular grid of single-point prompts is decoded in batches. Low quality
//! masks are discarded by predicted IoU and stability score, duplicates are
//! removed with box NMS, and small holes and islands can optionally be cleaned
//! up afterwards.

mod grid;
mod nms;
mod regions;
mod stability;

pub use grid::build_point_grid;
pub use nms::{box_iou, non_max_suppression};
pub use regions::{remove_small_regions, RegionMode};
pub use stability::{mask_to_box, stability_score};

use log::debug;
use ndarray::{s, Array2};
use rayon::prelude::*;

use crate::errors::{Result, SamSegError};
use crate::traits::PointPredictor;

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorSettings {
    /// Prompt points sampled along each image side.
    pub points_per_side: u32,
    /// Prompt points decoded per model call.
    pub points_per_batch: usize,
    /// Minimum predicted IoU; disabled when zero.
    pub pred_iou_thresh: f32,
    /// Minimum stability score; disabled when zero.
    pub stability_score_thresh: f32,
    pub stability_score_offset: f32,
    pub box_nms_thresh: f32,
    /// Holes and islands smaller than this are removed; disabled when zero.
    pub min_mask_region_area: u32,
    /// Logit cutoff used to binarize masks.
    pub mask_threshold: f32,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            points_per_side: 32,
            points_per_batch: 64,
            pred_iou_thresh: 0.88,
            stability_score_thresh: 0.95,
            stability_score_offset: 1.0,
            box_nms_thresh: 0.7,
            min_mask_region_area: 0,
            mask_threshold: 0.0,
        }
    }
}

/// One detected region.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskRecord {
    /// `height x width` boolean map.
    pub segmentation: Array2<bool>,
    pub area: usize,
    /// `[x, y, w, h]`
    pub bbox: [u32; 4],
    pub predicted_iou: f32,
    /// Prompt point that produced the mask, in image coordinates.
    pub point_coords: [f32; 2],
    pub stability_score: f32,
    /// `[x, y, w, h]` of the crop the mask was generated in.
    pub crop_box: [u32; 4],
}

impl MaskRecord {
    pub fn new(
        segmentation: Array2<bool>,
        predicted_iou: f32,
        point_coords: [f32; 2],
        stability_score: f32,
    ) -> Self {
        let (height, width) = segmentation.dim();
        let mut record = Self {
            segmentation,
            area: 0,
            bbox: [0; 4],
            predicted_iou,
            point_coords,
            stability_score,
            crop_box: [0, 0, width as u32, height as u32],
        };
        record.refresh_geometry();
        record
    }

    /// Box as `[x1, y1, x2, y2]`.
    pub fn xyxy(&self) -> [f32; 4] {
        let [x, y, w, h] = self.bbox;
        [x as f32, y as f32, (x + w) as f32, (y + h) as f32]
    }

    fn refresh_geometry(&mut self) {
        self.area = self.segmentation.iter().filter(|&&v| v).count();
        let [x1, y1, x2, y2] = mask_to_box(self.segmentation.view());
        self.bbox = [x1, y1, x2 - x1, y2 - y1];
    }
}

/// Decoder output for a batch of `B` prompt points.
#[derive(Debug, Clone)]
pub struct PointPrediction {
    /// Mask logits, `B x M x H x W`.
    pub masks: ndarray::Array4<f32>,
    /// Predicted IoU per mask, `B x M`.
    pub iou_predictions: Array2<f32>,
}

/// Runs the full grid-prompt pipeline for one image of `width x height`.
pub fn generate_masks<P: PointPredictor + ?Sized>(
    predictor: &P,
    width: u32,
    height: u32,
    settings: &GeneratorSettings,
) -> Result<Vec<MaskRecord>> {
    if settings.points_per_batch == 0 {
        return Err(SamSegError::validation(
            "points_per_batch",
            "must be at least 1",
        ));
    }

    let points = build_point_grid(settings.points_per_side, width, height);
    let mut candidates = Vec::new();
    for batch in points.chunks(settings.points_per_batch) {
        let prediction = predictor.predict_points(batch)?;
        candidates.extend(filter_batch(batch, &prediction, width, height, settings)?);
    }
    debug!(
        "{} of {} prompt masks passed the quality filters",
        candidates.len(),
        points.len()
    );

    let boxes: Vec<[f32; 4]> = candidates.iter().map(MaskRecord::xyxy).collect();
    let scores: Vec<f32> = candidates.iter().map(|c| c.predicted_iou).collect();
    let keep = non_max_suppression(&boxes, &scores, settings.box_nms_thresh);
    let mut records = take_indices(candidates, &keep);
    debug!("{} masks left after box NMS", records.len());

    if settings.min_mask_region_area > 0 {
        records = postprocess_small_regions(
            records,
            settings.min_mask_region_area,
            settings.box_nms_thresh,
        );
    }

    Ok(records)
}

fn filter_batch(
    points: &[[f32; 2]],
    prediction: &PointPrediction,
    width: u32,
    height: u32,
    settings: &GeneratorSettings,
) -> Result<Vec<MaskRecord>> {
    let (batch, mask_count, mask_h, mask_w) = prediction.masks.dim();
    if batch != points.len() || mask_h != height as usize || mask_w != width as usize {
        return Err(SamSegError::validation(
            "masks",
            format!(
                "has shape {:?}, expected [{}, _, {}, {}]",
                prediction.masks.shape(),
                points.len(),
                height,
                width
            ),
        ));
    }
    if prediction.iou_predictions.dim() != (batch, mask_count) {
        return Err(SamSegError::validation(
            "iou_predictions",
            format!(
                "has shape {:?}, expected [{}, {}]",
                prediction.iou_predictions.shape(),
                batch,
                mask_count
            ),
        ));
    }

    // The first output of a multimask decoder is the single-mask token.
    let first_mask = usize::from(mask_count == 4);
    let pairs: Vec<(usize, usize)> = (0..batch)
        .flat_map(|b| (first_mask..mask_count).map(move |m| (b, m)))
        .collect();

    let records: Vec<MaskRecord> = pairs
        .into_par_iter()
        .filter_map(|(b, m)| {
            let predicted_iou = prediction.iou_predictions[[b, m]];
            if settings.pred_iou_thresh > 0.0 && !(predicted_iou > settings.pred_iou_thresh) {
                return None;
            }

            let logits = prediction.masks.slice(s![b, m, .., ..]);
            let stability = stability_score(
                logits,
                settings.mask_threshold,
                settings.stability_score_offset,
            );
            if settings.stability_score_thresh > 0.0
                && !(stability >= settings.stability_score_thresh)
            {
                return None;
            }

            let segmentation = logits.mapv(|v| v > settings.mask_threshold);
            Some(MaskRecord::new(
                segmentation,
                predicted_iou,
                points[b],
                stability,
            ))
        })
        .collect();

    Ok(records)
}

/// Cleans holes and islands, then runs NMS again preferring masks that were
/// left untouched.
fn postprocess_small_regions(
    records: Vec<MaskRecord>,
    min_area: u32,
    nms_thresh: f32,
) -> Vec<MaskRecord> {
    let cleaned: Vec<(MaskRecord, Option<Array2<bool>>)> = records
        .into_par_iter()
        .map(|record| {
            let (mask, holes_changed) =
                remove_small_regions(&record.segmentation, min_area, RegionMode::Holes);
            let (mask, islands_changed) =
                remove_small_regions(&mask, min_area, RegionMode::Islands);
            let replacement = (holes_changed || islands_changed).then_some(mask);
            (record, replacement)
        })
        .collect();

    let boxes: Vec<[f32; 4]> = cleaned
        .iter()
        .map(|(record, replacement)| match replacement {
            Some(mask) => mask_to_box(mask.view()).map(|v| v as f32),
            None => record.xyxy(),
        })
        .collect();
    let scores: Vec<f32> = cleaned
        .iter()
        .map(|(_, replacement)| if replacement.is_none() { 1.0 } else { 0.0 })
        .collect();
    let keep = non_max_suppression(&boxes, &scores, nms_thresh);

    take_indices(cleaned, &keep)
        .into_iter()
        .map(|(mut record, replacement)| {
            if let Some(mask) = replacement {
                record.segmentation = mask;
                record.refresh_geometry();
            }
            record
        })
        .collect()
}

fn take_indices<T>(items: Vec<T>, indices: &[usize]) -> Vec<T> {
    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    indices.iter().filter_map(|&i| slots[i].take()).collect()
}

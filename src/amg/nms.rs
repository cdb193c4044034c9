/// IoU of two `[x1, y1, x2, y2]` boxes.
pub fn box_iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let area = |r: &[f32; 4]| (r[2] - r[0]).max(0.0) * (r[3] - r[1]).max(0.0);

    let inter_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let inter_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let intersection = inter_w * inter_h;
    let union = area(a) + area(b) - intersection;

    if union <= 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// Greedy non-maximum suppression.
///
/// Returns the indices of the surviving boxes ordered by descending score. A box
/// is dropped when its IoU with an already kept box exceeds `iou_threshold`.
pub fn non_max_suppression(boxes: &[[f32; 4]], scores: &[f32], iou_threshold: f32) -> Vec<usize> {
    debug_assert_eq!(boxes.len(), scores.len());

    let mut order: Vec<usize> = (0..boxes.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut keep: Vec<usize> = Vec::new();
    for candidate in order {
        if keep
            .iter()
            .all(|&kept| box_iou(&boxes[kept], &boxes[candidate]) <= iou_threshold)
        {
            keep.push(candidate);
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_iou() {
        let a = [0.0, 0.0, 10.0, 10.0];
        let b = [5.0, 0.0, 15.0, 10.0];
        assert!((box_iou(&a, &b) - 50.0 / 150.0).abs() < 1e-6);
        assert_eq!(box_iou(&a, &a), 1.0);
        assert_eq!(box_iou(&a, &[20.0, 20.0, 30.0, 30.0]), 0.0);
        assert_eq!(box_iou(&[0.0; 4], &[0.0; 4]), 0.0);
    }

    #[test]
    fn test_nms_keeps_best_of_overlapping() {
        let boxes = [
            [0.0, 0.0, 10.0, 10.0],
            [1.0, 0.0, 11.0, 10.0],
            [50.0, 50.0, 60.0, 60.0],
        ];
        let scores = [0.90, 0.95, 0.80];
        assert_eq!(non_max_suppression(&boxes, &scores, 0.7), vec![1, 2]);
    }

    #[test]
    fn test_nms_threshold_is_exclusive() {
        let boxes = [[0.0, 0.0, 10.0, 10.0], [5.0, 0.0, 15.0, 10.0]];
        let scores = [1.0, 0.5];
        let iou = box_iou(&boxes[0], &boxes[1]);
        assert_eq!(non_max_suppression(&boxes, &scores, iou), vec![0, 1]);
        assert_eq!(non_max_suppression(&boxes, &scores, iou - 0.01), vec![0]);
    }
}

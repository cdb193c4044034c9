use ndarray::ArrayView2;

/// IoU between the mask thresholded at `threshold + offset` and at
/// `threshold - offset`. A mask whose logits sit far from the threshold keeps
/// the same shape under both cuts and scores close to 1.
pub fn stability_score(logits: ArrayView2<f32>, threshold: f32, offset: f32) -> f32 {
    let high = threshold + offset;
    let low = threshold - offset;
    let (intersection, union) = logits.iter().fold((0usize, 0usize), |(i, u), &v| {
        (i + usize::from(v > high), u + usize::from(v > low))
    });

    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

/// Tight `[x1, y1, x2, y2]` box around the set pixels, with inclusive max
/// indices. An empty mask yields `[0, 0, 0, 0]`.
pub fn mask_to_box(mask: ArrayView2<bool>) -> [u32; 4] {
    let mut bounds: Option<[usize; 4]> = None;
    for ((y, x), _) in mask.indexed_iter().filter(|&(_, &set)| set) {
        bounds = Some(match bounds {
            None => [x, y, x, y],
            Some([x1, y1, x2, y2]) => [x1.min(x), y1.min(y), x2.max(x), y2.max(y)],
        });
    }

    bounds.map_or([0; 4], |b| b.map(|v| v as u32))
}

use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};
use ndarray::Array2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionMode {
    /// Fill background components smaller than the area threshold.
    Holes,
    /// Drop foreground components smaller than the area threshold.
    Islands,
}

/// Removes small disconnected regions or small holes from a mask.
///
/// Returns the cleaned mask and whether anything changed. In island mode, when
/// every island is below the threshold the largest one is kept.
pub fn remove_small_regions(
    mask: &Array2<bool>,
    area_thresh: u32,
    mode: RegionMode,
) -> (Array2<bool>, bool) {
    let (height, width) = mask.dim();
    let invert = mode == RegionMode::Holes;
    let working = GrayImage::from_fn(width as u32, height as u32, |x, y| {
        if mask[[y as usize, x as usize]] != invert {
            Luma([255])
        } else {
            Luma([0])
        }
    });

    let labels = connected_components(&working, Connectivity::Eight, Luma([0u8]));
    let label_count = labels.pixels().map(|p| p[0]).max().unwrap_or(0) as usize;

    // sizes[0] is the background and is never considered for removal
    let mut sizes = vec![0u32; label_count + 1];
    for pixel in labels.pixels() {
        sizes[pixel[0] as usize] += 1;
    }

    let small: Vec<usize> = (1..=label_count)
        .filter(|&label| sizes[label] < area_thresh)
        .collect();
    if small.is_empty() {
        return (mask.clone(), false);
    }

    let mut fill = vec![false; label_count + 1];
    match mode {
        RegionMode::Holes => {
            fill[0] = true;
            for &label in &small {
                fill[label] = true;
            }
        }
        RegionMode::Islands => {
            for label in 1..=label_count {
                fill[label] = !small.contains(&label);
            }
            if !fill.iter().any(|&f| f) {
                let largest = (1..=label_count)
                    .max_by_key(|&label| sizes[label])
                    .unwrap_or(1);
                fill[largest] = true;
            }
        }
    }

    let cleaned = Array2::from_shape_fn((height, width), |(y, x)| {
        fill[labels.get_pixel(x as u32, y as u32)[0] as usize]
    });
    (cleaned, true)
}

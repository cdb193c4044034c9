use image::{Rgb, RgbImage};
use imageproc::map::map_colors2;

use crate::amg::MaskRecord;
use crate::errors::{Result, SamSegError};

/// Color painted over every masked pixel.
pub const MASK_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
/// Weight of the overlay when blended over the original image.
pub const OVERLAY_WEIGHT: f32 = 0.5;

/// Paints the union of `masks` in `color` on a black canvas of the image size.
pub fn combine_masks(
    width: u32,
    height: u32,
    masks: &[MaskRecord],
    color: Rgb<u8>,
) -> Result<RgbImage> {
    let mut canvas = RgbImage::new(width, height);
    for (index, mask) in masks.iter().enumerate() {
        let (mask_h, mask_w) = mask.segmentation.dim();
        if (mask_w, mask_h) != (width as usize, height as usize) {
            return Err(SamSegError::validation(
                format!("masks[{index}]"),
                format!("is {mask_w}x{mask_h}, image is {width}x{height}"),
            ));
        }

        for ((y, x), _) in mask.segmentation.indexed_iter().filter(|&(_, &set)| set) {
            canvas.put_pixel(x as u32, y as u32, color);
        }
    }
    Ok(canvas)
}

/// `image * 1 + overlay * weight`, rounded half to even and saturated per
/// channel.
pub fn blend(image: &RgbImage, overlay: &RgbImage, weight: f32) -> Result<RgbImage> {
    if image.dimensions() != overlay.dimensions() {
        let (w, h) = overlay.dimensions();
        return Err(SamSegError::validation(
            "overlay",
            format!("is {w}x{h}, image is {}x{}", image.width(), image.height()),
        ));
    }

    Ok(map_colors2(image, overlay, |Rgb(src), Rgb(over)| {
        Rgb(std::array::from_fn(|c| {
            (src[c] as f32 + over[c] as f32 * weight)
                .round_ties_even()
                .clamp(0.0, 255.0) as u8
        }))
    }))
}

/// Builds the highlighted frame shown for one image.
pub fn overlay_masks(image: &RgbImage, masks: &[MaskRecord]) -> Result<RgbImage> {
    let (width, height) = image.dimensions();
    let combined = combine_masks(width, height, masks, MASK_COLOR)?;
    blend(image, &combined, OVERLAY_WEIGHT)
}

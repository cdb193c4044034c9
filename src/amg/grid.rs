/// Evenly spaced `n x n` prompt points in image coordinates.
///
/// Points sit at the centres of an `n x n` tiling of the unit square, so no
/// point ever lands on the border. Rows are emitted top to bottom with x varying
/// fastest.
pub fn build_point_grid(points_per_side: u32, width: u32, height: u32) -> Vec<[f32; 2]> {
    let n = points_per_side as usize;
    let side: Vec<f32> = (0..n)
        .map(|i| (i as f32 + 0.5) / points_per_side as f32)
        .collect();

    side.iter()
        .flat_map(|&y| side.iter().map(move |&x| [x, y]))
        .map(|[x, y]| [x * width as f32, y * height as f32])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_point_is_image_centre() {
        assert_eq!(build_point_grid(1, 100, 50), vec![[50.0, 25.0]]);
    }

    #[test]
    fn test_grid_order_is_row_major() {
        let grid = build_point_grid(2, 40, 80);
        assert_eq!(
            grid,
            vec![[10.0, 20.0], [30.0, 20.0], [10.0, 60.0], [30.0, 60.0]]
        );
    }

    #[test]
    fn test_grid_size_and_bounds() {
        let grid = build_point_grid(32, 640, 480);
        assert_eq!(grid.len(), 32 * 32);
        assert!(grid
            .iter()
            .all(|&[x, y]| x > 0.0 && x < 640.0 && y > 0.0 && y < 480.0));
    }
}

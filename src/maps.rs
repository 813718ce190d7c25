// maps.rs — host-side depth and normal maps returned by PatchMatch.

use crate::mat::Mat;

/// Per-pixel depth of the reference view, with the range it was estimated
/// in. Depths outside `[depth_min, depth_max]` mark pixels without a valid
/// estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthMap {
    mat: Mat<f32>,
    depth_min: f32,
    depth_max: f32,
}

impl DepthMap {
    /// # Panics
    /// Panics if `mat` has more than one slice.
    pub fn new(mat: Mat<f32>, depth_min: f32, depth_max: f32) -> Self {
        assert_eq!(mat.depth(), 1, "depth map must have a single slice");
        DepthMap { mat, depth_min, depth_max }
    }

    pub fn width(&self) -> usize {
        self.mat.width()
    }

    pub fn height(&self) -> usize {
        self.mat.height()
    }

    pub fn depth_min(&self) -> f32 {
        self.depth_min
    }

    pub fn depth_max(&self) -> f32 {
        self.depth_max
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.mat.get(row, col, 0)
    }

    /// Whether the depth at `(row, col)` lies inside the estimation range.
    pub fn is_valid(&self, row: usize, col: usize) -> bool {
        let d = self.get(row, col);
        d >= self.depth_min && d <= self.depth_max
    }

    pub fn as_mat(&self) -> &Mat<f32> {
        &self.mat
    }

    pub fn into_mat(self) -> Mat<f32> {
        self.mat
    }
}

/// Per-pixel unit normal of the reference view, slices x, y, z.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalMap {
    mat: Mat<f32>,
}

impl NormalMap {
    /// # Panics
    /// Panics unless `mat` has exactly three slices.
    pub fn new(mat: Mat<f32>) -> Self {
        assert_eq!(mat.depth(), 3, "normal map must have three slices");
        NormalMap { mat }
    }

    pub fn width(&self) -> usize {
        self.mat.width()
    }

    pub fn height(&self) -> usize {
        self.mat.height()
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> [f32; 3] {
        [
            self.mat.get(row, col, 0),
            self.mat.get(row, col, 1),
            self.mat.get(row, col, 2),
        ]
    }

    pub fn as_mat(&self) -> &Mat<f32> {
        &self.mat
    }

    pub fn into_mat(self) -> Mat<f32> {
        self.mat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_validity() {
        let m = Mat::from_vec(3, 1, 1, vec![0.5, 2.0, f32::NAN]);
        let depth = DepthMap::new(m, 1.0, 10.0);
        assert!(!depth.is_valid(0, 0));
        assert!(depth.is_valid(0, 1));
        assert!(!depth.is_valid(0, 2));
        assert_eq!(depth.get(0, 1), 2.0);
    }

    #[test]
    fn test_normal_components() {
        let m = Mat::from_vec(1, 1, 3, vec![0.0, 0.0, -1.0]);
        assert_eq!(NormalMap::new(m).get(0, 0), [0.0, 0.0, -1.0]);
    }

    #[test]
    #[should_panic(expected = "three slices")]
    fn test_normal_map_needs_three_slices() {
        NormalMap::new(Mat::new(2, 2, 1));
    }
}

// mat.rs — host-side dense matrix, the CPU counterpart of DeviceBuffer<T>.
//
// Layout matches the device side exactly: depth is the outermost dimension,
// then rows, then columns, with no padding anywhere.
//
//   index(row, col, slice) = (slice * height + row) * width + col
//
//   slice 0: row0 [ . . . . ]   slice 1: row0 [ . . . . ]
//            row1 [ . . . . ]            row1 [ . . . . ]
//
// Because the layouts agree, `DeviceBuffer::to_mat()` is a single tight-pitch
// copy and `Mat::as_slice()` can be handed straight to `copy_to_device`.
//
// The geometric transforms below (transpose, flip, rotate) are the reference
// implementations the GPU kernels are validated against element-for-element.

use std::fmt;

/// A dense `(width, height, depth)` matrix stored on the host.
#[derive(Clone, PartialEq)]
pub struct Mat<T> {
    data: Vec<T>,
    width: usize,
    height: usize,
    depth: usize,
}

impl<T: Copy + Default> Mat<T> {
    /// Create a matrix filled with `T::default()`.
    pub fn new(width: usize, height: usize, depth: usize) -> Self {
        Mat {
            data: vec![T::default(); width * height * depth],
            width,
            height,
            depth,
        }
    }

    /// Wrap an existing vector laid out as `(slice, row, col)`.
    ///
    /// # Panics
    /// Panics if `data.len() != width * height * depth`.
    pub fn from_vec(width: usize, height: usize, depth: usize, data: Vec<T>) -> Self {
        assert_eq!(
            data.len(),
            width * height * depth,
            "data length ({}) must equal width * height * depth ({})",
            data.len(),
            width * height * depth,
        );
        Mat { data, width, height, depth }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// `(width, height, depth)`.
    #[inline]
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.width, self.height, self.depth)
    }

    /// Value at `(row, col, slice)`.
    ///
    /// # Panics
    /// Panics if the position is out of bounds.
    #[inline]
    pub fn get(&self, row: usize, col: usize, slice: usize) -> T {
        self.data[self.index(row, col, slice)]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, slice: usize, value: T) {
        let idx = self.index(row, col, slice);
        self.data[idx] = value;
    }

    /// One depth plane, `height * width` elements in row-major order.
    pub fn slice(&self, slice: usize) -> &[T] {
        assert!(slice < self.depth, "slice {slice} out of bounds (depth {})", self.depth);
        let plane = self.width * self.height;
        &self.data[slice * plane..(slice + 1) * plane]
    }

    /// Set every element to `value`.
    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    // --- Reference transforms ---

    /// Swap rows and columns: `(row, col, d) → (col, row, d)`.
    pub fn transposed(&self) -> Mat<T> {
        let mut out = Mat::new(self.height, self.width, self.depth);
        for d in 0..self.depth {
            for r in 0..self.height {
                for c in 0..self.width {
                    out.set(c, r, d, self.get(r, c, d));
                }
            }
        }
        out
    }

    /// Mirror along the vertical axis: `(row, col, d) → (row, width-1-col, d)`.
    pub fn flipped_horizontal(&self) -> Mat<T> {
        let mut out = Mat::new(self.width, self.height, self.depth);
        for d in 0..self.depth {
            for r in 0..self.height {
                for c in 0..self.width {
                    out.set(r, self.width - 1 - c, d, self.get(r, c, d));
                }
            }
        }
        out
    }

    /// Rotate 90° counter-clockwise: `(row, col, d) → (width-1-col, row, d)`.
    ///
    /// The output is `height` wide and `width` tall. The top-right corner of
    /// the input becomes the top-left corner of the output.
    pub fn rotated(&self) -> Mat<T> {
        let mut out = Mat::new(self.height, self.width, self.depth);
        for d in 0..self.depth {
            for r in 0..self.height {
                for c in 0..self.width {
                    out.set(self.width - 1 - c, r, d, self.get(r, c, d));
                }
            }
        }
        out
    }

    #[inline]
    fn index(&self, row: usize, col: usize, slice: usize) -> usize {
        assert!(
            row < self.height && col < self.width && slice < self.depth,
            "position ({row},{col},{slice}) out of bounds for mat {}×{}×{}",
            self.width,
            self.height,
            self.depth,
        );
        (slice * self.height + row) * self.width + col
    }
}

impl<T: Copy + Default + fmt::Debug> fmt::Debug for Mat<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Mat<{}> {{ {}×{}×{} }}",
            std::any::type_name::<T>(),
            self.width,
            self.height,
            self.depth,
        )?;
        for d in 0..self.depth.min(4) {
            for r in 0..self.height.min(8) {
                write!(f, "  [{d}] row {r}: [")?;
                for c in 0..self.width.min(16) {
                    if c > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?}", self.get(r, c, d))?;
                }
                if self.width > 16 {
                    write!(f, ", ...")?;
                }
                writeln!(f, "]")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(width: usize, height: usize, depth: usize) -> Mat<i32> {
        Mat::from_vec(width, height, depth, (0..(width * height * depth) as i32).collect())
    }

    #[test]
    fn test_layout_depth_outermost() {
        let m = ramp(3, 2, 2);
        assert_eq!(m.get(0, 0, 0), 0);
        assert_eq!(m.get(0, 2, 0), 2);
        assert_eq!(m.get(1, 0, 0), 3);
        assert_eq!(m.get(0, 0, 1), 6);
        assert_eq!(m.get(1, 2, 1), 11);
        assert_eq!(m.slice(1), &[6, 7, 8, 9, 10, 11]);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_get_out_of_bounds() {
        let m: Mat<u8> = Mat::new(2, 2, 1);
        m.get(0, 2, 0);
    }

    #[test]
    #[should_panic(expected = "data length")]
    fn test_from_vec_wrong_length() {
        let _ = Mat::from_vec(2, 2, 2, vec![0u8; 7]);
    }

    #[test]
    fn test_rotate_small() {
        // a b c        c f
        // d e f   →    b e
        //              a d
        let m = Mat::from_vec(3, 2, 1, vec!['a', 'b', 'c', 'd', 'e', 'f']);
        let r = m.rotated();
        assert_eq!(r.shape(), (2, 3, 1));
        assert_eq!(r.as_slice(), &['c', 'f', 'b', 'e', 'a', 'd']);
    }

    #[test]
    fn test_transpose_small() {
        let m = Mat::from_vec(3, 2, 1, vec![1, 2, 3, 4, 5, 6]);
        let t = m.transposed();
        assert_eq!(t.shape(), (2, 3, 1));
        assert_eq!(t.as_slice(), &[1, 4, 2, 5, 3, 6]);
    }

    #[test]
    fn test_flip_small() {
        let m = Mat::from_vec(3, 2, 1, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(m.flipped_horizontal().as_slice(), &[3, 2, 1, 6, 5, 4]);
    }
}

// consistency.rs — sparse encoding of the per-pixel consistency mask.
//
// The mask is a (width, height, N) volume: slice d of pixel (row, col) is
// set when source image `src_image_idxs[d]` passed the consistency test for
// that pixel. Most pixels have few or no consistent images, so the mask is
// exported as a flat list of variable-length records:
//
//   col, row, count, id_0, ..., id_{count-1}
//
// one record per pixel with count > 0, pixels in row-major order (rows
// ascending, columns ascending), ids in slice order.
//
//   mask (2×1×3, src ids [5, 7, 9]):   pixel (0,0) = [1, 0, 1]
//                                      pixel (0,1) = [0, 0, 0]
//   encoded: [0, 0, 2, 5, 9]

use crate::error::{Error, Result};
use crate::mat::Mat;

/// Encode `mask` into the flat record list. Non-zero entries are set.
///
/// # Panics
/// Panics if `mask.depth() != src_image_idxs.len()`.
pub fn encode(mask: &Mat<u8>, src_image_idxs: &[i32]) -> Vec<i32> {
    assert_eq!(
        mask.depth(),
        src_image_idxs.len(),
        "mask depth must equal the number of source images"
    );

    let mut encoded = Vec::new();
    let mut pixel_idxs = Vec::with_capacity(mask.depth());
    for row in 0..mask.height() {
        for col in 0..mask.width() {
            pixel_idxs.clear();
            pixel_idxs.extend(
                src_image_idxs
                    .iter()
                    .enumerate()
                    .filter(|&(d, _)| mask.get(row, col, d) != 0)
                    .map(|(_, &idx)| idx),
            );
            if !pixel_idxs.is_empty() {
                encoded.push(col as i32);
                encoded.push(row as i32);
                encoded.push(pixel_idxs.len() as i32);
                encoded.extend_from_slice(&pixel_idxs);
            }
        }
    }
    encoded
}

/// One pixel's entry in an encoded list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsistencyRecord<'a> {
    pub col: i32,
    pub row: i32,
    pub image_idxs: &'a [i32],
}

/// Iterate the records of an encoded list.
pub fn decode(encoded: &[i32]) -> ConsistencyRecords<'_> {
    ConsistencyRecords { encoded, offset: 0 }
}

/// Iterator returned by [`decode`].
///
/// Yields `Err(MalformedConsistency)` once if the list ends inside a
/// record (or has a negative count), then stops.
pub struct ConsistencyRecords<'a> {
    encoded: &'a [i32],
    offset: usize,
}

impl<'a> Iterator for ConsistencyRecords<'a> {
    type Item = Result<ConsistencyRecord<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        let encoded = self.encoded;
        let rest = &encoded[self.offset..];
        if rest.is_empty() {
            return None;
        }
        let start = self.offset;
        // Stop after the first error.
        self.offset = encoded.len();

        let &[col, row, count, ref tail @ ..] = rest else {
            return Some(Err(Error::MalformedConsistency { offset: start }));
        };
        let count = match usize::try_from(count) {
            Ok(n) if n <= tail.len() => n,
            _ => return Some(Err(Error::MalformedConsistency { offset: start })),
        };

        self.offset = start + 3 + count;
        Some(Ok(ConsistencyRecord { col, row, image_idxs: &tail[..count] }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_pixel() {
        let mut mask = Mat::new(2, 1, 3);
        mask.set(0, 0, 0, 1);
        mask.set(0, 0, 2, 1);
        assert_eq!(encode(&mask, &[5, 7, 9]), vec![0, 0, 2, 5, 9]);
    }

    #[test]
    fn test_all_false_is_empty() {
        let mask: Mat<u8> = Mat::new(7, 5, 4);
        assert!(encode(&mask, &[1, 2, 3, 4]).is_empty());
    }

    #[test]
    fn test_any_nonzero_counts_as_set() {
        let mut mask = Mat::new(1, 1, 2);
        mask.set(0, 0, 1, 255);
        assert_eq!(encode(&mask, &[3, 4]), vec![0, 0, 1, 4]);
    }

    #[test]
    fn test_row_major_order() {
        // (row 1, col 0) must come after (row 0, col 1)
        let mut mask = Mat::new(2, 2, 1);
        mask.set(1, 0, 0, 1);
        mask.set(0, 1, 0, 1);
        assert_eq!(encode(&mask, &[8]), vec![1, 0, 1, 8, 0, 1, 1, 8]);
    }

    #[test]
    #[should_panic(expected = "mask depth")]
    fn test_depth_mismatch_panics() {
        let mask: Mat<u8> = Mat::new(1, 1, 2);
        encode(&mask, &[1]);
    }

    #[test]
    fn test_decode() {
        let records: Vec<_> = decode(&[0, 0, 2, 5, 9, 3, 1, 1, 7])
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(
            records,
            vec![
                ConsistencyRecord { col: 0, row: 0, image_idxs: &[5, 9] },
                ConsistencyRecord { col: 3, row: 1, image_idxs: &[7] },
            ]
        );
    }

    #[test]
    fn test_decode_truncated() {
        let mut it = decode(&[0, 0, 2, 5, 9, 3, 1, 2, 7]);
        assert!(it.next().unwrap().is_ok());
        assert!(matches!(
            it.next(),
            Some(Err(Error::MalformedConsistency { offset: 5 }))
        ));
        assert!(it.next().is_none());
    }

    #[test]
    fn test_decode_short_header() {
        let mut it = decode(&[4, 2]);
        assert!(matches!(it.next(), Some(Err(Error::MalformedConsistency { offset: 0 }))));
        assert!(it.next().is_none());
    }

    #[test]
    fn test_decode_negative_count() {
        assert!(decode(&[0, 0, -1]).next().unwrap().is_err());
    }
}

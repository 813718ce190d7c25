// tests/test_consistency.rs — Integration tests for the sparse consistency
// encoding.
//
// These run with `cargo test --test test_consistency`.

use mvs_gpu::consistency::{decode, encode, ConsistencyRecord};
use mvs_gpu::Mat;

#[test]
fn encode_reference_example() {
    // Pixel (row 0, col 0) consistent with slices 0 and 2, i.e. images 5
    // and 9; nothing else set.
    let mut mask: Mat<u8> = Mat::new(4, 3, 3);
    mask.set(0, 0, 0, 1);
    mask.set(0, 0, 2, 1);
    assert_eq!(encode(&mask, &[5, 7, 9]), vec![0, 0, 2, 5, 9]);
}

#[test]
fn encode_all_false_is_empty_for_any_shape() {
    for (w, h, d) in [(1, 1, 1), (3, 7, 2), (16, 4, 5)] {
        let mask: Mat<u8> = Mat::new(w, h, d);
        let ids: Vec<i32> = (0..d as i32).collect();
        assert!(encode(&mask, &ids).is_empty(), "{w}×{h}×{d}");
    }
}

#[test]
fn encode_then_decode_recovers_mask() {
    let (w, h) = (5, 4);
    let ids = [2, 4, 6, 8];
    let mut mask: Mat<u8> = Mat::new(w, h, ids.len());
    for r in 0..h {
        for c in 0..w {
            for d in 0..ids.len() {
                if (r * 7 + c * 3 + d) % 4 == 0 {
                    mask.set(r, c, d, 1);
                }
            }
        }
    }

    let encoded = encode(&mask, &ids);
    let mut rebuilt: Mat<u8> = Mat::new(w, h, ids.len());
    let mut last = None;
    for record in decode(&encoded) {
        let ConsistencyRecord { col, row, image_idxs } = record.unwrap();
        assert!(!image_idxs.is_empty());
        // row-major, strictly increasing
        let pos = (row, col);
        assert!(last.map_or(true, |prev| prev < pos));
        last = Some(pos);
        for id in image_idxs {
            let d = ids.iter().position(|x| x == id).unwrap();
            rebuilt.set(row as usize, col as usize, d, 1);
        }
    }
    assert_eq!(rebuilt, mask);
}

#[test]
fn decode_empty() {
    assert_eq!(decode(&[]).count(), 0);
}

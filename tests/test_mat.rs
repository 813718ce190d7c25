// tests/test_mat.rs — Integration tests for the host-side Mat<T> and its
// reference transforms.
//
// These run with `cargo test --test test_mat`. The GPU kernels are checked
// against these transforms, so their own properties are pinned down here
// without a device.

use mvs_gpu::Mat;

fn ramp(width: usize, height: usize, depth: usize) -> Mat<i32> {
    Mat::from_vec(width, height, depth, (0..(width * height * depth) as i32).collect())
}

// ===== Construction & access =====

#[test]
fn mat_new_is_default_filled() {
    let m: Mat<f32> = Mat::new(5, 4, 3);
    assert_eq!(m.shape(), (5, 4, 3));
    assert!(m.as_slice().iter().all(|&v| v == 0.0));
}

#[test]
fn mat_set_get_consistency() {
    let mut m: Mat<i16> = Mat::new(4, 3, 2);
    for d in 0..2 {
        for r in 0..3 {
            for c in 0..4 {
                m.set(r, c, d, (d * 100 + r * 10 + c) as i16);
            }
        }
    }
    for d in 0..2 {
        for r in 0..3 {
            for c in 0..4 {
                assert_eq!(m.get(r, c, d), (d * 100 + r * 10 + c) as i16, "at ({r},{c},{d})");
            }
        }
    }
}

#[test]
fn mat_fill() {
    let mut m: Mat<u8> = Mat::new(3, 3, 2);
    m.fill(7);
    assert!(m.as_slice().iter().all(|&v| v == 7));
}

// ===== Reference transforms =====

#[test]
fn transpose_twice_is_identity() {
    let m = ramp(5, 3, 2);
    let t = m.transposed();
    assert_eq!(t.shape(), (3, 5, 2));
    assert_eq!(t.transposed(), m);
}

#[test]
fn transpose_moves_elements() {
    let m = ramp(5, 3, 2);
    let t = m.transposed();
    for d in 0..2 {
        for r in 0..3 {
            for c in 0..5 {
                assert_eq!(t.get(c, r, d), m.get(r, c, d));
            }
        }
    }
}

#[test]
fn flip_twice_is_identity() {
    let m = ramp(4, 3, 3);
    let f = m.flipped_horizontal();
    assert_eq!(f.shape(), m.shape());
    assert_ne!(f, m);
    assert_eq!(f.flipped_horizontal(), m);
}

#[test]
fn rotate_four_times_is_identity() {
    let m = ramp(5, 2, 3);
    let r1 = m.rotated();
    assert_eq!(r1.shape(), (2, 5, 3));
    let r4 = r1.rotated().rotated().rotated();
    assert_eq!(r4, m);
}

#[test]
fn rotate_is_counter_clockwise() {
    // Top-right corner of the input ends up at the top-left of the output,
    // top-left corner ends up at the bottom-left.
    let m = ramp(4, 3, 1);
    let r = m.rotated();
    assert_eq!(r.get(0, 0, 0), m.get(0, 3, 0));
    assert_eq!(r.get(3, 0, 0), m.get(0, 0, 0));
    assert_eq!(r.get(3, 2, 0), m.get(2, 0, 0));
}

#[test]
fn rotate_twice_is_point_reflection() {
    let m = ramp(4, 3, 1);
    let r2 = m.rotated().rotated();
    assert_eq!(r2.shape(), m.shape());
    for r in 0..3 {
        for c in 0..4 {
            assert_eq!(r2.get(r, c, 0), m.get(2 - r, 3 - c, 0));
        }
    }
}

#[test]
fn single_element_transforms() {
    let m = Mat::from_vec(1, 1, 1, vec![42.5f64]);
    assert_eq!(m.transposed(), m);
    assert_eq!(m.flipped_horizontal(), m);
    assert_eq!(m.rotated(), m);
}

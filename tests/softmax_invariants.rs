//! Softmax invariants: rows sum to one for any finite input, and the
//! output is a proper distribution.

use ffnet::{Device, Softmax, Tensor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Allowed deviation of a row sum from one at f32 precision.
const ROW_SUM_TOLERANCE: f32 = 1e-5;

fn softmax_rows(device: &Device, cols: usize, rows: usize, data: &[f32]) -> Vec<f32> {
    let mut softmax = Softmax::new(device).unwrap();
    let x = Tensor::from_slice(device, cols, rows, data).unwrap();
    softmax.forward(&x).unwrap().download().unwrap()
}

fn assert_rows_normalized(p: &[f32], cols: usize) {
    for (r, row) in p.chunks_exact(cols).enumerate() {
        let sum: f32 = row.iter().sum();
        assert!(
            (sum - 1.0).abs() <= ROW_SUM_TOLERANCE,
            "row {} sums to {}",
            r,
            sum
        );
        assert!(row.iter().all(|v| v.is_finite() && *v >= 0.0), "row {}: {:?}", r, row);
    }
}

#[test]
fn test_random_rows_sum_to_one() {
    let device = Device::host();
    let mut rng = StdRng::seed_from_u64(31);
    let (cols, rows) = (10, 130);
    let data: Vec<f32> = (0..cols * rows).map(|_| rng.gen_range(-5.0..5.0)).collect();
    assert_rows_normalized(&softmax_rows(&device, cols, rows, &data), cols);
}

#[test]
fn test_large_magnitude_rows_stay_finite() {
    let device = Device::host();
    let data = [
        1000.0, -1000.0, 500.0, //
        -800.0, -801.0, -802.0, //
        88.0, 88.0, 88.0, //
        f32::MAX / 2.0, 0.0, -f32::MAX / 2.0,
    ];
    let p = softmax_rows(&device, 3, 4, &data);
    assert_rows_normalized(&p, 3);
    assert!((p[0] - 1.0).abs() < 1e-6);
    assert!((p[6] - 1.0 / 3.0).abs() < 1e-6);
}

#[test]
fn test_ordering_preserved() {
    let device = Device::host();
    let p = softmax_rows(&device, 4, 1, &[0.1, 3.0, -2.0, 1.0]);
    assert!(p[1] > p[3] && p[3] > p[0] && p[0] > p[2]);
}

#[test]
fn test_single_column_is_one() {
    let device = Device::host();
    let p = softmax_rows(&device, 1, 3, &[-7.0, 0.0, 42.0]);
    for v in p {
        assert!((v - 1.0).abs() <= ROW_SUM_TOLERANCE);
    }
}

#[test]
fn test_shift_invariance() {
    let device = Device::host();
    let a = softmax_rows(&device, 3, 1, &[1.0, 2.0, 3.0]);
    let b = softmax_rows(&device, 3, 1, &[101.0, 102.0, 103.0]);
    for (x, y) in a.iter().zip(&b) {
        assert!((x - y).abs() < 1e-6);
    }
}

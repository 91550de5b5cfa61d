//! Kernel correctness against dense reference implementations.
//!
//! Every check runs through the public layer API on the host backend, so
//! the dispatch path (logical extents, buffer reuse) is covered along with
//! the arithmetic.

use ffnet::kernels::{cpu, Extent, MatmulShape};
use ffnet::{Device, FullyConnected, ReluFullyConnected, Softmax, SumOfSquares, Tensor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Relative tolerance for the affine transform.
const AFFINE_TOLERANCE: f32 = 1e-5;

fn random_vec(rng: &mut StdRng, len: usize) -> Vec<f32> {
    (0..len).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

fn assert_close(actual: &[f32], expected: &[f32], rel: f32) {
    assert_eq!(actual.len(), expected.len(), "length mismatch");
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        let tol = rel * e.abs().max(1.0);
        assert!(
            (a - e).abs() <= tol,
            "index {}: got {}, expected {} (tol {})",
            i,
            a,
            e,
            tol
        );
    }
}

/// Dense `x·W + b` with `W` stored `[in_dim, out_dim]`.
fn reference_affine(x: &[f32], w: &[f32], b: &[f32], rows: usize, in_dim: usize, out_dim: usize) -> Vec<f32> {
    let mut y = vec![0.0f32; rows * out_dim];
    for r in 0..rows {
        for c in 0..out_dim {
            let mut sum = 0.0f64;
            for i in 0..in_dim {
                sum += x[r * in_dim + i] as f64 * w[i * out_dim + c] as f64;
            }
            y[r * out_dim + c] = (sum + b[c] as f64) as f32;
        }
    }
    y
}

fn layer_with_random_params(device: &Device, rng: &mut StdRng, in_dim: usize, out_dim: usize) -> FullyConnected {
    let mut fc = FullyConnected::new(device, in_dim, out_dim, rng).unwrap();
    let bias = random_vec(rng, out_dim);
    fc.bias_mut().as_mut_slice().copy_from_slice(&bias);
    fc.bias_mut().push().unwrap();
    fc
}

#[test]
fn test_affine_matches_reference() {
    let device = Device::host();
    let mut rng = StdRng::seed_from_u64(11);

    for &(rows, in_dim, out_dim) in &[(1, 1, 1), (3, 7, 5), (17, 33, 9), (64, 16, 65)] {
        let mut fc = layer_with_random_params(&device, &mut rng, in_dim, out_dim);
        let data = random_vec(&mut rng, rows * in_dim);
        let x = Tensor::from_slice(&device, in_dim, rows, &data).unwrap();

        let y = fc.forward(&x).unwrap().download().unwrap();
        let expected = reference_affine(
            &data,
            fc.weights().as_slice(),
            fc.bias().as_slice(),
            rows,
            in_dim,
            out_dim,
        );
        assert_close(&y, &expected, AFFINE_TOLERANCE);
    }
}

#[test]
fn test_affine_after_shrinking_batch() {
    let device = Device::host();
    let mut rng = StdRng::seed_from_u64(12);
    let mut fc = layer_with_random_params(&device, &mut rng, 4, 3);

    let big = Tensor::from_slice(&device, 4, 8, &random_vec(&mut rng, 32)).unwrap();
    fc.forward(&big).unwrap();
    let capacity = fc.output().capacity();

    let data = random_vec(&mut rng, 8);
    let small = Tensor::from_slice(&device, 4, 2, &data).unwrap();
    let y = fc.forward(&small).unwrap().download().unwrap();

    assert_eq!(y.len(), 6);
    assert_eq!(fc.output().capacity(), capacity);
    let expected = reference_affine(&data, fc.weights().as_slice(), fc.bias().as_slice(), 2, 4, 3);
    assert_close(&y, &expected, AFFINE_TOLERANCE);
}

#[test]
fn test_gradients_match_reference() {
    let device = Device::host();
    let mut rng = StdRng::seed_from_u64(13);
    let (rows, in_dim, out_dim) = (6, 5, 4);
    let mut fc = layer_with_random_params(&device, &mut rng, in_dim, out_dim);

    let xs = random_vec(&mut rng, rows * in_dim);
    let gs = random_vec(&mut rng, rows * out_dim);
    let x = Tensor::from_slice(&device, in_dim, rows, &xs).unwrap();
    let g = Tensor::from_slice(&device, out_dim, rows, &gs).unwrap();
    fc.forward(&x).unwrap();
    let xg = fc.backward(&g, 1).unwrap().unwrap().download().unwrap();

    let w = fc.weights().as_slice().to_vec();
    let mut expected_wg = vec![0.0f32; in_dim * out_dim];
    let mut expected_bg = vec![0.0f32; out_dim];
    let mut expected_xg = vec![0.0f32; rows * in_dim];
    for n in 0..rows {
        for i in 0..in_dim {
            for c in 0..out_dim {
                expected_wg[i * out_dim + c] += xs[n * in_dim + i] * gs[n * out_dim + c];
                expected_xg[n * in_dim + i] += gs[n * out_dim + c] * w[i * out_dim + c];
            }
        }
        for c in 0..out_dim {
            expected_bg[c] += gs[n * out_dim + c];
        }
    }

    assert_close(&fc.weight_grad().download().unwrap(), &expected_wg, 1e-5);
    assert_close(&fc.bias_grad().download().unwrap(), &expected_bg, 1e-5);
    assert_close(&xg, &expected_xg, 1e-5);
}

#[test]
fn test_bias_grad_spans_column_blocks() {
    let extent = Extent::new(3, 130);
    let yg: Vec<f32> = (0..extent.len()).map(|i| (i % 130) as f32).collect();
    let mut bg = vec![0.0f32; 130];
    cpu::bias_grad(extent, &yg, &mut bg);
    for (c, v) in bg.iter().enumerate() {
        assert_eq!(*v, 3.0 * c as f32);
    }
}

#[test]
fn test_relu_fc_zero_input_has_zero_gradient() {
    let device = Device::host();
    let mut rng = StdRng::seed_from_u64(14);
    let mut layer = ReluFullyConnected::new(&device, 3, 2, &mut rng).unwrap();

    let x = Tensor::from_slice(&device, 3, 1, &[0.0, 1.0, -1.0]).unwrap();
    layer.forward(&x).unwrap();
    let g = Tensor::from_slice(&device, 2, 1, &[1.0, 1.0]).unwrap();
    let xg = layer.backward(&g, 1).unwrap().unwrap().download().unwrap();

    assert_eq!(xg[0], 0.0);
    assert_ne!(xg[1], 0.0);
    assert_eq!(xg[2], 0.0);
}

#[test]
fn test_softmax_cross_entropy_gradient() {
    let device = Device::host();
    let mut softmax = Softmax::new(&device).unwrap();
    let x = Tensor::from_slice(&device, 3, 2, &[1.0, 2.0, 3.0, 0.0, 0.0, 0.0]).unwrap();
    let p = softmax.forward(&x).unwrap().download().unwrap();

    // Fractional labels truncate; out-of-range labels have no one-hot term.
    let labels = Tensor::from_slice(&device, 1, 2, &[2.7, 5.0]).unwrap();
    let g = softmax.backward(&labels, 1).unwrap().unwrap().download().unwrap();

    let mut expected = p.clone();
    expected[2] -= 1.0;
    assert_close(&g, &expected, 1e-6);
}

#[test]
fn test_sum_of_squares_gradient() {
    let device = Device::host();
    let mut rng = StdRng::seed_from_u64(15);
    let ys = random_vec(&mut rng, 12);
    let ts = random_vec(&mut rng, 12);
    let y = Tensor::from_slice(&device, 4, 3, &ys).unwrap();
    let t = Tensor::from_slice(&device, 4, 3, &ts).unwrap();

    let mut sos = SumOfSquares::new(&device).unwrap();
    sos.forward(&y).unwrap();
    let g = sos.backward(&t, 1).unwrap().unwrap().download().unwrap();
    let expected: Vec<f32> = ys.iter().zip(&ts).map(|(y, t)| 2.0 * (y - t)).collect();
    assert_close(&g, &expected, 1e-6);
}

#[test]
fn test_host_affine_reference_kernel_directly() {
    let shape = MatmulShape {
        rows: 2,
        in_dim: 3,
        out_dim: 2,
    };
    let x = [1.0, 0.0, -1.0, 2.0, 1.0, 0.0];
    let w = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
    let b = [0.5, 0.25];
    let mut y = [0.0f32; 4];
    cpu::affine(shape, &x, &w, &b, &mut y);
    assert_eq!(y, [-3.5, -3.75, 5.5, 8.25]);
}

//! GPU/host parity tests.
//!
//! Each test builds the same seeded network on the host backend and on a
//! wgpu device and compares results.
//!
//! Run with: cargo test --features gpu --test gpu_parity -- --ignored

#![cfg(feature = "gpu")]

use ffnet::{Device, FfnetError, Network, Softmax, Tensor, TrainConfig, WgpuOptions};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Tolerance for forward outputs.
const FORWARD_TOLERANCE: f32 = 1e-5;

/// Tolerance for parameters after several optimizer steps.
const TRAINING_TOLERANCE: f32 = 1e-4;

/// Compares two f32 slices with tolerance.
fn assert_approx_eq(a: &[f32], b: &[f32], tol: f32) {
    assert_eq!(a.len(), b.len(), "Length mismatch: {} vs {}", a.len(), b.len());

    let mut max_diff = 0.0f32;
    let mut max_idx = 0;
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let diff = (x - y).abs();
        if diff > max_diff {
            max_diff = diff;
            max_idx = i;
        }
    }

    assert!(
        max_diff <= tol,
        "Max difference {} at index {} exceeds tolerance {}. a[{}]={}, b[{}]={}",
        max_diff,
        max_idx,
        tol,
        max_idx,
        a[max_idx],
        max_idx,
        b[max_idx]
    );
}

fn gpu_device() -> Device {
    Device::wgpu(WgpuOptions::compute()).expect("Failed to create wgpu device")
}

fn random_vec(rng: &mut StdRng, len: usize) -> Vec<f32> {
    (0..len).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

fn regression_net(device: &Device) -> Network {
    let mut net = Network::new(device, TrainConfig::seeded(77)).unwrap();
    net.add_fully_connected(6, 40).unwrap();
    net.add_relu_fully_connected(40, 20).unwrap();
    net.add_relu_fully_connected(20, 3).unwrap();
    net.add_sum_of_squares().unwrap();
    net
}

fn classifier_net(device: &Device) -> Network {
    let mut net = Network::new(device, TrainConfig::seeded(78)).unwrap();
    net.add_fully_connected(6, 70).unwrap();
    net.add_relu_fully_connected(70, 5).unwrap();
    net.add_softmax().unwrap();
    net
}

fn parameters(net: &Network) -> Vec<f32> {
    net.layers()
        .iter()
        .filter_map(|layer| layer.linear())
        .flat_map(|fc| {
            let mut p = fc.weights().download().unwrap();
            p.extend(fc.bias().download().unwrap());
            p
        })
        .collect()
}

#[test]
#[ignore = "Requires GPU"]
fn test_forward_parity() {
    let host = Device::host();
    let gpu = gpu_device();
    let mut rng = StdRng::seed_from_u64(1);
    let rows = 33;
    let data = random_vec(&mut rng, rows * 6);

    let mut host_net = regression_net(&host);
    let mut gpu_net = regression_net(&gpu);
    let hx = Tensor::from_slice(&host, 6, rows, &data).unwrap();
    let gx = Tensor::from_slice(&gpu, 6, rows, &data).unwrap();

    let host_out = host_net.forward(&hx).unwrap().unwrap().download().unwrap();
    let gpu_out = gpu_net.forward(&gx).unwrap().unwrap().download().unwrap();
    assert_approx_eq(&host_out, &gpu_out, FORWARD_TOLERANCE);
}

#[test]
#[ignore = "Requires GPU"]
fn test_training_parity_sum_of_squares() {
    let host = Device::host();
    let gpu = gpu_device();
    let mut rng = StdRng::seed_from_u64(2);
    let rows = 17;
    let xs = random_vec(&mut rng, rows * 6);
    let ts = random_vec(&mut rng, rows * 3);

    let mut host_net = regression_net(&host);
    let mut gpu_net = regression_net(&gpu);
    let (hx, ht) = (
        Tensor::from_slice(&host, 6, rows, &xs).unwrap(),
        Tensor::from_slice(&host, 3, rows, &ts).unwrap(),
    );
    let (gx, gt) = (
        Tensor::from_slice(&gpu, 6, rows, &xs).unwrap(),
        Tensor::from_slice(&gpu, 3, rows, &ts).unwrap(),
    );

    for _ in 0..5 {
        host_net.forward(&hx).unwrap();
        host_net.backward(&ht).unwrap();
        host_net.update_weights(0.001).unwrap();

        gpu_net.forward(&gx).unwrap();
        gpu_net.backward(&gt).unwrap();
        gpu_net.update_weights(0.001).unwrap();
    }

    assert_approx_eq(&parameters(&host_net), &parameters(&gpu_net), TRAINING_TOLERANCE);
}

#[test]
#[ignore = "Requires GPU"]
fn test_training_parity_softmax() {
    let host = Device::host();
    let gpu = gpu_device();
    let mut rng = StdRng::seed_from_u64(3);
    let rows = 130;
    let xs = random_vec(&mut rng, rows * 6);
    let labels: Vec<f32> = (0..rows).map(|r| (r % 5) as f32).collect();

    let mut host_net = classifier_net(&host);
    let mut gpu_net = classifier_net(&gpu);
    let (hx, hy) = (
        Tensor::from_slice(&host, 6, rows, &xs).unwrap(),
        Tensor::from_slice(&host, 1, rows, &labels).unwrap(),
    );
    let (gx, gy) = (
        Tensor::from_slice(&gpu, 6, rows, &xs).unwrap(),
        Tensor::from_slice(&gpu, 1, rows, &labels).unwrap(),
    );

    for _ in 0..3 {
        host_net.forward(&hx).unwrap();
        host_net.backward(&hy).unwrap();
        host_net.update_weights(0.001).unwrap();

        gpu_net.forward(&gx).unwrap();
        gpu_net.backward(&gy).unwrap();
        gpu_net.update_weights(0.001).unwrap();
    }

    assert_approx_eq(&parameters(&host_net), &parameters(&gpu_net), TRAINING_TOLERANCE);
}

#[test]
#[ignore = "Requires GPU"]
fn test_softmax_large_rows_on_gpu() {
    let gpu = gpu_device();
    let mut softmax = Softmax::new(&gpu).unwrap();
    let x = Tensor::from_slice(&gpu, 3, 2, &[1000.0, -1000.0, 500.0, 1.0, 2.0, 3.0]).unwrap();
    let p = softmax.forward(&x).unwrap().download().unwrap();
    for row in p.chunks_exact(3) {
        let sum: f32 = row.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5, "row sums to {}", sum);
    }
}

#[test]
#[ignore = "Requires GPU"]
fn test_push_pull_roundtrip_on_gpu() {
    let gpu = gpu_device();
    let mut t = Tensor::from_slice(&gpu, 4, 1, &[1.0, 2.0, 3.0, 4.0]).unwrap();
    t.as_mut_slice().fill(0.0);
    t.pull().unwrap();
    assert_eq!(t.as_slice(), &[1.0, 2.0, 3.0, 4.0]);

    t.reset_matrix(2, 1).unwrap();
    assert_eq!(t.capacity(), 4);
    assert_eq!(t.allocations(), 1);
}

#[test]
#[ignore = "Requires GPU"]
fn test_mixed_devices_rejected() {
    let host = Device::host();
    let gpu = gpu_device();
    let mut net = regression_net(&gpu);
    let x = Tensor::matrix(&host, 6, 2).unwrap();
    assert!(matches!(net.forward(&x), Err(FfnetError::DeviceMismatch(_))));
}

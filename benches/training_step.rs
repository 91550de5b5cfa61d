//! Forward pass and training step benchmarks on the host backend.
//!
//! # Methodology
//!
//! **Network recreation per batch size**: a fresh seeded `Network` is built
//! for each batch size so every group starts from identical weights.
//!
//! **Buffer reuse**: the first iteration grows every layer buffer to the
//! batch size; later iterations reuse them, so steady-state cost excludes
//! device allocation.
//!
//! **Throughput metric**: `Elements` = `batch_size * input_dim`.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ffnet::{Device, Network, Tensor, TrainConfig};
use rand::{rngs::StdRng, Rng, SeedableRng};

const INPUT_DIM: usize = 64;
const HIDDEN_DIM: usize = 128;
const OUTPUT_DIM: usize = 10;

fn make_inputs(dim: usize, batch: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..batch * dim).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

fn build_classifier(device: &Device) -> Network {
    let mut net = Network::new(device, TrainConfig::seeded(42)).unwrap();
    net.add_fully_connected(INPUT_DIM, HIDDEN_DIM).unwrap();
    net.add_relu_fully_connected(HIDDEN_DIM, OUTPUT_DIM).unwrap();
    net.add_softmax().unwrap();
    net
}

fn bench_forward(c: &mut Criterion) {
    let device = Device::host();
    let batch_sizes = [1_usize, 16, 64, 256];
    let mut group = c.benchmark_group("forward");

    for &batch in &batch_sizes {
        let mut net = build_classifier(&device);
        let x = Tensor::from_slice(&device, INPUT_DIM, batch, &make_inputs(INPUT_DIM, batch, 1)).unwrap();

        group.throughput(Throughput::Elements((batch * INPUT_DIM) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch), &batch, |b, &_batch| {
            b.iter(|| {
                black_box(net.forward(black_box(&x)).unwrap());
            });
        });
    }

    group.finish();
}

fn bench_train_step(c: &mut Criterion) {
    let device = Device::host();
    let batch_sizes = [1_usize, 16, 64, 256];
    let mut group = c.benchmark_group("train_step");

    for &batch in &batch_sizes {
        let mut net = build_classifier(&device);
        let x = Tensor::from_slice(&device, INPUT_DIM, batch, &make_inputs(INPUT_DIM, batch, 2)).unwrap();
        let labels: Vec<f32> = (0..batch).map(|r| (r % OUTPUT_DIM) as f32).collect();
        let y = Tensor::from_slice(&device, 1, batch, &labels).unwrap();

        group.throughput(Throughput::Elements((batch * INPUT_DIM) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch), &batch, |b, &_batch| {
            b.iter(|| {
                net.forward(black_box(&x)).unwrap();
                net.backward(black_box(&y)).unwrap();
                net.update_weights(0.001).unwrap();
            });
        });
    }

    group.finish();
}

/// Adam update alone, over every parameter of the network.
fn bench_update_weights(c: &mut Criterion) {
    let device = Device::host();
    let mut net = build_classifier(&device);
    let x = Tensor::from_slice(&device, INPUT_DIM, 8, &make_inputs(INPUT_DIM, 8, 3)).unwrap();
    let y = Tensor::from_slice(&device, 1, 8, &[0.0; 8]).unwrap();
    net.forward(&x).unwrap();
    net.backward(&y).unwrap();

    let mut group = c.benchmark_group("update_weights");
    group.throughput(Throughput::Elements(net.param_count() as u64));
    group.bench_function("adam", |b| {
        b.iter(|| net.update_weights(black_box(0.001)).unwrap());
    });
    group.finish();
}

criterion_group!(benches, bench_forward, bench_train_step, bench_update_weights);
criterion_main!(benches);

//! Regression demo for ffnet.
//!
//! Builds `FullyConnected → ReluFullyConnected → ReluFullyConnected →
//! SumOfSquares`, fits random targets from random inputs, and prints the
//! sum-of-squares loss after every step.
//!
//! # Usage
//!
//! ```bash
//! # wgpu device (default)
//! cargo run --release --example regression -- --steps 100
//!
//! # Host reference backend, no GPU required
//! cargo run --release --example regression -- --host --hidden 64
//! ```

use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use ffnet::loss::sum_of_squares;
use ffnet::{Device, FfnetResult, Network, Tensor, TrainConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Parser, Debug)]
#[command(name = "regression")]
#[command(about = "Fit random targets with a small feed-forward network")]
struct Args {
    /// Input width
    #[arg(long, default_value = "8")]
    input: usize,

    /// Hidden layer width
    #[arg(long, default_value = "32")]
    hidden: usize,

    /// Output width
    #[arg(long, default_value = "4")]
    output: usize,

    /// Rows per batch
    #[arg(long, default_value = "64")]
    batch: usize,

    /// Training steps
    #[arg(long, default_value = "50")]
    steps: usize,

    /// Learning rate
    #[arg(long, default_value = "0.001")]
    lr: f32,

    /// Seed for weights and data
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Use the host backend instead of a wgpu device
    #[arg(long, default_value = "false")]
    host: bool,
}

fn select_device(args: &Args) -> FfnetResult<Device> {
    if args.host {
        return Ok(Device::host());
    }
    #[cfg(feature = "gpu")]
    {
        Device::wgpu(ffnet::WgpuOptions::compute())
    }
    #[cfg(not(feature = "gpu"))]
    {
        println!("Built without the `gpu` feature, using the host backend");
        Ok(Device::host())
    }
}

fn run(args: &Args) -> FfnetResult<()> {
    let device = select_device(args)?;
    println!("=== ffnet Regression Demo ===\n");
    println!("Device: {:?}", device.kind());

    let mut net = Network::new(&device, TrainConfig::seeded(args.seed))?;
    net.add_fully_connected(args.input, args.hidden)?;
    net.add_relu_fully_connected(args.hidden, args.hidden)?;
    net.add_relu_fully_connected(args.hidden, args.output)?;
    net.add_sum_of_squares()?;
    println!("Layers:     {}", net.num_layers());
    println!("Parameters: {}", net.param_count());
    println!("Batch size: {}\n", args.batch);

    let mut rng = StdRng::seed_from_u64(args.seed.wrapping_add(1));
    let mut x = Tensor::matrix(&device, args.input, args.batch)?;
    let mut y = Tensor::matrix(&device, args.output, args.batch)?;
    x.random(&mut rng, 1.0)?;
    y.random(&mut rng, 1.0)?;

    let start = Instant::now();
    for step in 0..args.steps {
        let prediction = match net.forward(&x)? {
            Some(output) => output.download()?,
            None => {
                println!("Forward produced no output");
                return Ok(());
            }
        };
        println!("step {:>4}  loss {:.6}", step, sum_of_squares(&prediction, y.as_slice()));

        net.backward(&y)?;
        net.update_weights(args.lr)?;
    }

    let elapsed = start.elapsed();
    println!(
        "\n{} steps in {:.2?} ({:.2?}/step)",
        args.steps,
        elapsed,
        elapsed / args.steps.max(1) as u32
    );
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

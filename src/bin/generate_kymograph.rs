use anyhow::{bail, Result};
use clap::Parser;
use kymotracker::core::gaussian::gauss_1d;
use kymotracker::Kymograph;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;

/// Write a synthetic kymograph of drifting Gaussian spots
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Arguments {
    #[arg(short, long)]
    output: PathBuf,
    #[arg(long, default_value_t = 64)]
    positions: usize,
    #[arg(long, default_value_t = 200)]
    frames: usize,
    /// Spot as start_position:amplitude[:drift_per_frame], may be repeated
    #[arg(long = "spot", value_parser = parse_spot)]
    spots: Vec<Spot>,
    /// Sigma of every spot
    #[arg(long, default_value_t = 2.0)]
    width: f64,
    /// Standard deviation of additive Gaussian noise
    #[arg(long, default_value_t = 0.0)]
    noise: f64,
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

#[derive(Debug, Clone, Copy)]
struct Spot {
    start: f64,
    amplitude: f64,
    drift: f64,
}

fn parse_spot(s: &str) -> Result<Spot> {
    let fields = s
        .split(':')
        .map(|f| f.trim().parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()?;
    match fields[..] {
        [start, amplitude] => Ok(Spot {
            start,
            amplitude,
            drift: 0.0,
        }),
        [start, amplitude, drift] => Ok(Spot {
            start,
            amplitude,
            drift,
        }),
        _ => bail!("Expected start:amplitude[:drift], got {:?}", s),
    }
}

/// Box-Muller transform for normal distribution
fn gauss(rng: &mut StdRng, std_dev: f64) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(1e-15);
    let u2: f64 = rng.gen();
    std_dev * (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

fn main() -> Result<()> {
    let args = Arguments::parse();
    let spots = if args.spots.is_empty() {
        vec![Spot {
            start: args.positions as f64 / 2.0,
            amplitude: 100.0,
            drift: 0.0,
        }]
    } else {
        args.spots.clone()
    };

    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut data = Vec::with_capacity(args.positions * args.frames);
    for p in 0..args.positions {
        for t in 0..args.frames {
            let signal: f64 = spots
                .iter()
                .map(|s| gauss_1d(p as f64, s.amplitude, s.start + s.drift * t as f64, args.width))
                .sum();
            let noise = if args.noise > 0.0 {
                gauss(&mut rng, args.noise)
            } else {
                0.0
            };
            data.push(signal + noise);
        }
    }

    let kymograph = Kymograph::new(args.positions, args.frames, data)?;
    kymograph.save(&args.output)?;
    println!(
        "Wrote {} positions x {} frames with {} spots to {}",
        args.positions,
        args.frames,
        spots.len(),
        args.output.display()
    );
    Ok(())
}

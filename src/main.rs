use anyhow::{Context, Result};
use clap::Parser;
use kymotracker::core::{
    logger::Logger, metrics_recorder::MetricsRecorder, CommandLineArguments, Detector, Kymograph,
};
use kymotracker::util::ScopedTimer;

fn main() -> Result<()> {
    let args = CommandLineArguments::parse();
    Logger::init(args.log_level)?;
    let recorder = if args.metrics {
        Some(MetricsRecorder::install()?)
    } else {
        None
    };

    let config = args.detector_config()?;
    let kymograph = Kymograph::load(&args.image)?;
    log::info!(
        "Loaded {} with {} positions and {} frames",
        args.image.display(),
        kymograph.positions(),
        kymograph.frames()
    );

    let timer = ScopedTimer::new("tracking");
    let registry = Detector::new(config)?.detect(&kymograph)?;
    log::info!(
        "Found {} tracks in {:.2?}",
        registry.tracks().len(),
        timer.elapsed()
    );

    match &args.output {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Could not create {}", path.display()))?;
            serde_json::to_writer_pretty(std::io::BufWriter::new(file), &registry)?;
            log::info!("Wrote tracks to {}", path.display());
        }
        None => {
            println!("track\tfirst\tlast\tpeaks\tmean_position");
            for s in registry.summaries() {
                println!(
                    "{}\t{}\t{}\t{}\t{:.2}",
                    s.id, s.first_frame, s.last_frame, s.length, s.mean_position
                );
            }
        }
    }

    if let Some(recorder) = recorder {
        println!("{}", recorder.report());
    }
    Ok(())
}

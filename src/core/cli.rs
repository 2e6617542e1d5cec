use super::DetectorConfig;
use anyhow::Result;
use clap::Parser;
use log::LevelFilter;
use std::path::PathBuf;

/// Detect and track point signals in a kymograph
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct CommandLineArguments {
    /// Kymograph json, either nested rows (one per position) or {positions, frames, data}
    #[arg(short, long)]
    pub image: PathBuf,
    /// Path to detector configuration json
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Write the resulting tracks and peaks as json
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value_t = LevelFilter::Info)]
    pub log_level: LevelFilter,
    /// Print counters and histograms of the run
    #[arg(long)]
    pub metrics: bool,
    /// Maximum number of signals per frame
    #[arg(long)]
    pub n_max: Option<usize>,
    /// Minimum number of peaks for a track to be kept
    #[arg(long)]
    pub min_track_length: Option<usize>,
    /// Maximum distance between linked peaks
    #[arg(long)]
    pub max_dist: Option<f64>,
    /// Keep only tracks that are present in the first frame
    #[arg(long)]
    pub ignore_missing_at_start: bool,
}

impl CommandLineArguments {
    /// Loads the configuration file, if any, and applies the overrides
    /// given on the command line.
    pub fn detector_config(&self) -> Result<DetectorConfig> {
        let mut config = match &self.config {
            Some(path) => DetectorConfig::load(path)?,
            None => DetectorConfig::default(),
        };
        if let Some(n_max) = self.n_max {
            config.n_max = n_max;
        }
        if let Some(min_track_length) = self.min_track_length {
            config.min_track_length = min_track_length;
        }
        if let Some(max_dist) = self.max_dist {
            config.max_dist = max_dist;
        }
        if self.ignore_missing_at_start {
            config.ignore_missing_at_start = true;
        }
        config.validate()?;
        Ok(config)
    }
}

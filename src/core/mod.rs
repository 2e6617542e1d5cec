pub mod cli;
pub mod config;
pub mod detector;
pub mod fitter;
pub mod gaussian;
pub mod kymograph;
pub mod lm;
pub mod logger;
pub mod matcher;
pub mod metrics_recorder;
pub mod profile;
pub mod registry;
pub mod tracker;

pub use cli::CommandLineArguments;
pub use config::DetectorConfig;
pub use detector::Detector;
pub use kymograph::Kymograph;
pub use registry::{Peak, PeakId, Registry, Track, TrackId, TrackSummary};

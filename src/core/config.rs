use super::lm::LmConfig;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DetectorConfig {
    /// Half-width of the temporal median window used to build a profile.
    pub half_t_w: usize,
    /// Residual level below which no further components are peeled.
    pub peak_det_thresh: f64,
    /// Largest position change accepted when linking a peak to a track.
    pub max_dist: f64,
    /// Frames a track may go without a peak and still be linked.
    pub max_frame_gap: usize,
    pub min_track_length: usize,
    pub track_heritage_weight: f64,
    /// Maximum number of Gaussian components per frame.
    pub n_max: usize,
    pub a_lb: f64,
    pub a_ub: f64,
    pub c_lb: f64,
    pub c_ub: f64,
    /// Width used for the initial guess of every component.
    pub c_def: f64,
    /// Keep only tracks that have a peak in frame 0.
    pub ignore_missing_at_start: bool,
    /// Fit candidate model orders concurrently.
    pub parallel_fit: bool,
    pub lm: LmConfig,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            half_t_w: 2,
            peak_det_thresh: 3.5,
            max_dist: 6.0,
            max_frame_gap: 10,
            min_track_length: 50,
            track_heritage_weight: 100.0,
            n_max: 8,
            a_lb: 0.0,
            a_ub: 10000.0,
            c_lb: 1.2,
            c_ub: 3.0,
            c_def: 2.0,
            ignore_missing_at_start: false,
            parallel_fit: true,
            lm: LmConfig::default(),
        }
    }
}

impl DetectorConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("Could not open config {}", path.display()))?;
        let reader = std::io::BufReader::new(file);
        let config: Self = serde_json::from_reader(reader)
            .with_context(|| format!("Could not parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path.as_ref())?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_max == 0 {
            bail!("n_max must be at least 1");
        }
        if !(self.c_def > 0.0) {
            bail!("c_def must be positive, got {}", self.c_def);
        }
        if !(self.c_lb > 0.0) || self.c_lb > self.c_ub {
            bail!("Invalid width bounds [{}, {}]", self.c_lb, self.c_ub);
        }
        if self.a_lb > self.a_ub {
            bail!("Invalid amplitude bounds [{}, {}]", self.a_lb, self.a_ub);
        }
        if !(self.max_dist >= 0.0) {
            bail!("max_dist must not be negative, got {}", self.max_dist);
        }
        if !self.track_heritage_weight.is_finite() {
            bail!("track_heritage_weight must be finite");
        }
        if self.lm.max_iterations == 0 {
            bail!("lm.max_iterations must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_uses_defaults() {
        let config: DetectorConfig =
            serde_json::from_str(r#"{"n_max": 3, "ignore_missing_at_start": true}"#).unwrap();
        assert_eq!(config.n_max, 3);
        assert!(config.ignore_missing_at_start);
        assert_eq!(config.max_frame_gap, 10);
        assert_eq!(config.lm, LmConfig::default());
    }

    #[test]
    fn rejects_invalid_values() {
        let mut config = DetectorConfig::default();
        assert!(config.validate().is_ok());
        config.n_max = 0;
        assert!(config.validate().is_err());

        let config = DetectorConfig {
            c_lb: 4.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = DetectorConfig {
            max_dist: -1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn save_and_load() {
        let path = std::env::temp_dir().join(format!("detector_{}.json", std::process::id()));
        let config = DetectorConfig {
            min_track_length: 7,
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(DetectorConfig::load(&path).unwrap(), config);
        std::fs::remove_file(path).ok();
    }
}

use super::fitter::{FittedPeak, PeakFitter};
use super::profile::extract_profile;
use super::registry::Registry;
use super::tracker::TrackManager;
use super::{DetectorConfig, Kymograph};
use crate::util::ScopedTimer;
use anyhow::{bail, Result};
use std::time::Instant;

/// Detects peaks in every frame of a kymograph and links them into tracks.
pub struct Detector {
    config: DetectorConfig,
}

impl Detector {
    pub fn new(config: DetectorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Fits the profile of a single frame.
    pub fn fit_peaks(&self, kymograph: &Kymograph, frame: usize) -> Result<Vec<FittedPeak>> {
        if frame >= kymograph.frames() {
            bail!(
                "Frame {} is out of range, the kymograph has {} frames",
                frame,
                kymograph.frames()
            );
        }
        let profile = extract_profile(kymograph, frame, self.config.half_t_w);
        Ok(PeakFitter::new(&self.config).fit(&profile))
    }

    /// Processes all frames in order and returns the filtered tracks.
    pub fn detect(&self, kymograph: &Kymograph) -> Result<Registry> {
        let _timer = ScopedTimer::new("detect");
        let mut registry = Registry::new();
        let manager = TrackManager::new(&self.config);

        for frame in 0..kymograph.frames() {
            let start = Instant::now();
            let fitted = self.fit_peaks(kymograph, frame)?;
            metrics::counter!("count.peaks_detected", fitted.len() as u64);
            for peak in &fitted {
                registry.add_peak(frame, *peak);
            }
            let links = manager.link_frame(&mut registry, frame)?;
            log::debug!(
                "Frame {}: {} peaks, {} linked, {} new tracks",
                frame,
                fitted.len(),
                links.linked,
                links.created
            );
            metrics::histogram!("frame.duration_s", start.elapsed());
        }

        let candidates = registry.tracks().len();
        let report = manager.filter(&mut registry);
        log::info!(
            "{} of {} tracks kept ({} too short, {} missing at start), {} frames",
            registry.tracks().len(),
            candidates,
            report.too_short,
            report.missing_at_start,
            kymograph.frames()
        );
        Ok(registry)
    }
}

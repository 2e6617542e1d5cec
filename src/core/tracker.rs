use super::matcher::CostMatrix;
use super::registry::{PeakId, Registry, TrackId};
use super::DetectorConfig;
use anyhow::Result;

/// What linking did to the registry in one frame.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameLinks {
    pub linked: usize,
    pub created: usize,
}

/// Tracks deleted by post-processing.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FilterReport {
    pub too_short: usize,
    pub missing_at_start: usize,
}

/// Applies frame-to-frame links, starts new tracks and filters them once
/// all frames are processed.
pub struct TrackManager<'a> {
    config: &'a DetectorConfig,
}

impl<'a> TrackManager<'a> {
    pub fn new(config: &'a DetectorConfig) -> Self {
        Self { config }
    }

    /// Links every unlinked peak to an active track if possible and starts
    /// a new track for each peak that is left over.
    pub fn link_frame(&self, registry: &mut Registry, frame: usize) -> Result<FrameLinks> {
        let assignment = CostMatrix::build(registry, frame, self.config).assign();
        let linked = apply_links(registry, &assignment)?;
        let created = spawn_tracks(registry)?;
        metrics::counter!("count.links", linked as u64);
        metrics::counter!("count.tracks_created", created as u64);
        Ok(FrameLinks { linked, created })
    }

    /// Removes tracks that are too short and, if configured, tracks that do
    /// not start in the first frame.
    pub fn filter(&self, registry: &mut Registry) -> FilterReport {
        let too_short = remove_short_tracks(registry, self.config.min_track_length);
        let missing_at_start = if self.config.ignore_missing_at_start {
            remove_late_tracks(registry)
        } else {
            0
        };
        metrics::counter!("count.tracks_removed_length", too_short as u64);
        metrics::counter!("count.tracks_removed_start", missing_at_start as u64);
        FilterReport {
            too_short,
            missing_at_start,
        }
    }
}

pub fn apply_links(registry: &mut Registry, assignment: &[(PeakId, TrackId)]) -> Result<usize> {
    for &(peak, track) in assignment {
        registry.link(track, peak)?;
    }
    Ok(assignment.len())
}

pub fn spawn_tracks(registry: &mut Registry) -> Result<usize> {
    let seeds: Vec<PeakId> = registry.unlinked_peaks().map(|p| p.id).collect();
    for &peak in &seeds {
        let track = registry.create_track(peak)?;
        log::trace!("Peak {} starts track {}", peak, track);
    }
    Ok(seeds.len())
}

pub fn remove_short_tracks(registry: &mut Registry, min_length: usize) -> usize {
    registry.retain_tracks(|track| track.len() >= min_length)
}

pub fn remove_late_tracks(registry: &mut Registry) -> usize {
    registry.retain_tracks(|track| track.first_frame() == Some(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fitter::FittedPeak;

    fn add(registry: &mut Registry, t: usize, b: f64) -> PeakId {
        registry.add_peak(t, FittedPeak { a: 10.0, b, c: 2.0 })
    }

    fn track_with(registry: &mut Registry, frames: std::ops::Range<usize>, b: f64) -> TrackId {
        let mut frames = frames;
        let first = add(registry, frames.next().unwrap(), b);
        let track = registry.create_track(first).unwrap();
        for t in frames {
            let p = add(registry, t, b);
            registry.link(track, p).unwrap();
        }
        track
    }

    #[test]
    fn unmatched_peaks_start_tracks() {
        let config = DetectorConfig::default();
        let manager = TrackManager::new(&config);
        let mut registry = Registry::new();
        add(&mut registry, 0, 5.0);
        add(&mut registry, 0, 20.0);
        let links = manager.link_frame(&mut registry, 0).unwrap();
        assert_eq!(links, FrameLinks { linked: 0, created: 2 });

        add(&mut registry, 1, 5.5);
        add(&mut registry, 1, 40.0);
        let links = manager.link_frame(&mut registry, 1).unwrap();
        assert_eq!(links, FrameLinks { linked: 1, created: 1 });
        assert_eq!(registry.tracks().len(), 3);
        assert_eq!(registry.unlinked_peaks().count(), 0);
        registry.check_consistency().unwrap();
    }

    #[test]
    fn stale_track_is_not_revived() {
        let config = DetectorConfig {
            max_frame_gap: 2,
            ..Default::default()
        };
        let manager = TrackManager::new(&config);
        let mut registry = Registry::new();
        let old = track_with(&mut registry, 0..3, 10.0);

        // last peak at frame 2, frame 5 is beyond the gap
        add(&mut registry, 5, 10.0);
        manager.link_frame(&mut registry, 5).unwrap();
        assert_eq!(registry.track(old).unwrap().last_frame(), Some(2));
        assert_eq!(registry.tracks().len(), 2);
    }

    #[test]
    fn gap_within_tolerance_is_bridged() {
        let config = DetectorConfig {
            max_frame_gap: 2,
            ..Default::default()
        };
        let manager = TrackManager::new(&config);
        let mut registry = Registry::new();
        let old = track_with(&mut registry, 0..3, 10.0);

        add(&mut registry, 4, 11.0);
        manager.link_frame(&mut registry, 4).unwrap();
        let track = registry.track(old).unwrap();
        assert_eq!(track.peaks.keys().copied().collect::<Vec<_>>(), vec![0, 1, 2, 4]);
    }

    #[test]
    fn length_filter_boundary() {
        let config = DetectorConfig {
            min_track_length: 5,
            ..Default::default()
        };
        let mut registry = Registry::new();
        let short = track_with(&mut registry, 0..4, 10.0);
        let exact = track_with(&mut registry, 0..5, 30.0);

        let report = TrackManager::new(&config).filter(&mut registry);
        assert_eq!(report, FilterReport { too_short: 1, missing_at_start: 0 });
        assert!(registry.track(short).is_none());
        assert!(registry.track(exact).is_some());
        assert_eq!(registry.peaks().len(), 5);
        registry.check_consistency().unwrap();
    }

    #[test]
    fn start_filter_removes_late_tracks() {
        let config = DetectorConfig {
            min_track_length: 1,
            ignore_missing_at_start: true,
            ..Default::default()
        };
        let mut registry = Registry::new();
        let early = track_with(&mut registry, 0..10, 10.0);
        let late = track_with(&mut registry, 5..10, 30.0);

        let report = TrackManager::new(&config).filter(&mut registry);
        assert_eq!(report.missing_at_start, 1);
        assert!(registry.track(early).is_some());
        assert!(registry.track(late).is_none());

        let config = DetectorConfig {
            ignore_missing_at_start: false,
            ..config
        };
        let mut registry = Registry::new();
        track_with(&mut registry, 5..10, 30.0);
        assert_eq!(TrackManager::new(&config).filter(&mut registry).missing_at_start, 0);
        assert_eq!(registry.tracks().len(), 1);
    }
}

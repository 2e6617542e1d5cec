use super::fitter::FittedPeak;
use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type PeakId = u64;
pub type TrackId = u64;

/// A fitted Gaussian signal at a single frame.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Peak {
    pub id: PeakId,
    /// Frame index.
    pub t: usize,
    /// Amplitude.
    pub a: f64,
    /// Sub-pixel position.
    pub b: f64,
    /// Width (sigma).
    pub c: f64,
    /// Owning track, if linked.
    pub track: Option<TrackId>,
}

/// Peaks linked across frames, at most one per frame.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Track {
    pub id: TrackId,
    pub peaks: BTreeMap<usize, PeakId>,
}

impl Track {
    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    pub fn first_frame(&self) -> Option<usize> {
        self.peaks.keys().next().copied()
    }

    pub fn last_frame(&self) -> Option<usize> {
        self.peaks.keys().next_back().copied()
    }

    pub fn latest_peak(&self) -> Option<PeakId> {
        self.peaks.values().next_back().copied()
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TrackSummary {
    pub id: TrackId,
    pub first_frame: usize,
    pub last_frame: usize,
    pub length: usize,
    pub mean_position: f64,
}

/// Owns every peak and track of a run and hands out their IDs.
///
/// IDs start at 1 and are never reused, also not after deletions.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Registry {
    peaks: BTreeMap<PeakId, Peak>,
    tracks: BTreeMap<TrackId, Track>,
    #[serde(skip)]
    last_peak_id: PeakId,
    #[serde(skip)]
    last_track_id: TrackId,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peaks(&self) -> &BTreeMap<PeakId, Peak> {
        &self.peaks
    }

    pub fn tracks(&self) -> &BTreeMap<TrackId, Track> {
        &self.tracks
    }

    pub fn peak(&self, id: PeakId) -> Option<&Peak> {
        self.peaks.get(&id)
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(&id)
    }

    fn next_peak_id(&mut self) -> PeakId {
        self.last_peak_id =
            self.last_peak_id.max(self.peaks.keys().next_back().copied().unwrap_or(0)) + 1;
        self.last_peak_id
    }

    fn next_track_id(&mut self) -> TrackId {
        self.last_track_id =
            self.last_track_id.max(self.tracks.keys().next_back().copied().unwrap_or(0)) + 1;
        self.last_track_id
    }

    /// Registers an unlinked peak found in frame `t`.
    pub fn add_peak(&mut self, t: usize, fitted: FittedPeak) -> PeakId {
        let id = self.next_peak_id();
        self.peaks.insert(
            id,
            Peak {
                id,
                t,
                a: fitted.a,
                b: fitted.b,
                c: fitted.c,
                track: None,
            },
        );
        id
    }

    /// Starts a new track seeded with an unlinked peak.
    pub fn create_track(&mut self, peak_id: PeakId) -> Result<TrackId> {
        self.unlinked_peak(peak_id)?;
        let id = self.next_track_id();
        self.tracks.insert(
            id,
            Track {
                id,
                peaks: BTreeMap::new(),
            },
        );
        self.link(id, peak_id)?;
        Ok(id)
    }

    /// Adds an unlinked peak to a track under the peak's frame.
    pub fn link(&mut self, track_id: TrackId, peak_id: PeakId) -> Result<()> {
        let t = self.unlinked_peak(peak_id)?.t;
        let track = self
            .tracks
            .get_mut(&track_id)
            .ok_or_else(|| anyhow!("Unknown track {}", track_id))?;
        if let Some(existing) = track.peaks.get(&t) {
            bail!(
                "Track {} already holds peak {} in frame {}",
                track_id,
                existing,
                t
            );
        }
        track.peaks.insert(t, peak_id);
        if let Some(peak) = self.peaks.get_mut(&peak_id) {
            peak.track = Some(track_id);
        }
        Ok(())
    }

    fn unlinked_peak(&self, peak_id: PeakId) -> Result<&Peak> {
        let peak = self
            .peaks
            .get(&peak_id)
            .ok_or_else(|| anyhow!("Unknown peak {}", peak_id))?;
        if let Some(owner) = peak.track {
            bail!("Peak {} already belongs to track {}", peak_id, owner);
        }
        Ok(peak)
    }

    pub fn unlinked_peaks(&self) -> impl Iterator<Item = &Peak> {
        self.peaks.values().filter(|p| p.track.is_none())
    }

    /// Tracks whose latest peak is at or after `frame - max_frame_gap`.
    pub fn active_tracks(
        &self,
        frame: usize,
        max_frame_gap: usize,
    ) -> impl Iterator<Item = &Track> {
        let oldest = frame.saturating_sub(max_frame_gap);
        self.tracks
            .values()
            .filter(move |t| t.last_frame().map_or(false, |last| last >= oldest))
    }

    /// Most recent peak of a track.
    pub fn latest_peak(&self, track: &Track) -> Option<&Peak> {
        track.latest_peak().and_then(|id| self.peaks.get(&id))
    }

    /// Deletes a track together with all of its peaks.
    pub fn remove_track(&mut self, track_id: TrackId) -> Option<Track> {
        let track = self.tracks.remove(&track_id)?;
        for peak_id in track.peaks.values() {
            self.peaks.remove(peak_id);
        }
        Some(track)
    }

    /// Deletes every track for which `keep` returns false and returns how
    /// many were deleted.
    pub fn retain_tracks(&mut self, mut keep: impl FnMut(&Track) -> bool) -> usize {
        let doomed: Vec<TrackId> = self
            .tracks
            .values()
            .filter(|t| !keep(t))
            .map(|t| t.id)
            .collect();
        for id in &doomed {
            self.remove_track(*id);
        }
        doomed.len()
    }

    pub fn summaries(&self) -> Vec<TrackSummary> {
        self.tracks
            .values()
            .filter_map(|track| {
                let positions: Vec<f64> = track
                    .peaks
                    .values()
                    .filter_map(|id| self.peaks.get(id))
                    .map(|p| p.b)
                    .collect();
                Some(TrackSummary {
                    id: track.id,
                    first_frame: track.first_frame()?,
                    last_frame: track.last_frame()?,
                    length: track.len(),
                    mean_position: positions.iter().sum::<f64>() / positions.len().max(1) as f64,
                })
            })
            .collect()
    }

    /// Verifies that tracks and peaks reference each other consistently.
    pub fn check_consistency(&self) -> Result<()> {
        for track in self.tracks.values() {
            for (&t, peak_id) in &track.peaks {
                let peak = self.peaks.get(peak_id).ok_or_else(|| {
                    anyhow!("Track {} references missing peak {}", track.id, peak_id)
                })?;
                if peak.track != Some(track.id) {
                    bail!("Peak {} is not owned by track {}", peak_id, track.id);
                }
                if peak.t != t {
                    bail!("Peak {} of frame {} is stored under frame {}", peak_id, peak.t, t);
                }
            }
        }
        for peak in self.peaks.values() {
            if let Some(owner) = peak.track {
                let track = self.tracks.get(&owner).ok_or_else(|| {
                    anyhow!("Peak {} is owned by missing track {}", peak.id, owner)
                })?;
                if track.peaks.get(&peak.t) != Some(&peak.id) {
                    bail!("Track {} does not hold its peak {}", owner, peak.id);
                }
            }
        }
        Ok(())
    }
}

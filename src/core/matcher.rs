use super::registry::{PeakId, Registry, TrackId};
use super::DetectorConfig;
use pathfinding::{kuhn_munkres::kuhn_munkres_min, matrix::Matrix};

/// Costs are stored as fixed point integers for the Hungarian solver.
pub const COST_SCALE: f64 = 1e4;
/// Cost of a pair that must not be linked. Also used for padding.
pub const NO_LINK: i64 = 1_000_000_000_000;

/// Penalty for linking to a track that holds few peaks relative to the
/// number of frames seen so far. Zero in the first frame.
pub fn heritage_penalty(weight: f64, frame: usize, track_len: usize) -> f64 {
    if frame == 0 {
        return 0.0;
    }
    let frame = frame as f64;
    weight * (((frame - track_len as f64) / frame).exp() - 1.0)
}

/// Linking costs between unlinked peaks (rows) and active tracks (columns),
/// padded with [`NO_LINK`] to a square matrix.
pub struct CostMatrix {
    pub peak_ids: Vec<PeakId>,
    pub track_ids: Vec<TrackId>,
    pub costs: Matrix<i64>,
}

impl CostMatrix {
    pub fn build(registry: &Registry, frame: usize, config: &DetectorConfig) -> Self {
        let peaks: Vec<_> = registry.unlinked_peaks().collect();
        let tracks: Vec<_> = registry
            .active_tracks(frame, config.max_frame_gap)
            .filter_map(|track| Some((track, registry.latest_peak(track)?)))
            .collect();

        let n = peaks.len().max(tracks.len());
        let mut costs = Matrix::new(n, n, NO_LINK);
        for (row, peak) in peaks.iter().enumerate() {
            for (col, (track, latest)) in tracks.iter().enumerate() {
                // links only go forward in time
                if peak.t <= latest.t {
                    continue;
                }
                let distance = (peak.b - latest.b).abs();
                if distance <= config.max_dist {
                    let cost = distance
                        + heritage_penalty(config.track_heritage_weight, frame, track.len());
                    costs[(row, col)] =
                        ((cost * COST_SCALE).round() as i64).clamp(0, NO_LINK - 1);
                }
            }
        }

        Self {
            peak_ids: peaks.iter().map(|p| p.id).collect(),
            track_ids: tracks.iter().map(|(t, _)| t.id).collect(),
            costs,
        }
    }

    pub fn cost(&self, peak_idx: usize, track_idx: usize) -> i64 {
        self.costs[(peak_idx, track_idx)]
    }

    /// Minimum cost one-to-one matching. Pairs at [`NO_LINK`] cost and
    /// pairs involving padding are dropped.
    pub fn assign(&self) -> Vec<(PeakId, TrackId)> {
        if self.peak_ids.is_empty() || self.track_ids.is_empty() {
            return vec![];
        }
        let (_, assignment) = kuhn_munkres_min(&self.costs);
        assignment
            .iter()
            .enumerate()
            .filter(|&(row, &col)| {
                row < self.peak_ids.len()
                    && col < self.track_ids.len()
                    && self.cost(row, col) < NO_LINK
            })
            .map(|(row, &col)| (self.peak_ids[row], self.track_ids[col]))
            .collect()
    }
}

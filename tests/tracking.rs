use kymotracker::core::gaussian::gauss_1d;
use kymotracker::{Detector, DetectorConfig, Kymograph, Registry};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Position of a spot in a frame, `None` while it is absent.
type Path<'a> = &'a dyn Fn(usize) -> Option<f64>;

fn render(positions: usize, frames: usize, spots: &[(f64, Path)]) -> Kymograph {
    let mut data = vec![0.0; positions * frames];
    for t in 0..frames {
        for (amplitude, position) in spots {
            if let Some(b) = position(t) {
                for p in 0..positions {
                    data[p * frames + t] += gauss_1d(p as f64, *amplitude, b, 2.0);
                }
            }
        }
    }
    Kymograph::new(positions, frames, data).unwrap()
}

fn sorted_tracks(registry: &Registry) -> Vec<Vec<(usize, f64)>> {
    let mut tracks: Vec<Vec<(usize, f64)>> = registry
        .tracks()
        .values()
        .map(|track| {
            track
                .peaks
                .iter()
                .map(|(&t, id)| (t, registry.peak(*id).unwrap().b))
                .collect()
        })
        .collect();
    tracks.sort_by(|a, b| a[0].1.total_cmp(&b[0].1));
    tracks
}

#[test]
fn static_spot_gives_one_full_track() {
    let spot: Path = &|_| Some(25.3);
    let kymo = render(50, 100, &[(100.0, spot)]);
    let detector = Detector::new(DetectorConfig {
        n_max: 1,
        max_dist: 6.0,
        half_t_w: 2,
        min_track_length: 50,
        ..Default::default()
    })
    .unwrap();
    let registry = detector.detect(&kymo).unwrap();
    registry.check_consistency().unwrap();

    assert_eq!(registry.tracks().len(), 1);
    let track = registry.tracks().values().next().unwrap();
    assert_eq!(track.len(), 100);
    assert_eq!(track.first_frame(), Some(0));
    assert_eq!(track.last_frame(), Some(99));
    for id in track.peaks.values() {
        let peak = registry.peak(*id).unwrap();
        assert!((peak.b - 25.3).abs() < 1e-3, "frame {} at {}", peak.t, peak.b);
        assert!((peak.c - 2.0).abs() < 1e-3);
    }
}

#[test]
fn separated_spots_never_merge() {
    let a: Path = &|t| Some(15.0 + 0.05 * t as f64);
    let b: Path = &|t| Some(45.0 - 0.05 * t as f64);
    let kymo = render(60, 100, &[(15.0, a), (15.0, b)]);
    let detector = Detector::new(DetectorConfig {
        n_max: 3,
        min_track_length: 50,
        ..Default::default()
    })
    .unwrap();
    let registry = detector.detect(&kymo).unwrap();
    registry.check_consistency().unwrap();

    let tracks = sorted_tracks(&registry);
    assert_eq!(tracks.len(), 2);
    for (track, truth) in tracks.iter().zip([a, b]) {
        assert_eq!(track.len(), 100);
        for &(t, position) in track {
            assert!((position - truth(t).unwrap()).abs() < 0.5, "frame {t} at {position}");
        }
    }
}

#[test]
fn spot_returning_after_long_gap_starts_new_track() {
    let present: Path = &|t| (!(40..60).contains(&t)).then_some(20.0);
    let kymo = render(40, 100, &[(100.0, present)]);
    let detector = Detector::new(DetectorConfig {
        half_t_w: 0,
        n_max: 2,
        max_frame_gap: 10,
        min_track_length: 30,
        ..Default::default()
    })
    .unwrap();
    let registry = detector.detect(&kymo).unwrap();

    let spans: Vec<_> = registry
        .tracks()
        .values()
        .map(|t| (t.first_frame().unwrap(), t.last_frame().unwrap(), t.len()))
        .collect();
    assert_eq!(spans, vec![(0, 39, 40), (60, 99, 40)]);
}

#[test]
fn late_tracks_are_dropped_when_start_is_required() {
    let early: Path = &|_| Some(10.0);
    let late: Path = &|t| (t >= 20).then_some(30.0);
    let kymo = render(40, 80, &[(100.0, early), (100.0, late)]);

    let config = DetectorConfig {
        half_t_w: 0,
        n_max: 3,
        min_track_length: 30,
        ..Default::default()
    };
    let registry = Detector::new(config.clone()).unwrap().detect(&kymo).unwrap();
    assert_eq!(registry.tracks().len(), 2);

    let registry = Detector::new(DetectorConfig {
        ignore_missing_at_start: true,
        ..config
    })
    .unwrap()
    .detect(&kymo)
    .unwrap();
    assert_eq!(registry.tracks().len(), 1);
    let track = registry.tracks().values().next().unwrap();
    assert_eq!(track.first_frame(), Some(0));
    registry.check_consistency().unwrap();
}

#[test]
fn noisy_crowded_run_keeps_invariants() {
    let mut rng = StdRng::seed_from_u64(7);
    let (positions, frames) = (48, 40);
    let mut data = Vec::with_capacity(positions * frames);
    for p in 0..positions {
        for t in 0..frames {
            let signal = gauss_1d(p as f64, 60.0, 12.0 + 0.1 * t as f64, 2.0)
                + gauss_1d(p as f64, 50.0, 17.0, 1.5)
                + gauss_1d(p as f64, 40.0, 34.0 - 0.2 * t as f64, 2.5);
            data.push(signal + rng.gen_range(-3.0..3.0));
        }
    }
    let kymo = Kymograph::new(positions, frames, data).unwrap();
    let detector = Detector::new(DetectorConfig {
        n_max: 5,
        min_track_length: 1,
        ..Default::default()
    })
    .unwrap();
    let registry = detector.detect(&kymo).unwrap();
    registry.check_consistency().unwrap();
    assert!(!registry.tracks().is_empty());

    for (id, peak) in registry.peaks() {
        assert_eq!(*id, peak.id);
        assert!(peak.t < frames);
        assert!(peak.track.is_some());
    }
    for (id, track) in registry.tracks() {
        assert_eq!(*id, track.id);
        assert!(track.last_frame().unwrap() < frames);
    }

    let peaks: Vec<_> = registry.peaks().values().collect();
    for (i, p) in peaks.iter().enumerate() {
        for q in &peaks[i + 1..] {
            if p.t == q.t {
                assert!((p.b - q.b).abs() >= 2.0, "peaks {} and {} too close", p.id, q.id);
            }
        }
    }

    let json = serde_json::to_value(&registry).unwrap();
    assert_eq!(json["tracks"].as_object().unwrap().len(), registry.tracks().len());
}

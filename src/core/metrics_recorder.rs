use metrics::*;
use metrics_util::registry::{AtomicStorage, Registry};
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Mutex;

/// Collects the counters and histograms recorded during a run.
pub struct MetricsRecorder {
    registry: Registry<Key, AtomicStorage>,
    inner: Mutex<Inner>,
}

pub struct MetricDescription {
    pub unit: Option<Unit>,
    pub text: SharedString,
}

struct Inner {
    summaries: HashMap<Key, metrics_util::Summary>,
    descriptions: HashMap<u64, MetricDescription>,
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(AtomicStorage),
            inner: Mutex::new(Inner {
                summaries: HashMap::default(),
                descriptions: HashMap::default(),
            }),
        }
    }

    /// Installs a leaked recorder as the global `metrics` backend.
    pub fn install() -> anyhow::Result<&'static Self> {
        let recorder: &'static Self = Box::leak(Box::new(Self::new()));
        metrics::set_recorder(recorder)
            .map_err(|e| anyhow::anyhow!("Could not install metrics recorder: {}", e))?;
        describe_metrics();
        Ok(recorder)
    }

    pub fn describe(&self, key_name: KeyName, unit: Option<Unit>, description: SharedString) {
        let mut inner = self.inner.lock().unwrap();
        let key = Key::from_name(key_name);
        let hash = key.get_hash();
        inner.descriptions.insert(
            hash,
            MetricDescription {
                unit,
                text: description,
            },
        );
    }
}

/// Registers unit and help text of every metric the detector records.
pub fn describe_metrics() {
    describe_counter!("count.peaks_detected", "peaks kept after model selection");
    describe_counter!("count.fit_failures", "model orders whose fit did not converge");
    describe_counter!("count.links", "peaks linked to an existing track");
    describe_counter!("count.tracks_created", "tracks started from unlinked peaks");
    describe_counter!(
        "count.tracks_removed_length",
        "tracks dropped for being shorter than min_track_length"
    );
    describe_counter!(
        "count.tracks_removed_start",
        "tracks dropped for not starting in the first frame"
    );
    describe_histogram!("fit.model_order", "number of Gaussians in the selected model");
    describe_histogram!(
        "fit.lm_iterations",
        Unit::Count,
        "Levenberg-Marquardt iterations per converged order"
    );
    describe_histogram!("frame.duration_s", Unit::Seconds, "processing time per frame");
}

impl Recorder for MetricsRecorder {
    fn describe_counter(&self, key_name: KeyName, unit: Option<Unit>, description: SharedString) {
        self.describe(key_name, unit, description);
    }

    fn describe_gauge(&self, key_name: KeyName, unit: Option<Unit>, description: SharedString) {
        self.describe(key_name, unit, description);
    }

    fn describe_histogram(&self, key_name: KeyName, unit: Option<Unit>, description: SharedString) {
        self.describe(key_name, unit, description);
    }

    fn register_counter(&self, key: &Key) -> Counter {
        self.registry
            .get_or_create_counter(key, |c| c.clone().into())
    }

    fn register_gauge(&self, key: &Key) -> Gauge {
        self.registry.get_or_create_gauge(key, |c| c.clone().into())
    }

    fn register_histogram(&self, key: &Key) -> Histogram {
        self.registry
            .get_or_create_histogram(key, |c| c.clone().into())
    }
}

impl MetricsRecorder {
    /// Update summaries with recent histogram data
    pub fn update_summaries(&self) {
        let mut inner = self.inner.lock().unwrap();
        self.registry.visit_histograms(|key, h| {
            let summary = inner
                .summaries
                .entry(key.clone())
                .or_insert_with(metrics_util::Summary::with_defaults);
            h.clear_with(|vs| {
                for v in vs {
                    summary.add(*v)
                }
            });
        });
    }

    /// Current value of every counter, sorted by name.
    pub fn counters(&self) -> Vec<(String, u64)> {
        let mut counters = vec![];
        self.registry.visit_counters(|key, c| {
            counters.push((key.name().to_string(), c.load(Ordering::Relaxed)));
        });
        counters.sort();
        counters
    }

    fn describe_line(description: Option<&MetricDescription>) -> String {
        match description {
            Some(MetricDescription {
                unit: Some(unit),
                text,
            }) => format!(" ({}, {})", text, unit.as_str()),
            Some(MetricDescription { unit: None, text }) => format!(" ({})", text),
            None => String::new(),
        }
    }

    /// Call the given closure with each key and summary
    pub fn visit_summaries(
        &self,
        mut f: impl FnMut(&Key, &metrics_util::Summary, Option<&MetricDescription>),
    ) {
        let inner = self.inner.lock().unwrap();
        for (key, summary) in inner.summaries.iter() {
            let description = inner.descriptions.get(&key.get_hash());
            f(key, summary, description);
        }
    }

    /// Human readable report of all counters and histogram summaries.
    pub fn report(&self) -> String {
        self.update_summaries();
        let counters = self.counters();
        let mut lines: Vec<String> = {
            let inner = self.inner.lock().unwrap();
            counters
                .into_iter()
                .map(|(name, value)| {
                    let hash = Key::from_name(name.clone()).get_hash();
                    let description = Self::describe_line(inner.descriptions.get(&hash));
                    format!("{name}: {value}{description}")
                })
                .collect()
        };
        let mut histograms = vec![];
        self.visit_summaries(|key, summary, description| {
            histograms.push(format!(
                "{}: n={} p50={:.4} p99={:.4} max={:.4}{}",
                key.name(),
                summary.count(),
                summary.quantile(0.5).unwrap_or(f64::NAN),
                summary.quantile(0.99).unwrap_or(f64::NAN),
                summary.quantile(1.0).unwrap_or(f64::NAN),
                Self::describe_line(description),
            ));
        });
        histograms.sort();
        lines.extend(histograms);
        lines.join("\n")
    }
}

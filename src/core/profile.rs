use super::Kymograph;

/// Spatial intensity profile of one frame.
#[derive(Debug, Clone)]
pub struct Profile {
    pub x: Vec<f64>,
    pub values: Vec<f64>,
}

impl Profile {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Builds the profile of `frame` as the per-position median over the
/// frames `frame - half_t_w ..= frame + half_t_w`, clamped to the image.
/// `frame` must be a valid frame index; out of range frames are clamped.
pub fn extract_profile(kymograph: &Kymograph, frame: usize, half_t_w: usize) -> Profile {
    let last = kymograph.frames() - 1;
    let start = frame.saturating_sub(half_t_w).min(last);
    let end = frame.saturating_add(half_t_w).min(last);

    let mut window = Vec::with_capacity(end - start + 1);
    let values = (0..kymograph.positions())
        .map(|position| {
            window.clear();
            window.extend_from_slice(&kymograph.row(position)[start..=end]);
            median(&mut window)
        })
        .collect::<Vec<_>>();
    let x = (0..values.len()).map(|p| p as f64).collect();

    Profile { x, values }
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

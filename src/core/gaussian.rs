use super::lm::LmModel;

/// Minimum distance between two fitted centres in the same frame.
pub const MIN_SEPARATION: f64 = 2.0;

/// `a * exp(-(x - b)² / (2c²))`
#[inline]
pub fn gauss_1d(x: f64, a: f64, b: f64, c: f64) -> f64 {
    let dx = x - b;
    a * (-(dx * dx) / (2.0 * c * c)).exp()
}

/// Sum of Gaussian components, parameters laid out as `[a0, b0, c0, a1, b1, c1, ...]`.
///
/// Configurations with two centres closer than `min_separation` are
/// infeasible.
#[derive(Debug, Clone, Copy)]
pub struct MultiGaussian {
    pub min_separation: f64,
}

impl Default for MultiGaussian {
    fn default() -> Self {
        Self {
            min_separation: MIN_SEPARATION,
        }
    }
}

impl MultiGaussian {
    pub fn components(params: &[f64]) -> impl Iterator<Item = (f64, f64, f64)> + '_ {
        params.chunks_exact(3).map(|p| (p[0], p[1], p[2]))
    }
}

impl LmModel for MultiGaussian {
    #[inline]
    fn evaluate(&self, x: f64, params: &[f64]) -> f64 {
        Self::components(params)
            .map(|(a, b, c)| gauss_1d(x, a, b, c))
            .sum()
    }

    fn jacobian_row(&self, x: f64, params: &[f64], row: &mut [f64]) {
        for (p, r) in params.chunks_exact(3).zip(row.chunks_exact_mut(3)) {
            let (a, b, c) = (p[0], p[1], p[2]);
            let c2 = c * c;
            let dx = x - b;
            let e = (-(dx * dx) / (2.0 * c2)).exp();
            r[0] = e;
            r[1] = a * e * dx / c2;
            r[2] = a * e * dx * dx / (c2 * c);
        }
    }

    fn is_feasible(&self, params: &[f64]) -> bool {
        let centres: Vec<f64> = Self::components(params).map(|(_, b, _)| b).collect();
        centres.iter().enumerate().all(|(i, bi)| {
            centres[i + 1..]
                .iter()
                .all(|bj| (bi - bj).abs() >= self.min_separation)
        })
    }
}

use super::gaussian::{gauss_1d, MultiGaussian};
use super::lm::{optimize, FitFailure, LmModel};
use super::profile::Profile;
use super::DetectorConfig;

/// One Gaussian component of the selected model, before it is registered
/// as a peak.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FittedPeak {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

/// Initial point and bounds for fitting a model of a given order.
#[derive(Debug, Clone)]
pub struct Guess {
    pub order: usize,
    pub initial: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    /// False once peeling left a residual below the detection threshold;
    /// higher orders are not worth trying.
    pub proceed: bool,
}

/// A converged fit of one model order.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub order: usize,
    pub params: Vec<f64>,
    /// Sum of absolute residuals against the profile.
    pub score: f64,
    pub iterations: usize,
}

pub struct PeakFitter<'a> {
    config: &'a DetectorConfig,
    model: MultiGaussian,
}

impl<'a> PeakFitter<'a> {
    pub fn new(config: &'a DetectorConfig) -> Self {
        Self {
            config,
            model: MultiGaussian::default(),
        }
    }

    /// Fits models of increasing order to `profile` and returns the
    /// components of the best scoring one. Returns nothing if no order
    /// converged.
    pub fn fit(&self, profile: &Profile) -> Vec<FittedPeak> {
        if profile.is_empty() {
            return vec![];
        }
        let guesses = self.guesses(profile);
        let results = fit_orders(&guesses, self.config.parallel_fit, |guess| {
            self.fit_order(profile, guess)
        });

        let mut best: Option<Candidate> = None;
        for (guess, result) in guesses.iter().zip(results) {
            match result {
                Ok(candidate) => {
                    metrics::histogram!("fit.lm_iterations", candidate.iterations as f64);
                    if best.as_ref().map_or(true, |b| candidate.score < b.score) {
                        best = Some(candidate);
                    }
                }
                Err(failure) => {
                    metrics::increment_counter!("count.fit_failures");
                    log::trace!("Model order {} discarded: {}", guess.order, failure);
                }
            }
        }

        match best {
            Some(candidate) => {
                metrics::histogram!("fit.model_order", candidate.order as f64);
                MultiGaussian::components(&candidate.params)
                    .map(|(a, b, c)| FittedPeak { a, b, c })
                    .collect()
            }
            None => {
                log::debug!("No model order converged");
                vec![]
            }
        }
    }

    /// Guesses for orders 1..=n_max, ending at the first guess that signals
    /// not to proceed.
    pub fn guesses(&self, profile: &Profile) -> Vec<Guess> {
        let mut guesses = Vec::with_capacity(self.config.n_max);
        for order in 1..=self.config.n_max {
            let guess = self.guess(profile, order);
            let proceed = guess.proceed;
            guesses.push(guess);
            if !proceed {
                break;
            }
        }
        guesses
    }

    /// Peels `order` Gaussians of default width off the profile, one at
    /// the residual maximum each time.
    pub fn guess(&self, profile: &Profile, order: usize) -> Guess {
        let config = self.config;
        let mut residual = profile.values.clone();
        let mut guess = Guess {
            order,
            initial: Vec::with_capacity(3 * order),
            lower: Vec::with_capacity(3 * order),
            upper: Vec::with_capacity(3 * order),
            proceed: true,
        };

        for _ in 0..order {
            let (idx, max_val) = argmax(&residual);
            let b = centroid_3(&residual, idx);
            for (r, &x) in residual.iter_mut().zip(profile.x.iter()) {
                *r -= gauss_1d(x, max_val, b, config.c_def);
            }
            if argmax(&residual).1 < config.peak_det_thresh {
                guess.proceed = false;
            }

            let lower = [config.a_lb, 0.0, config.c_lb];
            let upper = [config.a_ub, profile.len() as f64, config.c_ub];
            let initial = [max_val, b, config.c_def];
            for i in 0..3 {
                guess.initial.push(initial[i].clamp(lower[i], upper[i]));
            }
            guess.lower.extend_from_slice(&lower);
            guess.upper.extend_from_slice(&upper);
        }
        guess
    }

    pub fn fit_order(&self, profile: &Profile, guess: &Guess) -> Result<Candidate, FitFailure> {
        let solution = optimize(
            &self.model,
            &profile.x,
            &profile.values,
            &guess.initial,
            &guess.lower,
            &guess.upper,
            &self.config.lm,
        )?;
        let score = profile
            .x
            .iter()
            .zip(profile.values.iter())
            .map(|(&x, &v)| (v - self.model.evaluate(x, &solution.params)).abs())
            .sum();
        Ok(Candidate {
            order: guess.order,
            params: solution.params,
            score,
            iterations: solution.iterations,
        })
    }
}

/// Runs `fit` for every guess, on one scoped thread per guess when
/// `parallel` is set. A panic in a worker is resumed on the caller.
fn fit_orders<F>(guesses: &[Guess], parallel: bool, fit: F) -> Vec<Result<Candidate, FitFailure>>
where
    F: Fn(&Guess) -> Result<Candidate, FitFailure> + Sync,
{
    if !parallel || guesses.len() < 2 {
        return guesses.iter().map(&fit).collect();
    }
    std::thread::scope(|scope| {
        let fit = &fit;
        let handles: Vec<_> = guesses
            .iter()
            .map(|guess| scope.spawn(move || fit(guess)))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
            .collect()
    })
}

/// Index and value of the first maximum.
fn argmax(values: &[f64]) -> (usize, f64) {
    values
        .iter()
        .copied()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, v)| {
            if v > best.1 {
                (i, v)
            } else {
                best
            }
        })
}

/// Intensity weighted centre of the three samples around `idx`. Falls back
/// to `idx` at the profile edges or when the weights cancel out.
fn centroid_3(values: &[f64], idx: usize) -> f64 {
    if idx == 0 || idx + 1 >= values.len() {
        return idx as f64;
    }
    let (l, m, r) = (values[idx - 1], values[idx], values[idx + 1]);
    let sum = l + m + r;
    let centre = ((idx - 1) as f64 * l + idx as f64 * m + (idx + 1) as f64 * r) / sum;
    if sum == 0.0 || !centre.is_finite() {
        idx as f64
    } else {
        centre
    }
}

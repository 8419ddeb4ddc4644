//! Inter-arrival time samplers
//!
//! Each client advances a virtual clock by successive draws from one of:
//! - Poisson (exponential IATs, CV = 1)
//! - Gamma (CV > 1 gives bursty traffic)
//! - Weibull (shape solved from a target CV)
//! - Constant (fixed spacing, no randomness consumed)
//!
//! Rates are in requests per microsecond and IATs are whole microseconds,
//! never less than 1.

use anyhow::bail;
use rand::Rng;
use rand_distr::{Distribution as _, Exp1, StandardNormal};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Rates below this are floored to avoid division blow-ups
pub const MIN_RATE_PER_US: f64 = 1e-15;

/// Gamma shapes below this fall back to Poisson
pub const MIN_GAMMA_SHAPE: f64 = 0.01;

/// Valid target CV range for Weibull moment matching over k in [0.1, 100]
pub const WEIBULL_CV_RANGE: (f64, f64) = (0.01, 10.4);

const WEIBULL_K_BOUNDS: (f64, f64) = (0.1, 100.0);
const WEIBULL_MAX_ITERATIONS: usize = 100;
const WEIBULL_TOLERANCE: f64 = 0.001;

/// Arrival process type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ArrivalProcess {
    Poisson,
    Gamma,
    Weibull,
    Constant,
}

impl ArrivalProcess {
    pub const ALL: [ArrivalProcess; 4] = [
        ArrivalProcess::Poisson,
        ArrivalProcess::Gamma,
        ArrivalProcess::Weibull,
        ArrivalProcess::Constant,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArrivalProcess::Poisson => "poisson",
            ArrivalProcess::Gamma => "gamma",
            ArrivalProcess::Weibull => "weibull",
            ArrivalProcess::Constant => "constant",
        }
    }
}

impl fmt::Display for ArrivalProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArrivalProcess {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match ArrivalProcess::ALL.iter().find(|p| p.as_str() == s) {
            Some(process) => Ok(*process),
            None => {
                let valid: Vec<&str> = ArrivalProcess::ALL.iter().map(|p| p.as_str()).collect();
                bail!("unknown arrival process {:?} (valid: {})", s, valid.join(", "))
            }
        }
    }
}

impl TryFrom<String> for ArrivalProcess {
    type Error = anyhow::Error;

    fn try_from(value: String) -> anyhow::Result<Self> {
        value.parse()
    }
}

impl From<ArrivalProcess> for String {
    fn from(process: ArrivalProcess) -> Self {
        process.as_str().to_string()
    }
}

/// Declarative arrival process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct ArrivalSpec {
    #[cfg_attr(feature = "schema", schemars(with = "String"))]
    pub process: ArrivalProcess,
    /// Target coefficient of variation (gamma and weibull only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cv: Option<f64>,
}

impl ArrivalSpec {
    pub fn poisson() -> Self {
        Self { process: ArrivalProcess::Poisson, cv: None }
    }

    pub fn constant() -> Self {
        Self { process: ArrivalProcess::Constant, cv: None }
    }

    pub fn gamma(cv: f64) -> Self {
        Self { process: ArrivalProcess::Gamma, cv: Some(cv) }
    }

    pub fn weibull(cv: f64) -> Self {
        Self { process: ArrivalProcess::Weibull, cv: Some(cv) }
    }

    /// CV with the default of 1.0 applied to missing or non-positive values
    fn effective_cv(&self) -> f64 {
        match self.cv {
            Some(cv) if cv > 0.0 => cv,
            _ => 1.0,
        }
    }
}

/// A constructed inter-arrival sampler
#[derive(Debug, Clone, PartialEq)]
pub enum ArrivalSampler {
    Poisson { rate_per_us: f64 },
    Gamma { shape: f64, scale: f64 },
    Weibull { shape: f64, scale: f64 },
    Constant { iat_us: i64 },
}

impl ArrivalSampler {
    /// Build a sampler for a client emitting `rate_per_us` requests per microsecond
    pub fn new(spec: &ArrivalSpec, rate_per_us: f64) -> Self {
        let rate = if rate_per_us.is_finite() {
            rate_per_us.max(MIN_RATE_PER_US)
        } else {
            MIN_RATE_PER_US
        };
        let mean = 1.0 / rate;

        match spec.process {
            ArrivalProcess::Poisson => ArrivalSampler::Poisson { rate_per_us: rate },
            ArrivalProcess::Gamma => {
                let cv = spec.effective_cv();
                let shape = 1.0 / (cv * cv);
                if shape < MIN_GAMMA_SHAPE {
                    tracing::warn!(
                        "Gamma shape {:.4} (CV={:.1}) is very small; falling back to Poisson",
                        shape,
                        cv
                    );
                    return ArrivalSampler::Poisson { rate_per_us: rate };
                }
                ArrivalSampler::Gamma { shape, scale: mean * cv * cv }
            }
            ArrivalProcess::Weibull => {
                let k = weibull_shape_from_cv(spec.effective_cv());
                let scale = mean / statrs::function::gamma::gamma(1.0 + 1.0 / k);
                ArrivalSampler::Weibull { shape: k, scale }
            }
            ArrivalProcess::Constant => {
                let iat = mean.round();
                let iat_us = if iat >= i64::MAX as f64 { i64::MAX } else { (iat as i64).max(1) };
                ArrivalSampler::Constant { iat_us }
            }
        }
    }

    /// Next inter-arrival time in microseconds (always >= 1)
    pub fn sample_iat<R: Rng + ?Sized>(&self, rng: &mut R) -> i64 {
        let sample = match self {
            ArrivalSampler::Poisson { rate_per_us } => {
                let e: f64 = Exp1.sample(rng);
                e / rate_per_us
            }
            ArrivalSampler::Gamma { shape, scale } => gamma_sample(rng, *shape) * scale,
            ArrivalSampler::Weibull { shape, scale } => {
                let mut u: f64 = rng.random();
                if u == 0.0 {
                    u = f64::MIN_POSITIVE;
                }
                scale * (-u.ln()).powf(1.0 / shape)
            }
            ArrivalSampler::Constant { iat_us } => return *iat_us,
        };
        to_iat(sample)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ArrivalSampler::Poisson { .. } => "Poisson",
            ArrivalSampler::Gamma { .. } => "Gamma",
            ArrivalSampler::Weibull { .. } => "Weibull",
            ArrivalSampler::Constant { .. } => "Constant",
        }
    }
}

/// Truncate to whole microseconds, floor at 1
fn to_iat(sample: f64) -> i64 {
    if !sample.is_finite() {
        return if sample.is_nan() { 1 } else { i64::MAX };
    }
    if sample >= i64::MAX as f64 {
        return i64::MAX;
    }
    (sample as i64).max(1)
}

/// Unit-scale Gamma(shape) draw
///
/// Marsaglia-Tsang for shape >= 1. Smaller shapes use
/// Gamma(a) = Gamma(a + 1) * U^(1/a).
fn gamma_sample<R: Rng + ?Sized>(rng: &mut R, shape: f64) -> f64 {
    if shape < 1.0 {
        let u: f64 = rng.random();
        return gamma_sample(rng, shape + 1.0) * u.powf(1.0 / shape);
    }

    let d = shape - 1.0 / 3.0;
    let c = 1.0 / (9.0 * d).sqrt();
    loop {
        let (x, v) = loop {
            let x: f64 = StandardNormal.sample(rng);
            let v = 1.0 + c * x;
            if v > 0.0 {
                break (x, v * v * v);
            }
        };
        let u: f64 = rng.random();

        // Squeeze
        if u < 1.0 - 0.0331 * (x * x) * (x * x) {
            return d * v;
        }
        if u.ln() < 0.5 * x * x + d * (1.0 - v + v.ln()) {
            return d * v;
        }
    }
}

/// Coefficient of variation of a Weibull with shape `k`
pub fn weibull_cv(k: f64) -> f64 {
    use statrs::function::gamma::gamma;

    let g1 = gamma(1.0 + 1.0 / k);
    let g2 = gamma(1.0 + 2.0 / k);
    (g2 / (g1 * g1) - 1.0).sqrt()
}

/// Solve for the Weibull shape whose CV matches `target_cv`
///
/// CV decreases monotonically in k, so plain bisection over [0.1, 100]
/// works. Returns the bracket midpoint if it does not converge.
pub fn weibull_shape_from_cv(target_cv: f64) -> f64 {
    let (mut lo, mut hi) = WEIBULL_K_BOUNDS;
    for _ in 0..WEIBULL_MAX_ITERATIONS {
        let mid = (lo + hi) / 2.0;
        let cv = weibull_cv(mid);
        if (cv - target_cv).abs() < WEIBULL_TOLERANCE {
            return mid;
        }
        if cv > target_cv {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    let k = (lo + hi) / 2.0;
    tracing::warn!(
        "Weibull shape bisection did not converge for CV={:.3} after {} iterations; using k={:.3}",
        target_cv,
        WEIBULL_MAX_ITERATIONS,
        k
    );
    k
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn moments(sampler: &ArrivalSampler, n: usize, seed: u64) -> (f64, f64) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let samples: Vec<f64> = (0..n).map(|_| sampler.sample_iat(&mut rng) as f64).collect();
        let mean = samples.iter().sum::<f64>() / n as f64;
        let var = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        (mean, var)
    }

    #[test]
    fn test_poisson_mean_iat() {
        // 10 req/s = 1e-5 req/us
        let sampler = ArrivalSampler::new(&ArrivalSpec::poisson(), 10.0 / 1e6);
        let (mean, _) = moments(&sampler, 10_000, 42);
        let expected = 100_000.0;
        assert!((mean - expected).abs() / expected < 0.05, "mean IAT {}", mean);
    }

    #[test]
    fn test_gamma_moments() {
        let rate = 1.0 / 10_000.0;
        let cv = 2.0;
        let sampler = ArrivalSampler::new(&ArrivalSpec::gamma(cv), rate);
        assert!(matches!(sampler, ArrivalSampler::Gamma { .. }));

        let (mean, var) = moments(&sampler, 50_000, 7);
        let expected_mean = 10_000.0;
        let expected_var = expected_mean * expected_mean * cv * cv;
        assert!((mean - expected_mean).abs() / expected_mean < 0.05, "mean {}", mean);
        assert!((var - expected_var).abs() / expected_var < 0.15, "variance {}", var);
    }

    #[test]
    fn test_gamma_large_cv_falls_back_to_poisson() {
        let sampler = ArrivalSampler::new(&ArrivalSpec::gamma(20.0), 1e-3);
        assert!(matches!(sampler, ArrivalSampler::Poisson { .. }));
    }

    #[test]
    fn test_gamma_default_cv() {
        let spec = ArrivalSpec { process: ArrivalProcess::Gamma, cv: Some(-3.0) };
        match ArrivalSampler::new(&spec, 1e-3) {
            ArrivalSampler::Gamma { shape, .. } => assert!((shape - 1.0).abs() < 1e-12),
            other => panic!("expected gamma, got {:?}", other),
        }
    }

    #[test]
    fn test_weibull_shape_solves_cv() {
        for target in [0.5, 1.0, 2.0, 3.0] {
            let k = weibull_shape_from_cv(target);
            assert!((weibull_cv(k) - target).abs() < 0.01, "cv {} -> k {}", target, k);
        }
        // CV = 1 is the exponential special case
        assert!((weibull_shape_from_cv(1.0) - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_weibull_mean_matches_rate() {
        let rate = 1.0 / 5_000.0;
        let sampler = ArrivalSampler::new(&ArrivalSpec::weibull(1.5), rate);
        let (mean, _) = moments(&sampler, 50_000, 11);
        assert!((mean - 5_000.0).abs() / 5_000.0 < 0.05, "mean {}", mean);
    }

    #[test]
    fn test_weibull_out_of_range_returns_endpoint() {
        let k = weibull_shape_from_cv(1_000.0);
        assert!(k < 0.2, "k {}", k);
    }

    #[test]
    fn test_constant_iat() {
        let sampler = ArrivalSampler::new(&ArrivalSpec::constant(), 1.0 / 2_500.0);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert!((0..10).all(|_| sampler.sample_iat(&mut rng) == 2_500));
    }

    #[test]
    fn test_rate_floor() {
        for process in ArrivalProcess::ALL {
            let spec = ArrivalSpec { process, cv: Some(1.5) };
            let sampler = ArrivalSampler::new(&spec, 0.0);
            let mut rng = ChaCha8Rng::seed_from_u64(3);
            for _ in 0..100 {
                assert!(sampler.sample_iat(&mut rng) >= 1, "{}", process);
            }
        }
    }

    #[test]
    fn test_high_rate_floors_iat_at_one() {
        let sampler = ArrivalSampler::new(&ArrivalSpec::poisson(), 1e6);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        assert!((0..1000).all(|_| sampler.sample_iat(&mut rng) == 1));
    }

    #[test]
    fn test_unknown_process() {
        let err = "burst".parse::<ArrivalProcess>().unwrap_err();
        assert!(err.to_string().contains("unknown arrival process"));
    }
}

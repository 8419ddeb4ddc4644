//! Token-length distributions for workload generation
//!
//! Every request carries an input and an output length drawn from one of a
//! closed set of shapes:
//! - Gaussian (clamped to `[min, max]`)
//! - Exponential
//! - Pareto / LogNormal mixture (heavy-tailed prompts)
//! - Empirical PMF (inline or loaded from a CSV file)
//! - Constant
//!
//! [`DistSpec`] is the declarative form found in workload files and
//! [`LengthDistribution::from_spec`] is the single validating factory. All
//! required-parameter checks live there, so a missing parameter fails the
//! same way for every variant.
//!
//! Samples are always `>= 1`; non-finite intermediate values are clamped
//! rather than propagated.

use anyhow::{bail, Context};
use rand::Rng;
use rand_distr::{Distribution as _, Exp1, StandardNormal};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Distribution type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DistKind {
    Gaussian,
    Exponential,
    ParetoLognormal,
    Empirical,
    Constant,
}

impl DistKind {
    pub const ALL: [DistKind; 5] = [
        DistKind::Gaussian,
        DistKind::Exponential,
        DistKind::ParetoLognormal,
        DistKind::Empirical,
        DistKind::Constant,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DistKind::Gaussian => "gaussian",
            DistKind::Exponential => "exponential",
            DistKind::ParetoLognormal => "pareto_lognormal",
            DistKind::Empirical => "empirical",
            DistKind::Constant => "constant",
        }
    }

    /// Parameters that must be present for this variant
    pub fn required_params(&self) -> &'static [&'static str] {
        match self {
            DistKind::Gaussian => &["mean", "std_dev", "min", "max"],
            DistKind::Exponential => &["mean"],
            DistKind::ParetoLognormal => &["alpha", "xm", "mu", "sigma", "mix_weight"],
            DistKind::Empirical => &[],
            DistKind::Constant => &["value"],
        }
    }
}

impl fmt::Display for DistKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match DistKind::ALL.iter().find(|k| k.as_str() == s) {
            Some(kind) => Ok(*kind),
            None => {
                let valid: Vec<&str> = DistKind::ALL.iter().map(|k| k.as_str()).collect();
                bail!("unknown distribution type {:?} (valid: {})", s, valid.join(", "))
            }
        }
    }
}

impl TryFrom<String> for DistKind {
    type Error = anyhow::Error;

    fn try_from(value: String) -> anyhow::Result<Self> {
        value.parse()
    }
}

impl From<DistKind> for String {
    fn from(kind: DistKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Declarative token-length distribution
///
/// For `empirical`, `params` keys are integer token counts mapped to
/// (unnormalised) probabilities, or `file` points at a `tokens,probability`
/// CSV file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct DistSpec {
    #[serde(rename = "type")]
    #[cfg_attr(feature = "schema", schemars(with = "String"))]
    pub kind: DistKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, f64>,
}

impl DistSpec {
    pub fn new(kind: DistKind) -> Self {
        Self { kind, params: BTreeMap::new(), file: None }
    }

    /// Builder-style parameter setter
    pub fn with_param(mut self, key: &str, value: f64) -> Self {
        self.params.insert(key.to_string(), value);
        self
    }

    pub fn constant(value: f64) -> Self {
        Self::new(DistKind::Constant).with_param("value", value)
    }

    pub fn exponential(mean: f64) -> Self {
        Self::new(DistKind::Exponential).with_param("mean", mean)
    }

    pub fn gaussian(mean: f64, std_dev: f64, min: f64, max: f64) -> Self {
        Self::new(DistKind::Gaussian)
            .with_param("mean", mean)
            .with_param("std_dev", std_dev)
            .with_param("min", min)
            .with_param("max", max)
    }

    /// Inline empirical PMF from `(token_count, probability)` pairs
    pub fn empirical<I>(pmf: I) -> Self
    where
        I: IntoIterator<Item = (u32, f64)>,
    {
        let params = pmf.into_iter().map(|(k, p)| (k.to_string(), p)).collect();
        Self { kind: DistKind::Empirical, params, file: None }
    }

    /// Check that all variant-specific parameters are present
    pub fn require_params(&self) -> anyhow::Result<()> {
        for key in self.kind.required_params() {
            if !self.params.contains_key(*key) {
                bail!("distribution requires parameter {:?}", key);
            }
        }
        if self.kind == DistKind::Empirical && self.file.is_none() && self.params.is_empty() {
            bail!("empirical distribution requires a file path or inline params");
        }
        Ok(())
    }
}

/// A constructed, ready-to-sample length distribution
#[derive(Debug, Clone, PartialEq)]
pub enum LengthDistribution {
    Gaussian { mean: f64, std_dev: f64, min: i64, max: i64 },
    Exponential { mean: f64 },
    ParetoLognormal { alpha: f64, xm: f64, mu: f64, sigma: f64, mix_weight: f64 },
    Empirical(EmpiricalPmf),
    Constant { value: u32 },
}

impl LengthDistribution {
    /// Build a sampler from its declarative form
    ///
    /// Fails on missing parameters, non-integer empirical keys, or an
    /// unreadable empirical file.
    pub fn from_spec(spec: &DistSpec) -> anyhow::Result<Self> {
        spec.require_params()?;
        let p = |key: &str| spec.params.get(key).copied().unwrap_or_default();

        let dist = match spec.kind {
            DistKind::Gaussian => LengthDistribution::Gaussian {
                mean: p("mean"),
                std_dev: p("std_dev"),
                min: p("min") as i64,
                max: p("max") as i64,
            },
            DistKind::Exponential => LengthDistribution::Exponential { mean: p("mean") },
            DistKind::ParetoLognormal => LengthDistribution::ParetoLognormal {
                alpha: p("alpha"),
                xm: p("xm"),
                mu: p("mu"),
                sigma: p("sigma"),
                mix_weight: p("mix_weight"),
            },
            DistKind::Constant => {
                LengthDistribution::Constant { value: to_token_count(p("value").trunc()) }
            }
            DistKind::Empirical => {
                let pmf = match &spec.file {
                    Some(path) => load_pmf_file(path)?,
                    None => parse_inline_pmf(&spec.params)?,
                };
                if pmf.is_empty() {
                    bail!("empirical distribution has no valid bins");
                }
                LengthDistribution::Empirical(EmpiricalPmf::new(pmf))
            }
        };
        Ok(dist)
    }

    /// Draw a token count (always >= 1)
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        match self {
            LengthDistribution::Gaussian { mean, std_dev, min, max } => {
                if min == max {
                    return (*min).max(1) as u32;
                }
                let z: f64 = StandardNormal.sample(rng);
                let val = z * std_dev + mean;
                let clamped = val.max(*min as f64).min(*max as f64);
                to_token_count(clamped)
            }
            LengthDistribution::Exponential { mean } => {
                let e: f64 = Exp1.sample(rng);
                to_token_count(e * mean)
            }
            LengthDistribution::ParetoLognormal { alpha, xm, mu, sigma, mix_weight } => {
                let val = if rng.random::<f64>() < *mix_weight {
                    // Inverse transform xm / U^(1/alpha); U == 0 would give +Inf
                    let mut u: f64 = rng.random();
                    if u == 0.0 {
                        u = f64::MIN_POSITIVE;
                    }
                    xm / u.powf(1.0 / alpha)
                } else {
                    let z: f64 = StandardNormal.sample(rng);
                    (mu + sigma * z).exp()
                };
                to_token_count(val)
            }
            LengthDistribution::Empirical(pmf) => pmf.sample(rng),
            LengthDistribution::Constant { value } => *value,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LengthDistribution::Gaussian { .. } => "Gaussian",
            LengthDistribution::Exponential { .. } => "Exponential",
            LengthDistribution::ParetoLognormal { .. } => "ParetoLogNormal",
            LengthDistribution::Empirical(_) => "Empirical",
            LengthDistribution::Constant { .. } => "Constant",
        }
    }
}

/// Round to a positive token count; non-finite values collapse to 1
fn to_token_count(val: f64) -> u32 {
    if !val.is_finite() {
        return 1;
    }
    let rounded = val.round();
    if rounded < 1.0 {
        1
    } else {
        rounded.min(u32::MAX as f64) as u32
    }
}

/// Empirical PMF sampled by inverse CDF
///
/// Support values are sorted ascending, probabilities renormalised, and the
/// final CDF entry pinned to exactly 1.0 so a uniform draw always lands.
#[derive(Debug, Clone, PartialEq)]
pub struct EmpiricalPmf {
    values: Vec<u32>,
    cdf: Vec<f64>,
}

impl EmpiricalPmf {
    /// Build from `token_count -> probability`; non-positive mass is dropped
    pub fn new(pmf: BTreeMap<u32, f64>) -> Self {
        let total: f64 = pmf.values().filter(|p| **p > 0.0).sum();

        let mut values = Vec::with_capacity(pmf.len());
        let mut cdf = Vec::with_capacity(pmf.len());
        let mut cumulative = 0.0;
        for (value, p) in pmf {
            if p <= 0.0 || !p.is_finite() {
                continue;
            }
            cumulative += p / total;
            values.push(value);
            cdf.push(cumulative);
        }
        if let Some(last) = cdf.last_mut() {
            *last = 1.0;
        }

        Self { values, cdf }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        match self.values.len() {
            0 => 1,
            1 => self.values[0].max(1),
            n => {
                let u: f64 = rng.random();
                let idx = self.cdf.partition_point(|c| *c < u).min(n - 1);
                self.values[idx].max(1)
            }
        }
    }

    /// Support values in ascending order
    pub fn values(&self) -> &[u32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn parse_inline_pmf(params: &BTreeMap<String, f64>) -> anyhow::Result<BTreeMap<u32, f64>> {
    let mut pmf = BTreeMap::new();
    for (key, p) in params {
        let tokens: u32 = key
            .trim()
            .parse()
            .with_context(|| format!("empirical PDF key {:?} is not an integer", key))?;
        pmf.insert(tokens, *p);
    }
    Ok(pmf)
}

#[derive(Debug, Deserialize)]
struct PmfRow {
    tokens: u32,
    probability: f64,
}

/// Load a `tokens,probability` CSV file into a PMF
pub fn load_pmf_file(path: &Path) -> anyhow::Result<BTreeMap<u32, f64>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open empirical distribution file: {}", path.display()))?;

    let mut pmf = BTreeMap::new();
    for (line, row) in reader.deserialize::<PmfRow>().enumerate() {
        let row = row.with_context(|| {
            format!("Failed to parse row {} of empirical file {}", line + 1, path.display())
        })?;
        *pmf.entry(row.tokens).or_insert(0.0) += row.probability;
    }
    Ok(pmf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(42)
    }

    #[test]
    fn test_gaussian_clamped() {
        let dist = LengthDistribution::from_spec(&DistSpec::gaussian(100.0, 500.0, 10.0, 200.0))
            .unwrap();
        let mut rng = rng();
        for _ in 0..10_000 {
            let v = dist.sample(&mut rng);
            assert!((10..=200).contains(&v), "sample {} out of [10, 200]", v);
        }
    }

    #[test]
    fn test_gaussian_degenerate_range() {
        let dist =
            LengthDistribution::from_spec(&DistSpec::gaussian(100.0, 50.0, 64.0, 64.0)).unwrap();
        let mut rng = rng();
        assert!((0..100).all(|_| dist.sample(&mut rng) == 64));
    }

    #[test]
    fn test_gaussian_floor_at_one() {
        let dist =
            LengthDistribution::from_spec(&DistSpec::gaussian(-50.0, 1.0, -100.0, 10.0)).unwrap();
        let mut rng = rng();
        assert!((0..100).all(|_| dist.sample(&mut rng) == 1));
    }

    #[test]
    fn test_exponential_mean() {
        let dist = LengthDistribution::from_spec(&DistSpec::exponential(256.0)).unwrap();
        let mut rng = rng();
        let n = 50_000;
        let mean = (0..n).map(|_| dist.sample(&mut rng) as f64).sum::<f64>() / n as f64;
        assert!((mean - 256.0).abs() / 256.0 < 0.05, "mean {}", mean);
    }

    #[test]
    fn test_pareto_lognormal_always_positive() {
        let spec = DistSpec::new(DistKind::ParetoLognormal)
            .with_param("alpha", 0.05)
            .with_param("xm", 1e300)
            .with_param("mu", 800.0)
            .with_param("sigma", 50.0)
            .with_param("mix_weight", 0.5);
        let dist = LengthDistribution::from_spec(&spec).unwrap();
        let mut rng = rng();
        for _ in 0..10_000 {
            assert!(dist.sample(&mut rng) >= 1);
        }
    }

    #[test]
    fn test_empirical_single_value() {
        let dist = LengthDistribution::from_spec(&DistSpec::empirical([(77, 0.3)])).unwrap();
        let mut rng = rng();
        assert!((0..1000).all(|_| dist.sample(&mut rng) == 77));
    }

    #[test]
    fn test_empirical_renormalizes() {
        // Weights sum to 4; 100 should come out ~25% of the time
        let dist =
            LengthDistribution::from_spec(&DistSpec::empirical([(100, 1.0), (200, 3.0)])).unwrap();
        let mut rng = rng();
        let n = 40_000;
        let hits = (0..n).filter(|_| dist.sample(&mut rng) == 100).count();
        let frac = hits as f64 / n as f64;
        assert!((frac - 0.25).abs() < 0.02, "fraction {}", frac);
    }

    #[test]
    fn test_empirical_skips_nonpositive_mass() {
        let pmf = EmpiricalPmf::new(BTreeMap::from([(5, 0.0), (10, -1.0), (20, 2.0)]));
        assert_eq!(pmf.values(), &[20]);
        let mut rng = rng();
        assert_eq!(pmf.sample(&mut rng), 20);
    }

    #[test]
    fn test_empirical_empty_support_samples_one() {
        let pmf = EmpiricalPmf::new(BTreeMap::new());
        let mut rng = rng();
        assert_eq!(pmf.sample(&mut rng), 1);
    }

    #[test]
    fn test_empirical_rejects_non_integer_key() {
        let spec = DistSpec::new(DistKind::Empirical).with_param("abc", 1.0);
        let err = LengthDistribution::from_spec(&spec).unwrap_err();
        assert!(err.to_string().contains("not an integer"));
    }

    #[test]
    fn test_empirical_from_file() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "tokens,probability").unwrap();
        writeln!(file, "128,0.5").unwrap();
        writeln!(file, "256,0.5").unwrap();
        file.flush().unwrap();

        let mut spec = DistSpec::new(DistKind::Empirical);
        spec.file = Some(file.path().to_path_buf());
        let dist = LengthDistribution::from_spec(&spec).unwrap();
        let mut rng = rng();
        for _ in 0..100 {
            let v = dist.sample(&mut rng);
            assert!(v == 128 || v == 256);
        }
    }

    #[test]
    fn test_constant_floor() {
        let dist = LengthDistribution::from_spec(&DistSpec::constant(0.0)).unwrap();
        assert_eq!(dist.sample(&mut rng()), 1);
        let dist = LengthDistribution::from_spec(&DistSpec::constant(42.0)).unwrap();
        assert_eq!(dist.sample(&mut rng()), 42);
    }

    #[test]
    fn test_missing_param_rejected_uniformly() {
        for kind in DistKind::ALL {
            if kind == DistKind::Empirical {
                let err = LengthDistribution::from_spec(&DistSpec::new(kind)).unwrap_err();
                assert!(err.to_string().contains("file path or inline params"));
                continue;
            }
            let err = LengthDistribution::from_spec(&DistSpec::new(kind)).unwrap_err();
            assert!(
                err.to_string().contains("distribution requires parameter"),
                "{}: {}",
                kind,
                err
            );
        }
    }

    #[test]
    fn test_unknown_type_tag() {
        let err = "zipf".parse::<DistKind>().unwrap_err();
        assert!(err.to_string().contains("unknown distribution type"));
        assert_eq!("pareto_lognormal".parse::<DistKind>().unwrap(), DistKind::ParetoLognormal);
    }

    #[test]
    fn test_to_token_count_guards() {
        assert_eq!(to_token_count(f64::NAN), 1);
        assert_eq!(to_token_count(f64::INFINITY), 1);
        assert_eq!(to_token_count(0.4), 1);
        assert_eq!(to_token_count(2.5), 3);
        assert_eq!(to_token_count(1e20), u32::MAX);
    }
}

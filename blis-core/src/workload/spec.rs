//! Declarative workload specification
//!
//! A [`WorkloadSpec`] is read from TOML with strict parsing: unknown keys and
//! unknown enum values are rejected at load time. [`WorkloadSpec::validate`]
//! then checks numeric ranges and required distribution parameters before
//! any sampling happens. Errors name the offending field path, e.g.
//! `clients[2].arrival.cv`.

use crate::error::{Error, Result};
use crate::workload::inference_perf::InferencePerfSpec;
use blis_common::arrival::WEIBULL_CV_RANGE;
use blis_common::{ArrivalProcess, ArrivalSpec, DistSpec};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

pub const SPEC_VERSION: &str = "2";

/// Traffic priority tier attached to every request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SloClass {
    Critical,
    Standard,
    Sheddable,
    Batch,
    Background,
}

impl SloClass {
    pub const ALL: [SloClass; 5] = [
        SloClass::Critical,
        SloClass::Standard,
        SloClass::Sheddable,
        SloClass::Batch,
        SloClass::Background,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SloClass::Critical => "critical",
            SloClass::Standard => "standard",
            SloClass::Sheddable => "sheddable",
            SloClass::Batch => "batch",
            SloClass::Background => "background",
        }
    }
}

impl fmt::Display for SloClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for SloClass {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, String> {
        // v1 names are still accepted
        match value.as_str() {
            "realtime" => {
                tracing::warn!("slo_class \"realtime\" is deprecated; use \"critical\"");
                return Ok(SloClass::Critical);
            }
            "interactive" => {
                tracing::warn!("slo_class \"interactive\" is deprecated; use \"standard\"");
                return Ok(SloClass::Standard);
            }
            _ => {}
        }
        SloClass::ALL.iter().find(|c| c.as_str() == value).copied().ok_or_else(|| {
            format!(
                "unknown slo_class {:?}; valid: critical, standard, sheddable, batch, background",
                value
            )
        })
    }
}

impl From<SloClass> for String {
    fn from(class: SloClass) -> Self {
        class.as_str().to_string()
    }
}

/// Workload category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Language,
    Multimodal,
    Reasoning,
}

/// How a multi-turn session grows its input between rounds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum ContextGrowth {
    /// Each round carries only freshly sampled input
    #[default]
    None,
    /// Each round prepends the full conversation history
    Accumulate,
}

/// Top-level workload specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct WorkloadSpec {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub seed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    /// Aggregate request rate across all clients (requests per second)
    #[serde(default)]
    pub aggregate_rate: f64,
    /// Generation horizon in microseconds, used when the caller supplies none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub horizon_us: Option<i64>,
    /// Total request cap; 0 means horizon only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_requests: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clients: Vec<ClientSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cohorts: Vec<CohortSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub servegen_data: Option<ServeGenDataSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inference_perf: Option<InferencePerfSpec>,
}

fn default_version() -> String {
    SPEC_VERSION.to_string()
}

impl Default for WorkloadSpec {
    fn default() -> Self {
        Self {
            version: default_version(),
            seed: 0,
            category: None,
            aggregate_rate: 0.0,
            horizon_us: None,
            num_requests: None,
            clients: Vec::new(),
            cohorts: Vec::new(),
            servegen_data: None,
            inference_perf: None,
        }
    }
}

/// One traffic source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct ClientSpec {
    pub id: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "schema", schemars(with = "Option<String>"))]
    pub slo_class: Option<SloClass>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Relative share of the aggregate rate; normalised across all clients
    pub rate_fraction: f64,
    #[serde(default)]
    pub streaming: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix_group: Option<String>,
    /// Shared prefix length in tokens for this client's prefix group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix_length: Option<i64>,
    pub arrival: ArrivalSpec,
    pub input_distribution: DistSpec,
    pub output_distribution: DistSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifecycle: Option<LifecycleSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multimodal: Option<MultimodalSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<ReasoningSpec>,
}

impl ClientSpec {
    /// A minimal client with the given arrival and length distributions
    pub fn new(
        id: impl Into<String>,
        rate_fraction: f64,
        arrival: ArrivalSpec,
        input_distribution: DistSpec,
        output_distribution: DistSpec,
    ) -> Self {
        Self {
            id: id.into(),
            tenant_id: String::new(),
            slo_class: None,
            model: None,
            rate_fraction,
            streaming: false,
            prefix_group: None,
            prefix_length: None,
            arrival,
            input_distribution,
            output_distribution,
            network: None,
            lifecycle: None,
            multimodal: None,
            reasoning: None,
        }
    }

    pub fn slo_str(&self) -> &'static str {
        self.slo_class.map(|c| c.as_str()).unwrap_or("")
    }

    /// Whether each arrival starts a multi-round session
    pub fn is_multi_turn(&self) -> bool {
        self.reasoning.as_ref().is_some_and(|r| r.multi_turn.is_some())
    }
}

/// Client-side network characteristics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct NetworkSpec {
    pub rtt_ms: f64,
    #[serde(default)]
    pub bandwidth_mbps: f64,
}

/// Explicit activity windows for a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct LifecycleSpec {
    pub windows: Vec<ActiveWindow>,
}

impl LifecycleSpec {
    /// Whether `time_us` falls inside any window
    pub fn is_active(&self, time_us: i64) -> bool {
        self.windows.iter().any(|w| w.contains(time_us))
    }
}

/// Half-open interval `[start_us, end_us)` during which a client may emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct ActiveWindow {
    pub start_us: i64,
    pub end_us: i64,
}

impl ActiveWindow {
    pub fn new(start_us: i64, end_us: i64) -> Self {
        Self { start_us, end_us }
    }

    pub fn contains(&self, time_us: i64) -> bool {
        time_us >= self.start_us && time_us < self.end_us
    }

    pub fn duration_us(&self) -> i64 {
        self.end_us - self.start_us
    }
}

/// Composite multimodal input
///
/// A modality contributes only when both its per-item token distribution
/// and its item-count distribution are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct MultimodalSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_distribution: Option<DistSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_distribution: Option<DistSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_count_distribution: Option<DistSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_distribution: Option<DistSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_count_distribution: Option<DistSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_distribution: Option<DistSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_count_distribution: Option<DistSpec>,
}

impl MultimodalSpec {
    /// All configured distributions with their field names
    pub fn distributions(&self) -> impl Iterator<Item = (&'static str, &DistSpec)> {
        [
            ("text_distribution", &self.text_distribution),
            ("image_distribution", &self.image_distribution),
            ("image_count_distribution", &self.image_count_distribution),
            ("audio_distribution", &self.audio_distribution),
            ("audio_count_distribution", &self.audio_count_distribution),
            ("video_distribution", &self.video_distribution),
            ("video_count_distribution", &self.video_count_distribution),
        ]
        .into_iter()
        .filter_map(|(name, dist)| dist.as_ref().map(|d| (name, d)))
    }
}

/// Reasoning behaviour: reason ratio and multi-turn sessions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct ReasoningSpec {
    /// Reason ratio sampled as an integer percentage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_ratio_distribution: Option<DistSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_turn: Option<MultiTurnSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct MultiTurnSpec {
    pub max_rounds: i64,
    #[serde(default)]
    pub think_time_us: i64,
    #[serde(default)]
    pub context_growth: ContextGrowth,
}

/// A population of structurally identical clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct CohortSpec {
    pub id: String,
    pub population: i64,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "schema", schemars(with = "Option<String>"))]
    pub slo_class: Option<SloClass>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Aggregate fraction for the whole cohort, split evenly across members
    pub rate_fraction: f64,
    #[serde(default)]
    pub streaming: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix_group: Option<String>,
    pub arrival: ArrivalSpec,
    pub input_distribution: DistSpec,
    pub output_distribution: DistSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diurnal: Option<DiurnalSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spike: Option<SpikeSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drain: Option<DrainSpec>,
}

/// Daily on/off duty cycle peaking at `peak_hour`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct DiurnalSpec {
    pub peak_hour: i64,
    pub peak_to_trough_ratio: f64,
    /// Maximum random offset of each member's window start within its hour
    #[serde(default)]
    pub jitter_us: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct SpikeSpec {
    pub start_time_us: i64,
    pub duration_us: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct DrainSpec {
    pub start_time_us: i64,
    pub ramp_duration_us: i64,
}

/// Directory of ServeGen trace chunks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct ServeGenDataSpec {
    pub path: PathBuf,
    /// Only consider windows starting at or after this time (seconds, 0 = unbounded)
    #[serde(default)]
    pub span_start: i64,
    /// Only consider windows starting before this time (seconds, 0 = unbounded)
    #[serde(default)]
    pub span_end: i64,
}

impl WorkloadSpec {
    /// Load a spec from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::spec(format!("parsing {}: {}", path.display(), e)))
    }

    /// Parse a spec from TOML text (strict: unknown keys are rejected)
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut spec: WorkloadSpec = toml::from_str(content)?;
        spec.upgrade();
        Ok(spec)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| Error::Other(format!("serializing workload spec: {e}")))
    }

    /// Bring a v1 spec up to the current version
    ///
    /// SLO names are already mapped during parsing.
    fn upgrade(&mut self) {
        if self.version.is_empty() || self.version == "1" {
            self.version = SPEC_VERSION.to_string();
        }
    }

    /// Whether the spec has something that produces clients
    pub fn has_client_source(&self) -> bool {
        !self.clients.is_empty()
            || !self.cohorts.is_empty()
            || self.servegen_data.is_some()
            || self.inference_perf.is_some()
    }

    /// Validate every field; the first failure is returned with its path
    pub fn validate(&self) -> Result<()> {
        if !self.aggregate_rate.is_finite() || self.aggregate_rate <= 0.0 {
            return Err(Error::spec(format!(
                "aggregate_rate: must be a finite positive number, got {}",
                self.aggregate_rate
            )));
        }
        if !self.has_client_source() {
            return Err(Error::spec(
                "at least one client, cohort, servegen_data or inference_perf section required",
            ));
        }
        if let Some(n) = self.num_requests {
            if n < 0 {
                return Err(Error::spec(format!("num_requests: must be non-negative, got {n}")));
            }
        }
        if let Some(h) = self.horizon_us {
            if h < 0 {
                return Err(Error::spec(format!("horizon_us: must be non-negative, got {h}")));
            }
        }

        let mut ids = HashSet::new();
        for (i, client) in self.clients.iter().enumerate() {
            let path = format!("clients[{i}]");
            validate_client(client, &path)?;
            if !ids.insert(client.id.as_str()) {
                return Err(Error::spec(format!("{path}.id: duplicate client id {:?}", client.id)));
            }
        }
        for (i, cohort) in self.cohorts.iter().enumerate() {
            validate_cohort(cohort, &format!("cohorts[{i}]"))?;
        }
        if let Some(ip) = &self.inference_perf {
            ip.validate()?;
        }
        Ok(())
    }
}

fn validate_client(c: &ClientSpec, path: &str) -> Result<()> {
    if c.id.is_empty() {
        return Err(Error::spec(format!("{path}.id: must not be empty")));
    }
    validate_finite_positive(&format!("{path}.rate_fraction"), c.rate_fraction)?;
    validate_arrival(&c.arrival, &format!("{path}.arrival"))?;
    if let Some(len) = c.prefix_length {
        if len < 0 {
            return Err(Error::spec(format!(
                "{path}.prefix_length: must be non-negative, got {len}"
            )));
        }
    }
    validate_dist(&c.input_distribution, &format!("{path}.input_distribution"))?;
    validate_dist(&c.output_distribution, &format!("{path}.output_distribution"))?;

    if let Some(network) = &c.network {
        if !network.rtt_ms.is_finite() || network.rtt_ms < 0.0 {
            return Err(Error::spec(format!("{path}.network.rtt_ms: must be non-negative")));
        }
        if !network.bandwidth_mbps.is_finite() || network.bandwidth_mbps < 0.0 {
            return Err(Error::spec(format!(
                "{path}.network.bandwidth_mbps: must be non-negative"
            )));
        }
    }
    if let Some(lifecycle) = &c.lifecycle {
        for (j, w) in lifecycle.windows.iter().enumerate() {
            if w.start_us < 0 || w.start_us >= w.end_us {
                return Err(Error::spec(format!(
                    "{path}.lifecycle.windows[{j}]: need 0 <= start_us < end_us, got [{}, {})",
                    w.start_us, w.end_us
                )));
            }
        }
    }
    if let Some(mm) = &c.multimodal {
        for (name, dist) in mm.distributions() {
            validate_dist(dist, &format!("{path}.multimodal.{name}"))?;
        }
    }
    if let Some(reasoning) = &c.reasoning {
        if let Some(dist) = &reasoning.reason_ratio_distribution {
            validate_dist(dist, &format!("{path}.reasoning.reason_ratio_distribution"))?;
        }
        if let Some(mt) = &reasoning.multi_turn {
            if mt.max_rounds < 1 {
                return Err(Error::spec(format!(
                    "{path}.reasoning.multi_turn.max_rounds: must be at least 1, got {}",
                    mt.max_rounds
                )));
            }
            if mt.think_time_us < 0 {
                return Err(Error::spec(format!(
                    "{path}.reasoning.multi_turn.think_time_us: must be non-negative, got {}",
                    mt.think_time_us
                )));
            }
        }
    }
    Ok(())
}

fn validate_cohort(c: &CohortSpec, path: &str) -> Result<()> {
    if c.id.is_empty() {
        return Err(Error::spec(format!("{path}.id: must not be empty")));
    }
    if c.population <= 0 {
        return Err(Error::spec(format!(
            "{path}.population: must be positive, got {}",
            c.population
        )));
    }
    validate_finite_positive(&format!("{path}.rate_fraction"), c.rate_fraction)?;
    validate_arrival(&c.arrival, &format!("{path}.arrival"))?;
    validate_dist(&c.input_distribution, &format!("{path}.input_distribution"))?;
    validate_dist(&c.output_distribution, &format!("{path}.output_distribution"))?;

    if let Some(d) = &c.diurnal {
        if !(0..24).contains(&d.peak_hour) {
            return Err(Error::spec(format!(
                "{path}.diurnal.peak_hour: must be in [0, 23], got {}",
                d.peak_hour
            )));
        }
        if !d.peak_to_trough_ratio.is_finite() || d.peak_to_trough_ratio < 1.0 {
            return Err(Error::spec(format!(
                "{path}.diurnal.peak_to_trough_ratio: must be >= 1, got {}",
                d.peak_to_trough_ratio
            )));
        }
        if d.jitter_us < 0 {
            return Err(Error::spec(format!(
                "{path}.diurnal.jitter_us: must be non-negative, got {}",
                d.jitter_us
            )));
        }
    }
    if let Some(s) = &c.spike {
        if s.start_time_us < 0 || s.duration_us <= 0 {
            return Err(Error::spec(format!(
                "{path}.spike: need start_time_us >= 0 and duration_us > 0"
            )));
        }
    }
    if let Some(d) = &c.drain {
        if d.start_time_us < 0 {
            return Err(Error::spec(format!(
                "{path}.drain.start_time_us: must be non-negative, got {}",
                d.start_time_us
            )));
        }
        if d.ramp_duration_us <= 0 {
            return Err(Error::spec(format!(
                "{path}.drain.ramp_duration_us: must be positive, got {}",
                d.ramp_duration_us
            )));
        }
    }
    Ok(())
}

fn validate_arrival(arrival: &ArrivalSpec, path: &str) -> Result<()> {
    let Some(cv) = arrival.cv else {
        return Ok(());
    };
    validate_finite_positive(&format!("{path}.cv"), cv)?;
    if arrival.process == ArrivalProcess::Weibull {
        let (lo, hi) = WEIBULL_CV_RANGE;
        if cv < lo || cv > hi {
            return Err(Error::spec(format!(
                "{path}.cv: weibull CV must be in [{lo}, {hi}], got {cv}"
            )));
        }
    }
    Ok(())
}

fn validate_dist(dist: &DistSpec, path: &str) -> Result<()> {
    for (name, value) in &dist.params {
        if !value.is_finite() {
            return Err(Error::spec(format!(
                "{path}.params.{name}: must be a finite number, got {value}"
            )));
        }
    }
    dist.require_params().map_err(|e| Error::spec(format!("{path}: {e}")))
}

fn validate_finite_positive(path: &str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(Error::spec(format!("{path}: must be a finite number, got {value}")));
    }
    if value <= 0.0 {
        return Err(Error::spec(format!("{path}: must be positive, got {value}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        seed = 7
        aggregate_rate = 10.0

        [[clients]]
        id = "chat"
        tenant_id = "tenant-a"
        slo_class = "standard"
        rate_fraction = 1.0
        arrival = { process = "poisson" }
        input_distribution = { type = "exponential", params = { mean = 256.0 } }
        output_distribution = { type = "constant", params = { value = 64.0 } }
    "#;

    fn minimal() -> WorkloadSpec {
        WorkloadSpec::from_toml_str(MINIMAL).unwrap()
    }

    #[test]
    fn test_parse_minimal() {
        let spec = minimal();
        assert_eq!(spec.version, "2");
        assert_eq!(spec.seed, 7);
        assert_eq!(spec.clients.len(), 1);
        assert_eq!(spec.clients[0].slo_class, Some(SloClass::Standard));
        spec.validate().unwrap();
    }

    #[test]
    fn test_unknown_key_rejected() {
        let toml = MINIMAL.replace("seed = 7", "seed = 7\nsede = 8");
        assert!(WorkloadSpec::from_toml_str(&toml).is_err());
    }

    #[test]
    fn test_unknown_arrival_process_rejected() {
        let toml = MINIMAL.replace("\"poisson\"", "\"bursty\"");
        let err = WorkloadSpec::from_toml_str(&toml).unwrap_err();
        assert!(err.to_string().contains("unknown arrival process"), "{}", err);
    }

    #[test]
    fn test_unknown_distribution_rejected() {
        let toml = MINIMAL.replace("\"exponential\"", "\"zipf\"");
        let err = WorkloadSpec::from_toml_str(&toml).unwrap_err();
        assert!(err.to_string().contains("unknown distribution type"), "{}", err);
    }

    #[test]
    fn test_unknown_slo_rejected() {
        let toml = MINIMAL.replace("\"standard\"", "\"gold\"");
        let err = WorkloadSpec::from_toml_str(&toml).unwrap_err();
        assert!(err.to_string().contains("unknown slo_class"), "{}", err);
    }

    #[test]
    fn test_v1_slo_names_upgraded() {
        let toml = MINIMAL
            .replace("\"standard\"", "\"realtime\"")
            .replace("seed = 7", "version = \"1\"\nseed = 7");
        let spec = WorkloadSpec::from_toml_str(&toml).unwrap();
        assert_eq!(spec.version, "2");
        assert_eq!(spec.clients[0].slo_class, Some(SloClass::Critical));

        let toml = MINIMAL.replace("\"standard\"", "\"interactive\"");
        let spec = WorkloadSpec::from_toml_str(&toml).unwrap();
        assert_eq!(spec.clients[0].slo_class, Some(SloClass::Standard));
    }

    #[test]
    fn test_aggregate_rate_must_be_positive() {
        let mut spec = minimal();
        spec.aggregate_rate = 0.0;
        let err = spec.validate().unwrap_err();
        assert!(err.to_string().contains("aggregate_rate"));
    }

    #[test]
    fn test_empty_client_set_rejected() {
        let mut spec = minimal();
        spec.clients.clear();
        let err = spec.validate().unwrap_err();
        assert!(err.to_string().contains("at least one client"));
    }

    #[test]
    fn test_client_error_carries_field_path() {
        let mut spec = minimal();
        spec.clients.push(spec.clients[0].clone());
        spec.clients[1].id = "second".into();
        spec.clients[1].arrival.cv = Some(f64::NAN);
        let err = spec.validate().unwrap_err().to_string();
        assert!(err.contains("clients[1].arrival.cv"), "{}", err);
    }

    #[test]
    fn test_missing_distribution_param_rejected() {
        let mut spec = minimal();
        spec.clients[0].input_distribution.params.clear();
        let err = spec.validate().unwrap_err().to_string();
        assert!(err.contains("clients[0].input_distribution"), "{}", err);
        assert!(err.contains("\"mean\""), "{}", err);
    }

    #[test]
    fn test_non_finite_param_rejected() {
        let mut spec = minimal();
        spec.clients[0].output_distribution.params.insert("value".into(), f64::INFINITY);
        let err = spec.validate().unwrap_err().to_string();
        assert!(err.contains("output_distribution.params.value"), "{}", err);
    }

    #[test]
    fn test_weibull_cv_range() {
        let mut spec = minimal();
        spec.clients[0].arrival = ArrivalSpec::weibull(20.0);
        let err = spec.validate().unwrap_err().to_string();
        assert!(err.contains("weibull CV"), "{}", err);
    }

    #[test]
    fn test_negative_rate_fraction_rejected() {
        let mut spec = minimal();
        spec.clients[0].rate_fraction = -0.5;
        let err = spec.validate().unwrap_err().to_string();
        assert!(err.contains("clients[0].rate_fraction"), "{}", err);
    }

    #[test]
    fn test_duplicate_client_ids_rejected() {
        let mut spec = minimal();
        spec.clients.push(spec.clients[0].clone());
        let err = spec.validate().unwrap_err().to_string();
        assert!(err.contains("duplicate client id"), "{}", err);
    }

    #[test]
    fn test_negative_cap_rejected() {
        let mut spec = minimal();
        spec.num_requests = Some(-1);
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_cohort_validation() {
        let mut spec = minimal();
        spec.cohorts.push(CohortSpec {
            id: "users".into(),
            population: 0,
            tenant_id: String::new(),
            slo_class: None,
            model: None,
            rate_fraction: 0.5,
            streaming: false,
            prefix_group: None,
            arrival: ArrivalSpec::poisson(),
            input_distribution: DistSpec::constant(10.0),
            output_distribution: DistSpec::constant(10.0),
            diurnal: None,
            spike: None,
            drain: None,
        });
        let err = spec.validate().unwrap_err().to_string();
        assert!(err.contains("cohorts[0].population"), "{}", err);

        spec.cohorts[0].population = 3;
        spec.cohorts[0].diurnal =
            Some(DiurnalSpec { peak_hour: 14, peak_to_trough_ratio: 0.5, jitter_us: 0 });
        let err = spec.validate().unwrap_err().to_string();
        assert!(err.contains("peak_to_trough_ratio"), "{}", err);
    }

    #[test]
    fn test_lifecycle_window_order() {
        let mut spec = minimal();
        spec.clients[0].lifecycle =
            Some(LifecycleSpec { windows: vec![ActiveWindow::new(100, 50)] });
        let err = spec.validate().unwrap_err().to_string();
        assert!(err.contains("lifecycle.windows[0]"), "{}", err);
    }

    #[test]
    fn test_toml_round_trip() {
        let spec = minimal();
        let text = spec.to_toml_string().unwrap();
        assert_eq!(WorkloadSpec::from_toml_str(&text).unwrap(), spec);
    }

    #[test]
    fn test_window_half_open() {
        let w = ActiveWindow::new(10, 20);
        assert!(w.contains(10));
        assert!(w.contains(19));
        assert!(!w.contains(20));
    }
}

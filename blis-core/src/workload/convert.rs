//! Building workload specs from other descriptions
//!
//! - legacy distribution parameters and named presets
//! - legacy CSV request traces
//! - ServeGen directories and inference-perf specs, resolved into clients
//! - composition of several specs into one

use crate::error::{Error, Result};
use crate::workload::servegen::load_servegen_clients;
use crate::workload::spec::{Category, ClientSpec, ServeGenDataSpec, WorkloadSpec};
use blis_common::{ArrivalSpec, DistSpec};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Legacy distribution-based workload parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(default, deny_unknown_fields)]
pub struct DistributionParams {
    /// Requests per second
    pub rate: f64,
    pub num_requests: i64,
    pub prefix_tokens: i64,
    pub prompt_tokens_mean: i64,
    pub prompt_tokens_stdev: i64,
    pub prompt_tokens_min: i64,
    pub prompt_tokens_max: i64,
    pub output_tokens_mean: i64,
    pub output_tokens_stdev: i64,
    pub output_tokens_min: i64,
    pub output_tokens_max: i64,
}

impl DistributionParams {
    fn input(&self) -> DistSpec {
        DistSpec::gaussian(
            self.prompt_tokens_mean as f64,
            self.prompt_tokens_stdev as f64,
            self.prompt_tokens_min as f64,
            self.prompt_tokens_max as f64,
        )
    }

    fn output(&self) -> DistSpec {
        DistSpec::gaussian(
            self.output_tokens_mean as f64,
            self.output_tokens_stdev as f64,
            self.output_tokens_min as f64,
            self.output_tokens_max as f64,
        )
    }
}

fn single_client(id: String, params: &DistributionParams) -> WorkloadSpec {
    let mut client =
        ClientSpec::new(id, 1.0, ArrivalSpec::constant(), params.input(), params.output());
    if params.prefix_tokens > 0 {
        client.prefix_group = Some("shared".to_string());
        client.prefix_length = Some(params.prefix_tokens);
    }
    WorkloadSpec {
        category: Some(Category::Language),
        aggregate_rate: params.rate,
        num_requests: Some(params.num_requests),
        clients: vec![client],
        ..WorkloadSpec::default()
    }
}

/// One constant-arrival client with gaussian lengths
pub fn synthesize_from_distribution(params: &DistributionParams) -> WorkloadSpec {
    single_client("distribution".to_string(), params)
}

/// A named preset at the given rate; `preset.rate` and `num_requests` are ignored
pub fn convert_preset(
    name: &str,
    rate: f64,
    num_requests: i64,
    preset: &DistributionParams,
) -> Result<WorkloadSpec> {
    if !rate.is_finite() || rate <= 0.0 {
        return Err(Error::spec(format!("rate must be positive, got {rate}")));
    }
    if num_requests <= 0 {
        return Err(Error::spec(format!("num_requests must be positive, got {num_requests}")));
    }
    let params = DistributionParams { rate, num_requests, ..preset.clone() };
    Ok(single_client(format!("preset-{name}"), &params))
}

/// Convert a legacy CSV trace into a single constant-arrival client
///
/// Columns: arrival time in seconds, two ignored columns, then the prefill
/// and decode tokens as JSON arrays. The first row is a header. Rows after
/// `horizon_us` stop the scan (0 = no limit).
pub fn convert_csv_trace(path: &Path, horizon_us: i64) -> Result<WorkloadSpec> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).flexible(true).from_path(path)?;

    let mut lengths: Vec<(i64, usize, usize)> = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let at = |msg: String| Error::data(format!("{} row {row}: {msg}", path.display()));
        if record.len() < 5 {
            return Err(at(format!("expected at least 5 columns, got {}", record.len())));
        }

        let arrival_s: f64 = record[0]
            .trim()
            .parse()
            .map_err(|_| at(format!("invalid arrival_time {:?}", &record[0])))?;
        let arrival_us = (arrival_s * 1e6) as i64;
        if horizon_us > 0 && arrival_us > horizon_us {
            break;
        }

        let prefill: Vec<i64> = serde_json::from_str(&record[3])
            .map_err(|e| at(format!("invalid prefill_tokens: {e}")))?;
        let decode: Vec<i64> = serde_json::from_str(&record[4])
            .map_err(|e| at(format!("invalid decode_tokens: {e}")))?;
        lengths.push((arrival_us, prefill.len(), decode.len()));
    }

    let (Some(first), Some(last)) = (lengths.first(), lengths.last()) else {
        return Err(Error::data(format!("empty CSV: no data rows in {}", path.display())));
    };

    let n = lengths.len() as f64;
    let mean_input = lengths.iter().map(|l| l.1 as f64).sum::<f64>() / n;
    let mean_output = lengths.iter().map(|l| l.2 as f64).sum::<f64>() / n;

    // All arrivals at one instant are treated as a one-second burst
    let span_us = last.0 - first.0;
    let rate = if span_us > 0 { n / (span_us as f64 / 1e6) } else { n };

    Ok(WorkloadSpec {
        aggregate_rate: rate,
        num_requests: Some(lengths.len() as i64),
        clients: vec![ClientSpec::new(
            "csv-trace",
            1.0,
            ArrivalSpec::constant(),
            DistSpec::constant(mean_input),
            DistSpec::constant(mean_output),
        )],
        ..WorkloadSpec::default()
    })
}

/// Resolve a ServeGen directory into explicit clients
pub fn convert_servegen(path: &Path) -> Result<WorkloadSpec> {
    let data = ServeGenDataSpec { path: path.to_path_buf(), span_start: 0, span_end: 0 };
    let clients = load_servegen_clients(&data)?;
    let rate = clients.iter().map(|c| c.rate_fraction).sum();
    Ok(WorkloadSpec { aggregate_rate: rate, clients, ..WorkloadSpec::default() })
}

/// Expand the `inference_perf` section of a spec file into explicit clients
pub fn convert_inference_perf(path: &Path) -> Result<WorkloadSpec> {
    let spec = WorkloadSpec::from_file(path)?;
    let Some(ip) = &spec.inference_perf else {
        return Err(Error::spec(format!(
            "{} does not contain an inference_perf section",
            path.display()
        )));
    };
    ip.expand(spec.seed)
}

/// Merge several specs into one
///
/// Clients are concatenated and aggregate rates summed. Each client's
/// fraction is its share within its own spec scaled by that spec's share
/// of the total rate, so every source keeps its absolute request rate.
/// Seed and category come from the first spec.
pub fn compose_specs(specs: &[WorkloadSpec]) -> Result<WorkloadSpec> {
    let Some(first) = specs.first() else {
        return Err(Error::spec("at least one spec required"));
    };
    let total_rate: f64 = specs.iter().map(|s| s.aggregate_rate).sum();
    if !total_rate.is_finite() || total_rate <= 0.0 {
        return Err(Error::spec(format!(
            "composed aggregate rate must be positive, got {total_rate}"
        )));
    }

    let mut clients = Vec::new();
    for spec in specs {
        let spec_fraction: f64 = spec.clients.iter().map(|c| c.rate_fraction).sum();
        if spec_fraction <= 0.0 {
            continue;
        }
        let weight = spec.aggregate_rate / total_rate;
        clients.extend(spec.clients.iter().map(|c| ClientSpec {
            rate_fraction: c.rate_fraction / spec_fraction * weight,
            ..c.clone()
        }));
    }

    Ok(WorkloadSpec {
        seed: first.seed,
        category: first.category,
        aggregate_rate: total_rate,
        clients,
        ..WorkloadSpec::default()
    })
}

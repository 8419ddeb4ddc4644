//! Offline calibration against real traces
//!
//! Pairs per-request latencies measured against a real deployment with
//! the simulator's predictions for the same requests, then summarises how
//! well the two agree.
//!
//! # Pipeline
//!
//! 1. [`prepare_pairs`] matches trace records and simulator results by
//!    request id, drops the warm-up prefix, and lifts simulated
//!    server-side latencies to the client's perspective.
//! 2. [`compare`] computes percentiles, MAPE, bias and Pearson r for one
//!    metric.
//! 3. [`build_report`] assembles both metrics into a serialisable
//!    [`CalibrationReport`].

use crate::error::{Error, Result};
use crate::network::transfer_delay_us;
use crate::trace::{TraceHeader, TraceRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// Normalisation applied before comparing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibrationConfig {
    /// Requests with an id below this are excluded
    pub warm_up_requests: u64,
    pub network_rtt_us: i64,
    pub bandwidth_mbps: f64,
}

/// Simulator output for one request; latencies are server-side microseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimResult {
    pub request_id: u64,
    #[serde(alias = "ttft")]
    pub ttft_us: f64,
    #[serde(alias = "e2e")]
    pub e2e_us: f64,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Equal-length real and simulated samples of one metric
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatencyPair {
    pub real: Vec<f64>,
    pub sim: Vec<f64>,
}

impl LatencyPair {
    fn push(&mut self, real: f64, sim: f64) {
        self.real.push(real);
        self.sim.push(sim);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibrationPairs {
    pub ttft: LatencyPair,
    pub e2e: LatencyPair,
    pub token_mismatches: usize,
    pub excluded_warm_up: usize,
    pub matched: usize,
    pub unmatched_real: usize,
    pub unmatched_sim: usize,
}

/// Match real records to simulator results by request id
///
/// Records that failed, or whose timestamps yield a negative latency, count
/// as unmatched rather than entering the comparison.
pub fn prepare_pairs(
    real: &[TraceRecord],
    sim: &[SimResult],
    config: &CalibrationConfig,
) -> CalibrationPairs {
    let sim_by_id: HashMap<u64, &SimResult> = sim.iter().map(|s| (s.request_id, s)).collect();
    let mut matched_ids = HashSet::new();
    let mut pairs = CalibrationPairs::default();
    let rtt = config.network_rtt_us as f64;

    for rec in real {
        if rec.request_id < config.warm_up_requests {
            pairs.excluded_warm_up += 1;
            continue;
        }
        let Some(sr) = sim_by_id.get(&rec.request_id) else {
            pairs.unmatched_real += 1;
            continue;
        };
        matched_ids.insert(rec.request_id);
        pairs.matched += 1;

        if rec.input_tokens != sr.input_tokens || rec.output_tokens != sr.output_tokens {
            pairs.token_mismatches += 1;
        }

        let real_ttft = rec.ttft_us();
        let real_e2e = rec.e2e_us();
        if !rec.is_ok() || real_ttft < 0 || real_e2e < 0 {
            pairs.unmatched_real += 1;
            continue;
        }

        let upload = transfer_delay_us(config.bandwidth_mbps, sr.input_tokens as usize);
        let download = transfer_delay_us(config.bandwidth_mbps, sr.output_tokens as usize);
        pairs.ttft.push(real_ttft as f64, sr.ttft_us + rtt + upload);
        pairs.e2e.push(real_e2e as f64, sr.e2e_us + rtt + upload + download);
    }

    pairs.unmatched_sim = sim.iter().filter(|s| !matched_ids.contains(&s.request_id)).count();
    debug!(
        matched = pairs.matched,
        unmatched_real = pairs.unmatched_real,
        unmatched_sim = pairs.unmatched_sim,
        "Prepared calibration pairs"
    );
    pairs
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Bias {
    OverPredict,
    UnderPredict,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl Quality {
    /// Rate a comparison by MAPE and Pearson r
    pub fn rate(mape: f64, pearson_r: f64) -> Self {
        if mape < 0.10 && pearson_r > 0.95 {
            Quality::Excellent
        } else if mape < 0.20 && pearson_r > 0.85 {
            Quality::Good
        } else if mape < 0.35 && pearson_r > 0.70 {
            Quality::Fair
        } else {
            Quality::Poor
        }
    }
}

/// Real-vs-simulated statistics for one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricComparison {
    pub real_p50: f64,
    pub sim_p50: f64,
    pub real_p90: f64,
    pub sim_p90: f64,
    pub real_p95: f64,
    pub sim_p95: f64,
    pub real_p99: f64,
    pub sim_p99: f64,
    pub mape: f64,
    pub pearson_r: f64,
    /// Absent when every real sample is zero
    pub bias: Option<Bias>,
    pub quality: Quality,
    pub count: usize,
}

fn sorted_copy(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
}

/// Linear-interpolated percentile of an ascending slice
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = p / 100.0 * (n - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = rank.ceil() as usize;
            if lower == upper {
                sorted[lower]
            } else {
                sorted[lower] + (rank - lower as f64) * (sorted[upper] - sorted[lower])
            }
        }
    }
}

/// Pearson correlation; 0 when either side has no variance
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len() as f64;
    let (mut sx, mut sy, mut sxy, mut sx2, mut sy2) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        sx += a;
        sy += b;
        sxy += a * b;
        sx2 += a * a;
        sy2 += b * b;
    }
    let num = n * sxy - sx * sy;
    let den = ((n * sx2 - sx * sx) * (n * sy2 - sy * sy)).sqrt();
    if den == 0.0 || !den.is_finite() {
        return 0.0;
    }
    num / den
}

/// Compare equal-length real and simulated samples of `metric`
pub fn compare(real: &[f64], sim: &[f64], metric: &str) -> Result<MetricComparison> {
    if real.is_empty() || sim.is_empty() {
        return Err(Error::calibration(format!("empty latency vectors for {metric}")));
    }
    if real.len() != sim.len() {
        return Err(Error::calibration(format!(
            "mismatched vector lengths for {}: real={} sim={}",
            metric,
            real.len(),
            sim.len()
        )));
    }

    let real_sorted = sorted_copy(real);
    let sim_sorted = sorted_copy(sim);

    let mut ape_sum = 0.0;
    let mut ape_count = 0usize;
    let mut bias_sum = 0.0;
    for (&r, &s) in real.iter().zip(sim) {
        if r == 0.0 {
            continue;
        }
        ape_sum += (r - s).abs() / r;
        ape_count += 1;
        bias_sum += s - r;
    }
    let (mape, bias) = if ape_count > 0 {
        let bias = if bias_sum > 0.0 {
            Bias::OverPredict
        } else if bias_sum < 0.0 {
            Bias::UnderPredict
        } else {
            Bias::Neutral
        };
        (ape_sum / ape_count as f64, Some(bias))
    } else {
        (0.0, None)
    };

    let pearson_r = if real.len() >= 3 { pearson(real, sim) } else { 0.0 };

    Ok(MetricComparison {
        real_p50: percentile(&real_sorted, 50.0),
        sim_p50: percentile(&sim_sorted, 50.0),
        real_p90: percentile(&real_sorted, 90.0),
        sim_p90: percentile(&sim_sorted, 90.0),
        real_p95: percentile(&real_sorted, 95.0),
        sim_p95: percentile(&sim_sorted, 95.0),
        real_p99: percentile(&real_sorted, 99.0),
        sim_p99: percentile(&sim_sorted, 99.0),
        mape,
        pearson_r,
        bias,
        quality: Quality::rate(mape, pearson_r),
        count: real.len(),
    })
}

/// Which simulator parameters came from the trace header
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigMatch {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matched: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub defaulted: Vec<String>,
}

impl ConfigMatch {
    /// Sort header fields into those the trace recorded and those left default
    pub fn from_header(header: &TraceHeader) -> Self {
        let server = header.server.clone().unwrap_or_default();
        let network = header.network.clone().unwrap_or_default();
        let fields = [
            ("server.type", server.server_type.is_some()),
            ("server.model", server.model.is_some()),
            ("server.tensor_parallel", server.tensor_parallel.is_some()),
            ("server.max_num_seqs", server.max_num_seqs.is_some()),
            ("server.block_size", server.block_size.is_some()),
            ("server.gpu_memory_utilization", server.gpu_memory_utilization.is_some()),
            ("server.max_model_len", server.max_model_len.is_some()),
            ("network.measured_rtt_ms", network.measured_rtt_ms.is_some()),
        ];

        let mut result = Self::default();
        for (name, present) in fields {
            if present {
                result.matched.push(name.to_string());
            } else {
                result.defaulted.push(name.to_string());
            }
        }
        result
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceInfo {
    pub num_requests: usize,
    pub warm_up_excluded: usize,
    pub matched_pairs: usize,
    pub token_mismatches: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub trace_info: TraceInfo,
    /// Keyed by `ttft` and `e2e`
    pub metrics: BTreeMap<String, MetricComparison>,
    pub config_match: ConfigMatch,
    pub known_limitations: Vec<String>,
}

const KNOWN_LIMITATIONS: [&str; 3] = [
    "BLIS models discrete batch steps while real servers use iteration-level continuous batching, which can bias TTFT under high load.",
    "Prefix token ids are synthetic, so prefix cache hit rates can differ from the real server, especially after evictions.",
    "Speculative decoding on the real server changes token generation patterns relative to the sequential decode model.",
];

pub fn build_report(pairs: &CalibrationPairs, config_match: ConfigMatch) -> Result<CalibrationReport> {
    let mut metrics = BTreeMap::new();
    if !pairs.ttft.real.is_empty() {
        metrics.insert("ttft".to_string(), compare(&pairs.ttft.real, &pairs.ttft.sim, "ttft")?);
    }
    if !pairs.e2e.real.is_empty() {
        metrics.insert("e2e".to_string(), compare(&pairs.e2e.real, &pairs.e2e.sim, "e2e")?);
    }

    Ok(CalibrationReport {
        trace_info: TraceInfo {
            num_requests: pairs.matched + pairs.excluded_warm_up + pairs.unmatched_real,
            warm_up_excluded: pairs.excluded_warm_up,
            matched_pairs: pairs.matched,
            token_mismatches: pairs.token_mismatches,
        },
        metrics,
        config_match,
        known_limitations: KNOWN_LIMITATIONS.iter().map(|s| s.to_string()).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{TraceMode, TraceNetworkConfig, TraceServerConfig};

    fn real(id: u64, ttft: i64, e2e: i64) -> TraceRecord {
        TraceRecord {
            request_id: id,
            client_id: "c".to_string(),
            tenant_id: String::new(),
            slo_class: "standard".to_string(),
            session_id: String::new(),
            round_index: 0,
            prefix_group: String::new(),
            streaming: true,
            input_tokens: 100,
            output_tokens: 50,
            text_tokens: 0,
            image_tokens: 0,
            audio_tokens: 0,
            video_tokens: 0,
            reason_ratio: 0.0,
            arrival_time_us: 1_000,
            send_time_us: 1_000,
            first_chunk_time_us: 1_000 + ttft,
            last_chunk_time_us: 1_000 + e2e,
            num_chunks: 50,
            status: "ok".to_string(),
            error_message: String::new(),
        }
    }

    fn sim(id: u64, ttft: f64, e2e: f64) -> SimResult {
        SimResult { request_id: id, ttft_us: ttft, e2e_us: e2e, input_tokens: 100, output_tokens: 50 }
    }

    #[test]
    fn test_prepare_pairs_matching() {
        let mut mismatched = real(3, 100, 900);
        mismatched.output_tokens = 49;
        let records = vec![
            real(0, 100, 900),
            real(1, 100, 900),
            real(2, -5, 900),
            mismatched,
            real(4, 120, 1000),
            real(5, 100, 900),
        ];
        let results = vec![sim(2, 90.0, 800.0), sim(3, 90.0, 800.0), sim(4, 110.0, 950.0), sim(7, 1.0, 2.0)];
        let config = CalibrationConfig { warm_up_requests: 2, ..Default::default() };

        let pairs = prepare_pairs(&records, &results, &config);
        assert_eq!(pairs.excluded_warm_up, 2);
        assert_eq!(pairs.matched, 3);
        // id 2 has a negative TTFT, id 5 has no sim result
        assert_eq!(pairs.unmatched_real, 2);
        assert_eq!(pairs.unmatched_sim, 1);
        assert_eq!(pairs.token_mismatches, 1);
        assert_eq!(pairs.ttft.real, vec![100.0, 120.0]);
        assert_eq!(pairs.ttft.sim, vec![90.0, 110.0]);
        assert_eq!(pairs.e2e.real, vec![900.0, 1000.0]);
    }

    #[test]
    fn test_prepare_pairs_network_adjustment() {
        let config = CalibrationConfig { warm_up_requests: 0, network_rtt_us: 500, bandwidth_mbps: 100.0 };
        let pairs = prepare_pairs(&[real(0, 100, 900)], &[sim(0, 1000.0, 5000.0)], &config);
        // upload 100 tokens = 32us, download 50 tokens = 16us
        assert!((pairs.ttft.sim[0] - 1532.0).abs() < 1e-9);
        assert!((pairs.e2e.sim[0] - 5548.0).abs() < 1e-9);
    }

    #[test]
    fn test_failed_requests_unmatched() {
        let mut failed = real(0, 100, 900);
        failed.status = "timeout".to_string();
        let pairs = prepare_pairs(&[failed], &[sim(0, 1.0, 2.0)], &CalibrationConfig::default());
        assert_eq!(pairs.unmatched_real, 1);
        assert!(pairs.ttft.real.is_empty());
    }

    #[test]
    fn test_percentile_interpolation() {
        let sorted = [10.0, 20.0, 30.0, 40.0, 50.0];
        assert_eq!(percentile(&sorted, 50.0), 30.0);
        assert!((percentile(&sorted, 90.0) - 46.0).abs() < 1e-9);
        assert!((percentile(&sorted, 99.0) - 49.6).abs() < 1e-9);
        assert_eq!(percentile(&[7.0], 99.0), 7.0);
        assert_eq!(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn test_compare_perfect_match() {
        let values: Vec<f64> = (1..=100).map(|v| v as f64 * 10.0).collect();
        let cmp = compare(&values, &values, "ttft").unwrap();
        assert_eq!(cmp.mape, 0.0);
        assert!((cmp.pearson_r - 1.0).abs() < 1e-9);
        assert_eq!(cmp.bias, Some(Bias::Neutral));
        assert_eq!(cmp.quality, Quality::Excellent);
        assert_eq!(cmp.count, 100);
        assert_eq!(cmp.real_p50, cmp.sim_p50);
    }

    #[test]
    fn test_compare_bias_and_mape() {
        let real = [100.0, 200.0, 0.0, 400.0];
        let sim = [110.0, 220.0, 5.0, 440.0];
        let cmp = compare(&real, &sim, "e2e").unwrap();
        assert!((cmp.mape - 0.1).abs() < 1e-9);
        assert_eq!(cmp.bias, Some(Bias::OverPredict));

        let cmp = compare(&[100.0, 100.0], &[50.0, 50.0], "e2e").unwrap();
        assert_eq!(cmp.bias, Some(Bias::UnderPredict));
        // fewer than three samples: no correlation
        assert_eq!(cmp.pearson_r, 0.0);
        assert_eq!(cmp.quality, Quality::Poor);
    }

    #[test]
    fn test_pearson_zero_variance() {
        assert_eq!(pearson(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]), 0.0);
        assert!((pearson(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]) + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_compare_rejects_bad_input() {
        assert!(matches!(compare(&[], &[], "ttft"), Err(Error::Calibration(_))));
        let err = compare(&[1.0, 2.0], &[1.0], "ttft").unwrap_err();
        assert!(err.to_string().contains("mismatched vector lengths for ttft"));
    }

    #[test]
    fn test_quality_thresholds() {
        assert_eq!(Quality::rate(0.05, 0.99), Quality::Excellent);
        assert_eq!(Quality::rate(0.15, 0.90), Quality::Good);
        assert_eq!(Quality::rate(0.30, 0.75), Quality::Fair);
        assert_eq!(Quality::rate(0.05, 0.5), Quality::Poor);
        assert_eq!(Quality::rate(0.40, 0.99), Quality::Poor);
    }

    #[test]
    fn test_build_report() {
        let records: Vec<_> = (0..10).map(|i| real(i, 100 + i as i64 * 10, 1000 + i as i64 * 50)).collect();
        let results: Vec<_> =
            (0..10).map(|i| sim(i, 105.0 + i as f64 * 10.0, 1010.0 + i as f64 * 50.0)).collect();
        let config = CalibrationConfig { warm_up_requests: 3, ..Default::default() };
        let pairs = prepare_pairs(&records, &results, &config);

        let mut header = TraceHeader::new(TraceMode::Real);
        header.server = Some(TraceServerConfig { model: Some("m".to_string()), ..Default::default() });
        header.network = Some(TraceNetworkConfig { measured_rtt_ms: Some(1.0) });
        let report = build_report(&pairs, ConfigMatch::from_header(&header)).unwrap();

        assert_eq!(report.trace_info.num_requests, 10);
        assert_eq!(report.trace_info.warm_up_excluded, 3);
        assert_eq!(report.trace_info.matched_pairs, 7);
        assert_eq!(report.metrics.len(), 2);
        assert_eq!(report.metrics["ttft"].count, 7);
        assert_eq!(report.known_limitations.len(), 3);
        assert_eq!(report.config_match.matched, vec!["server.model", "network.measured_rtt_ms"]);
        assert_eq!(report.config_match.defaulted.len(), 6);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["metrics"]["e2e"]["bias"], "over-predict");
        assert!(json["trace_info"]["matched_pairs"].is_u64());
    }

    #[test]
    fn test_sim_result_json_aliases() {
        let parsed: Vec<SimResult> = serde_json::from_str(
            r#"[{"request_id": 4, "ttft": 12.5, "e2e": 80.0, "input_tokens": 10, "output_tokens": 3}]"#,
        )
        .unwrap();
        assert_eq!(parsed[0], SimResult {
            request_id: 4,
            ttft_us: 12.5,
            e2e_us: 80.0,
            input_tokens: 10,
            output_tokens: 3
        });
    }
}

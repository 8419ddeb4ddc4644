//! Trace v2: persisted request streams
//!
//! A trace is two files: a TOML header describing how the trace was
//! produced, and a CSV data file with one row per request. Timestamps are
//! integer microseconds so that a round trip never loses precision.
//!
//! Generated traces are built with [`records_from_requests`]. Real traces
//! captured against a serving stack carry chunk timings and a status per
//! request, and can be fed back into a simulation with [`replay_requests`].

use crate::error::{Error, Result};
use crate::seed::{components, derive_seed, rng_from_seed};
use crate::workload::generator::{random_token_ids, GenerationConfig};
use blis_common::{ModalityTokens, Request};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const TRACE_VERSION: u32 = 2;

/// Column order of the data file
pub const TRACE_COLUMNS: [&str; 22] = [
    "request_id",
    "client_id",
    "tenant_id",
    "slo_class",
    "session_id",
    "round_index",
    "prefix_group",
    "streaming",
    "input_tokens",
    "output_tokens",
    "text_tokens",
    "image_tokens",
    "audio_tokens",
    "video_tokens",
    "reason_ratio",
    "arrival_time_us",
    "send_time_us",
    "first_chunk_time_us",
    "last_chunk_time_us",
    "num_chunks",
    "status",
    "error_message",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceMode {
    /// Synthesized by the workload generator
    Generated,
    /// Captured from a real serving deployment
    Real,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TraceHeader {
    pub trace_version: u32,
    pub time_unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    pub mode: TraceMode,
    #[serde(default)]
    pub warm_up_requests: u64,
    /// Path of the workload spec the trace was generated from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload_spec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<TraceServerConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<TraceNetworkConfig>,
}

impl TraceHeader {
    pub fn new(mode: TraceMode) -> Self {
        Self {
            trace_version: TRACE_VERSION,
            time_unit: "us".to_string(),
            created_at: None,
            mode,
            warm_up_requests: 0,
            workload_spec: None,
            server: None,
            network: None,
        }
    }
}

/// Serving stack the trace was captured against
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TraceServerConfig {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub server_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tensor_parallel: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_num_seqs: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_memory_utilization: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_model_len: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TraceNetworkConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measured_rtt_ms: Option<f64>,
}

/// One row of the data file
///
/// Empty strings stand for absent session ids and prefix groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub request_id: u64,
    pub client_id: String,
    pub tenant_id: String,
    pub slo_class: String,
    pub session_id: String,
    pub round_index: u32,
    pub prefix_group: String,
    pub streaming: bool,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub text_tokens: u32,
    pub image_tokens: u32,
    pub audio_tokens: u32,
    pub video_tokens: u32,
    pub reason_ratio: f64,
    pub arrival_time_us: i64,
    pub send_time_us: i64,
    pub first_chunk_time_us: i64,
    pub last_chunk_time_us: i64,
    pub num_chunks: u32,
    /// `ok`, `error` or `timeout`
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub error_message: String,
}

fn default_status() -> String {
    "ok".to_string()
}

impl TraceRecord {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }

    /// Time to first token as observed by the client
    pub fn ttft_us(&self) -> i64 {
        self.first_chunk_time_us - self.send_time_us
    }

    /// End-to-end latency as observed by the client
    pub fn e2e_us(&self) -> i64 {
        self.last_chunk_time_us - self.send_time_us
    }

    fn modality(&self) -> Option<ModalityTokens> {
        let m = ModalityTokens {
            text: self.text_tokens,
            image: self.image_tokens,
            audio: self.audio_tokens,
            video: self.video_tokens,
        };
        (m.total() > 0).then_some(m)
    }
}

/// Header and records of a complete trace
#[derive(Debug, Clone, PartialEq)]
pub struct TraceV2 {
    pub header: TraceHeader,
    pub records: Vec<TraceRecord>,
}

impl TraceV2 {
    pub fn new(header: TraceHeader, records: Vec<TraceRecord>) -> Self {
        Self { header, records }
    }

    /// Read a header file and a data file
    pub fn load(header_path: impl AsRef<Path>, data_path: impl AsRef<Path>) -> Result<Self> {
        let header_path = header_path.as_ref();
        let text = fs::read_to_string(header_path).map_err(|e| {
            Error::trace(format!("reading trace header {}: {}", header_path.display(), e))
        })?;
        let header = parse_header(&text)?;

        let data_path = data_path.as_ref();
        let file = fs::File::open(data_path).map_err(|e| {
            Error::trace(format!("opening trace data {}: {}", data_path.display(), e))
        })?;
        let records = read_records(file)?;

        Ok(Self { header, records })
    }

    /// Write the header as TOML and the records as CSV
    pub fn export(&self, header_path: impl AsRef<Path>, data_path: impl AsRef<Path>) -> Result<()> {
        let header = toml::to_string(&self.header)
            .map_err(|e| Error::trace(format!("serializing trace header: {e}")))?;
        fs::write(header_path.as_ref(), header)?;

        let file = fs::File::create(data_path.as_ref())?;
        write_records(file, &self.records)
    }
}

pub fn parse_header(text: &str) -> Result<TraceHeader> {
    let header: TraceHeader =
        toml::from_str(text).map_err(|e| Error::trace(format!("parsing trace header: {e}")))?;
    if header.trace_version != TRACE_VERSION {
        return Err(Error::trace(format!(
            "unsupported trace_version {} (expected {})",
            header.trace_version, TRACE_VERSION
        )));
    }
    Ok(header)
}

pub fn write_records<W: std::io::Write>(writer: W, records: &[TraceRecord]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    if records.is_empty() {
        wtr.write_record(TRACE_COLUMNS)?;
    }
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn read_records<R: std::io::Read>(reader: R) -> Result<Vec<TraceRecord>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers().map_err(|e| Error::trace(format!("reading CSV header: {e}")))?;
    if headers.iter().ne(TRACE_COLUMNS) {
        return Err(Error::trace(format!(
            "unexpected columns {:?}, expected {:?}",
            headers.iter().collect::<Vec<_>>(),
            TRACE_COLUMNS
        )));
    }

    let mut records = Vec::new();
    for (row, result) in rdr.deserialize::<TraceRecord>().enumerate() {
        let mut record =
            result.map_err(|e| Error::trace(format!("data row {}: {}", row + 1, e)))?;
        let trimmed = record.error_message.trim();
        if trimmed.len() != record.error_message.len() {
            record.error_message = trimmed.to_string();
        }
        records.push(record);
    }
    Ok(records)
}

/// Numeric suffix of an assigned `request_{n}` id
fn request_index(id: &str) -> Option<u64> {
    id.strip_prefix("request_")?.parse().ok()
}

/// Trace rows for generated requests
///
/// Send time equals arrival time; chunk timings are left at zero.
pub fn records_from_requests(requests: &[Request]) -> Vec<TraceRecord> {
    requests
        .iter()
        .enumerate()
        .map(|(i, req)| {
            let modality = req.modality.unwrap_or_default();
            TraceRecord {
                request_id: request_index(&req.id).unwrap_or(i as u64),
                client_id: req.client_id.clone(),
                tenant_id: req.tenant_id.clone(),
                slo_class: req.slo_class.clone(),
                session_id: req.session_id.clone().unwrap_or_default(),
                round_index: req.round_index,
                prefix_group: req.prefix_group.clone().unwrap_or_default(),
                streaming: req.streaming,
                input_tokens: req.input_len() as u32,
                output_tokens: req.output_len() as u32,
                text_tokens: modality.text,
                image_tokens: modality.image,
                audio_tokens: modality.audio,
                video_tokens: modality.video,
                reason_ratio: req.reason_ratio.unwrap_or(0.0),
                arrival_time_us: req.arrival_time_us,
                send_time_us: req.arrival_time_us,
                first_chunk_time_us: 0,
                last_chunk_time_us: 0,
                num_chunks: 0,
                status: default_status(),
                error_message: String::new(),
            }
        })
        .collect()
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

/// Rebuild simulator requests from a trace
///
/// Token ids are synthetic. Records sharing a prefix group start with one
/// shared prefix of `default_prefix_length` tokens (cut to the record's
/// input length); the recorded input length is kept exactly.
pub fn replay_requests(
    trace: &TraceV2,
    seed: u64,
    config: &GenerationConfig,
) -> Result<Vec<Request>> {
    if trace.records.is_empty() {
        return Err(Error::trace("empty trace"));
    }

    let mut rng = rng_from_seed(derive_seed(seed, components::REPLAY));

    let mut prefixes: BTreeMap<&str, Vec<u32>> = BTreeMap::new();
    for rec in &trace.records {
        if !rec.prefix_group.is_empty() && !prefixes.contains_key(rec.prefix_group.as_str()) {
            let prefix =
                random_token_ids(&mut rng, config.default_prefix_length, config.vocab_size);
            prefixes.insert(&rec.prefix_group, prefix);
        }
    }

    let requests = trace
        .records
        .iter()
        .map(|rec| {
            let total = rec.input_tokens as usize;
            let mut input_tokens = Vec::with_capacity(total);
            if let Some(prefix) = prefixes.get(rec.prefix_group.as_str()) {
                input_tokens.extend_from_slice(&prefix[..prefix.len().min(total)]);
            }
            let fresh_len = total - input_tokens.len();
            input_tokens.extend(random_token_ids(&mut rng, fresh_len, config.vocab_size));
            let output_tokens =
                random_token_ids(&mut rng, rec.output_tokens as usize, config.vocab_size);

            let mut req =
                Request::new(rec.arrival_time_us, input_tokens, output_tokens, &rec.client_id);
            req.id = format!("request_{}", rec.request_id);
            req.tenant_id = rec.tenant_id.clone();
            req.slo_class = rec.slo_class.clone();
            req.prefix_group = non_empty(&rec.prefix_group);
            req.streaming = rec.streaming;
            req.session_id = non_empty(&rec.session_id);
            req.round_index = rec.round_index;
            req.modality = rec.modality();
            req.reason_ratio = (rec.reason_ratio > 0.0).then_some(rec.reason_ratio);
            req
        })
        .collect();
    Ok(requests)
}

//! ServeGen trace-chunk directory loader
//!
//! A ServeGen directory holds one pair of files per chunk:
//! - `chunk-{id}-trace.csv`: rows `start_time_s, rate, cv, pattern[, ...]`
//! - `chunk-{id}-dataset.json`: window start → `{"input_tokens": "{..}",
//!   "output_tokens": "{..}"}`, where each value is a Python dict literal
//!   mapping token counts to probabilities.
//!
//! Every chunk with a positive rate inside the configured span becomes one
//! client with empirical input/output lengths.

use crate::error::{Error, Result};
use crate::workload::spec::{ClientSpec, ServeGenDataSpec};
use blis_common::{ArrivalProcess, ArrivalSpec, DistSpec};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const TRACE_PREFIX: &str = "chunk-";
const TRACE_SUFFIX: &str = "-trace.csv";

#[derive(Debug, Clone, PartialEq)]
struct TraceRow {
    start_time_s: f64,
    rate: f64,
    cv: f64,
    pattern: String,
}

/// Time filter shared by trace rows and dataset windows (0 = unbounded)
fn in_span(start_s: f64, span: &ServeGenDataSpec) -> bool {
    if span.span_start > 0 && start_s < span.span_start as f64 {
        return false;
    }
    if span.span_end > 0 && start_s >= span.span_end as f64 {
        return false;
    }
    true
}

/// Load one client per usable chunk, in chunk file-name order
pub fn load_servegen_clients(spec: &ServeGenDataSpec) -> Result<Vec<ClientSpec>> {
    let dir = &spec.path;
    let traces = list_trace_files(dir)?;
    if traces.is_empty() {
        return Err(Error::data(format!(
            "no chunk-*-trace.csv files found in {}",
            dir.display()
        )));
    }

    let mut clients = Vec::new();
    for (chunk_id, trace_path) in traces {
        let dataset_path = dir.join(format!("chunk-{chunk_id}-dataset.json"));
        let client = load_chunk(&chunk_id, &trace_path, &dataset_path, spec)
            .map_err(|e| Error::data(format!("loading chunk {chunk_id}: {e}")))?;
        match client {
            Some(client) => clients.push(client),
            None => debug!("chunk {} has no positive rate in span; skipping", chunk_id),
        }
    }

    if clients.is_empty() {
        return Err(Error::data(format!("no valid chunks found in {}", dir.display())));
    }
    Ok(clients)
}

/// `(chunk_id, path)` for every trace file, sorted by file name
fn list_trace_files(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut traces = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if let Some(id) =
            name.strip_prefix(TRACE_PREFIX).and_then(|rest| rest.strip_suffix(TRACE_SUFFIX))
        {
            traces.push((name.to_string(), id.to_string(), entry.path()));
        }
    }
    traces.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(traces.into_iter().map(|(_, id, path)| (id, path)).collect())
}

fn load_chunk(
    chunk_id: &str,
    trace_path: &Path,
    dataset_path: &Path,
    span: &ServeGenDataSpec,
) -> Result<Option<ClientSpec>> {
    let rows = parse_trace(trace_path)?;

    // Highest-rate row in span; ties keep the earliest
    let mut best: Option<&TraceRow> = None;
    for row in rows.iter().filter(|r| in_span(r.start_time_s, span)) {
        if row.rate > best.map_or(0.0, |b| b.rate) {
            best = Some(row);
        }
    }
    let Some(best) = best else {
        return Ok(None);
    };

    let (input_pdf, output_pdf) = load_dataset(dataset_path, span)?;

    let arrival = match best.pattern.to_lowercase().as_str() {
        "gamma" => ArrivalSpec { process: ArrivalProcess::Gamma, cv: Some(best.cv) },
        "weibull" => ArrivalSpec { process: ArrivalProcess::Weibull, cv: Some(best.cv) },
        _ => ArrivalSpec::poisson(),
    };

    let mut client = ClientSpec::new(
        format!("servegen-chunk-{chunk_id}"),
        best.rate,
        arrival,
        DistSpec::empirical(input_pdf),
        DistSpec::empirical(output_pdf),
    );
    client.tenant_id = format!("chunk-{chunk_id}");
    Ok(Some(client))
}

fn parse_trace(path: &Path) -> Result<Vec<TraceRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for record in reader.records() {
        match parse_row(&record?) {
            Some(row) => rows.push(row),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!(
            "{} rows in {} were skipped (short rows or parse errors)",
            skipped,
            path.display()
        );
    }
    Ok(rows)
}

fn parse_row(record: &csv::StringRecord) -> Option<TraceRow> {
    if record.len() < 4 {
        return None;
    }
    Some(TraceRow {
        start_time_s: record[0].parse().ok()?,
        rate: record[1].parse().ok()?,
        cv: record[2].parse().ok()?,
        pattern: record[3].to_string(),
    })
}

/// Input and output PMFs from the first complete window in span
fn load_dataset(
    path: &Path,
    span: &ServeGenDataSpec,
) -> Result<(BTreeMap<u32, f64>, BTreeMap<u32, f64>)> {
    let content = std::fs::read_to_string(path)?;
    let dataset: BTreeMap<String, BTreeMap<String, String>> = serde_json::from_str(&content)?;

    for (window, fields) in &dataset {
        let start: f64 = window.trim().parse().unwrap_or(0.0);
        if !in_span(start, span) {
            continue;
        }
        let input = fields.get("input_tokens").filter(|s| !s.is_empty());
        let output = fields.get("output_tokens").filter(|s| !s.is_empty());
        if let (Some(input), Some(output)) = (input, output) {
            let input = parse_pdf(input).map_err(|e| Error::data(format!("input PDF: {e}")))?;
            let output = parse_pdf(output).map_err(|e| Error::data(format!("output PDF: {e}")))?;
            return Ok((input, output));
        }
    }
    Err(Error::data("no valid PDF windows found in dataset"))
}

/// Parse a Python dict literal such as `{100: 0.5, 200.0: 3e-1,}`
///
/// Float keys are truncated to integers; values accept scientific notation.
pub fn parse_pdf(text: &str) -> std::result::Result<BTreeMap<u32, f64>, String> {
    let text = text.trim();
    let Some(body) = text.strip_prefix('{').and_then(|t| t.strip_suffix('}')) else {
        let head: String = text.chars().take(40).collect();
        return Err(format!("expected a dict literal in braces, got: {head}"));
    };
    let body = body.trim();
    if body.is_empty() {
        return Err("empty PDF dictionary".to_string());
    }

    let mut pdf = BTreeMap::new();
    for pair in body.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let Some((key, value)) = pair.split_once(':') else {
            return Err(format!("invalid key:value pair: {pair:?}"));
        };
        let key = key.trim();
        let key_f: f64 = key.parse().map_err(|_| format!("invalid key {key:?}"))?;
        if !key_f.is_finite() || key_f < 0.0 || key_f >= u32::MAX as f64 {
            return Err(format!("invalid key {key:?}"));
        }
        let value = value.trim();
        let prob: f64 =
            value.parse().map_err(|_| format!("invalid value {value:?} for key {key}"))?;
        pdf.insert(key_f as u32, prob);
    }

    if pdf.is_empty() {
        return Err("no valid entries in PDF dictionary".to_string());
    }
    Ok(pdf)
}

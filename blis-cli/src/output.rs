//! Summary output for generated request streams

use anyhow::{Context, Result};
use blis_core::workload::Request;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Aggregate view of one generated request stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSummary {
    pub seed: u64,
    pub horizon_us: i64,
    pub total_requests: usize,
    pub first_arrival_us: Option<i64>,
    pub last_arrival_us: Option<i64>,
    /// Requests per second over the realised arrival span
    pub realized_rate: f64,
    pub sessions: usize,
    pub mean_input_tokens: f64,
    pub mean_output_tokens: f64,
    pub per_client: BTreeMap<String, usize>,
    pub per_slo_class: BTreeMap<String, usize>,
}

impl GenerationSummary {
    pub fn from_requests(requests: &[Request], seed: u64, horizon_us: i64) -> Self {
        let mut per_client = BTreeMap::new();
        let mut per_slo_class = BTreeMap::new();
        let mut sessions = BTreeSet::new();
        let mut input_total = 0u64;
        let mut output_total = 0u64;

        for req in requests {
            *per_client.entry(req.client_id.clone()).or_insert(0) += 1;
            *per_slo_class.entry(req.slo_class.clone()).or_insert(0) += 1;
            if let Some(session) = &req.session_id {
                sessions.insert(session.as_str());
            }
            input_total += req.input_len() as u64;
            output_total += req.output_len() as u64;
        }

        let first_arrival_us = requests.first().map(|r| r.arrival_time_us);
        let last_arrival_us = requests.last().map(|r| r.arrival_time_us);
        let span_us = match (first_arrival_us, last_arrival_us) {
            (Some(first), Some(last)) => last - first,
            _ => 0,
        };
        let realized_rate = if span_us > 0 {
            (requests.len() - 1) as f64 / (span_us as f64 / 1_000_000.0)
        } else {
            0.0
        };
        let mean = |total: u64| {
            if requests.is_empty() {
                0.0
            } else {
                total as f64 / requests.len() as f64
            }
        };

        Self {
            seed,
            horizon_us,
            total_requests: requests.len(),
            first_arrival_us,
            last_arrival_us,
            realized_rate,
            sessions: sessions.len(),
            mean_input_tokens: mean(input_total),
            mean_output_tokens: mean(output_total),
            per_client,
            per_slo_class,
        }
    }

    /// Print summary to stdout in human-readable format
    pub fn print_human(&self) {
        println!("\n{}", "=".repeat(60));
        println!("BLIS Workload Generation Summary");
        println!("{}", "=".repeat(60));
        println!();
        println!("  Seed:            {}", self.seed);
        println!("  Horizon:         {:.3}s", self.horizon_us as f64 / 1_000_000.0);
        println!("  Requests:        {}", self.total_requests);
        println!("  Realized rate:   {:.2} req/s", self.realized_rate);
        println!("  Sessions:        {}", self.sessions);
        println!("  Mean input:      {:.1} tokens", self.mean_input_tokens);
        println!("  Mean output:     {:.1} tokens", self.mean_output_tokens);
        println!();
        println!("Per client:");
        for (client, count) in &self.per_client {
            println!("  {:<24} {}", client, count);
        }
        println!();
        println!("Per SLO class:");
        for (class, count) in &self.per_slo_class {
            println!("  {:<24} {}", class, count);
        }
        println!();
        println!("{}", "=".repeat(60));
    }

    /// Write summary to JSON file
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)
            .with_context(|| format!("Failed to create summary file: {}", path.display()))?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

use anyhow::Context;
use blis_core::calibrate::{build_report, prepare_pairs, CalibrationConfig, ConfigMatch, SimResult};
use blis_core::trace::{records_from_requests, TraceHeader, TraceMode, TraceV2};
use blis_core::workload::{scenario, GenerationConfig, Request, RequestGenerator, WorkloadSpec};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use humantime_serde::re::humantime;
use schemars::schema_for;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod completions;
mod config;
mod output;

use config::{horizon_us, ProfileConfig};
use output::GenerationSummary;

/// BLIS: deterministic workload synthesis for LLM inference simulation
///
/// Profiles (TOML) name a workload spec, a horizon and output paths. The
/// generated request stream is written as a trace v2 header/data pair.
///
/// Example usage:
///   blis generate -P profiles/chat.toml
///   blis generate -P profiles/chat.toml --set generation.seed=7 --set generation.horizon=5m
///   blis scenario bursty --rate 20 --horizon 60s --header out/h.toml --data out/d.csv
///   blis calibrate --header real.toml --data real.csv --sim sim.json
///   blis completions bash > ~/.local/share/bash-completion/completions/blis
#[derive(Parser)]
#[command(name = "blis")]
#[command(version, about = "Deterministic LLM inference workload generator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a trace from a profile
    Generate {
        /// Path to TOML profile (REQUIRED)
        #[arg(short = 'P', long, required = true)]
        profile: PathBuf,

        /// Override any profile value using dot notation (repeatable)
        ///
        /// Examples:
        ///   --set generation.seed=999
        ///   --set generation.horizon=10m
        ///   --set generation.config.parallel=false
        ///   --set output.summary=/tmp/summary.json
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },

    /// Generate a trace from a built-in scenario
    Scenario {
        /// bursty, unfair_tenants, prefix_heavy or mixed_slo
        name: String,

        /// Aggregate rate in requests per second
        #[arg(long, default_value_t = 10.0)]
        rate: f64,

        #[arg(long, default_value_t = 42)]
        seed: u64,

        #[arg(long, default_value = "60s", value_parser = humantime::parse_duration)]
        horizon: Duration,

        /// Request cap (0 = unlimited)
        #[arg(long, default_value_t = 0)]
        max_requests: i64,

        /// Trace header output path
        #[arg(long)]
        header: PathBuf,

        /// Trace data output path
        #[arg(long)]
        data: PathBuf,

        /// Optional JSON summary output path
        #[arg(long)]
        summary: Option<PathBuf>,
    },

    /// Compare simulated latencies against a real trace
    Calibrate {
        /// Real trace header (TOML)
        #[arg(long)]
        header: PathBuf,

        /// Real trace data (CSV)
        #[arg(long)]
        data: PathBuf,

        /// Simulator results (JSON array)
        #[arg(long)]
        sim: PathBuf,

        /// Warm-up requests to exclude (default: from trace header)
        #[arg(long)]
        warm_up: Option<u64>,

        /// Network RTT added to simulated latencies (default: from trace header)
        #[arg(long)]
        rtt_us: Option<i64>,

        /// Client link bandwidth; 0 disables transfer delay
        #[arg(long, default_value_t = 0.0)]
        bandwidth_mbps: f64,
    },

    /// Generate JSON Schema for profiles or workload specs
    Schema {
        #[arg(value_enum, default_value_t = SchemaTarget::Profile)]
        target: SchemaTarget,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    /// List all valid profile paths for --set (used by shell completions)
    #[command(hide = true)]
    CompletePaths,
}

#[derive(Clone, Copy, ValueEnum)]
enum SchemaTarget {
    Profile,
    Workload,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Completions { shell } => {
            let bin_name = "blis";
            match shell {
                Shell::Bash => println!("{}", completions::generate_bash_completion(bin_name)),
                Shell::Zsh => println!("{}", completions::generate_zsh_completion(bin_name)),
                _ => {
                    let mut cmd = Cli::command();
                    generate(shell, &mut cmd, bin_name.to_string(), &mut io::stdout());
                }
            }
            Ok(())
        }
        Commands::Schema { target } => {
            let schema = match target {
                SchemaTarget::Profile => schema_for!(ProfileConfig),
                SchemaTarget::Workload => schema_for!(WorkloadSpec),
            };
            println!("{}", serde_json::to_string_pretty(&schema)?);
            Ok(())
        }
        Commands::CompletePaths => {
            for path in completions::get_config_paths() {
                println!("{}", path);
            }
            Ok(())
        }
        Commands::Generate { profile, set } => run_generate(&profile, &set),
        Commands::Scenario { name, rate, seed, horizon, max_requests, header, data, summary } => {
            let spec = scenario(&name, seed, rate)?;
            tracing::info!("Scenario: {} at {} req/s (seed {})", name, rate, seed);
            let requests = RequestGenerator::default().generate(
                &spec,
                horizon_us(horizon),
                max_requests,
            )?;
            let source = format!("scenario:{name}");
            write_outputs(&requests, spec.seed, horizon_us(horizon), &source, &header, &data)?;
            finish_summary(&requests, spec.seed, horizon_us(horizon), summary.as_deref())
        }
        Commands::Calibrate { header, data, sim, warm_up, rtt_us, bandwidth_mbps } => {
            run_calibrate(&header, &data, &sim, warm_up, rtt_us, bandwidth_mbps)
        }
    }
}

fn run_generate(profile: &Path, set: &[String]) -> anyhow::Result<()> {
    tracing::info!("Loading profile: {}", profile.display());
    let config = ProfileConfig::load(profile, set)?;
    let generation = &config.generation;

    let mut spec = WorkloadSpec::from_file(&generation.spec)
        .with_context(|| format!("Failed to load workload spec: {}", generation.spec.display()))?;
    if let Some(seed) = generation.seed {
        spec.seed = seed;
    }

    let horizon = match (generation.horizon, spec.horizon_us) {
        (Some(h), _) => horizon_us(h),
        (None, Some(h)) => h,
        (None, None) => {
            anyhow::bail!("No horizon: set generation.horizon or the spec's horizon_us")
        }
    };
    let max_requests = generation.max_requests.or(spec.num_requests).unwrap_or(0);

    tracing::info!("=== Generation ===");
    tracing::info!("Spec: {}", generation.spec.display());
    tracing::info!("Seed: {}", spec.seed);
    tracing::info!("Horizon: {} us", horizon);
    if max_requests > 0 {
        tracing::info!("Request cap: {}", max_requests);
    }
    log_config(&generation.config);

    let requests = RequestGenerator::new(generation.config.clone())
        .generate(&spec, horizon, max_requests)?;

    let source = generation.spec.display().to_string();
    write_outputs(
        &requests,
        spec.seed,
        horizon,
        &source,
        &config.output.trace_header,
        &config.output.trace_data,
    )?;
    finish_summary(&requests, spec.seed, horizon, config.output.summary.as_deref())
}

fn log_config(config: &GenerationConfig) {
    tracing::debug!(
        "default_prefix_length={} per_client_cap_factor={} decode_us_per_token={} vocab_size={} parallel={}",
        config.default_prefix_length,
        config.per_client_cap_factor,
        config.decode_us_per_token,
        config.vocab_size,
        config.parallel
    );
}

fn write_outputs(
    requests: &[Request],
    seed: u64,
    horizon: i64,
    source: &str,
    header_path: &Path,
    data_path: &Path,
) -> anyhow::Result<()> {
    for path in [header_path, data_path] {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
    }

    let mut header = TraceHeader::new(TraceMode::Generated);
    header.created_at = Some(humantime::format_rfc3339_seconds(SystemTime::now()).to_string());
    header.workload_spec = Some(source.to_string());

    TraceV2::new(header, records_from_requests(requests))
        .export(header_path, data_path)
        .with_context(|| format!("Failed to write trace: {}", data_path.display()))?;
    tracing::info!(
        "Wrote {} requests (seed {}, horizon {} us) to {} + {}",
        requests.len(),
        seed,
        horizon,
        header_path.display(),
        data_path.display()
    );
    Ok(())
}

fn finish_summary(
    requests: &[Request],
    seed: u64,
    horizon: i64,
    summary_path: Option<&Path>,
) -> anyhow::Result<()> {
    let summary = GenerationSummary::from_requests(requests, seed, horizon);
    summary.print_human();
    if let Some(path) = summary_path {
        summary.write_json(path)?;
        tracing::info!("Summary written to: {}", path.display());
    }
    Ok(())
}

fn run_calibrate(
    header: &Path,
    data: &Path,
    sim: &Path,
    warm_up: Option<u64>,
    rtt_us: Option<i64>,
    bandwidth_mbps: f64,
) -> anyhow::Result<()> {
    let trace = TraceV2::load(header, data)?;
    let sim_text = std::fs::read_to_string(sim)
        .with_context(|| format!("Failed to read simulator results: {}", sim.display()))?;
    let sim_results: Vec<SimResult> = serde_json::from_str(&sim_text)
        .with_context(|| format!("Failed to parse simulator results: {}", sim.display()))?;

    let measured_rtt_us = trace
        .header
        .network
        .as_ref()
        .and_then(|n| n.measured_rtt_ms)
        .map(|ms| (ms * 1000.0).round() as i64);
    let config = CalibrationConfig {
        warm_up_requests: warm_up.unwrap_or(trace.header.warm_up_requests),
        network_rtt_us: rtt_us.or(measured_rtt_us).unwrap_or(0),
        bandwidth_mbps,
    };
    tracing::info!(
        "Calibrating {} trace records against {} simulator results (warm-up {}, rtt {} us)",
        trace.records.len(),
        sim_results.len(),
        config.warm_up_requests,
        config.network_rtt_us
    );

    let pairs = prepare_pairs(&trace.records, &sim_results, &config);
    if pairs.matched == 0 {
        tracing::warn!("No trace records matched a simulator result");
    }
    if pairs.token_mismatches > 0 {
        tracing::warn!("{} matched requests disagree on token counts", pairs.token_mismatches);
    }

    let report = build_report(&pairs, ConfigMatch::from_header(&trace.header))?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

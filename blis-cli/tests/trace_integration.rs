//! Integration tests for the trace v2 round trip, replay, calibration and
//! ServeGen-backed generation.
//!
//! Every test writes its fixtures into a fresh temporary directory.

use blis_core::workload::{generate_requests, scenario, Request};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(path: &Path, content: &str) {
    fs::write(path, content).expect("failed to write fixture");
}

fn generated(name: &str, seed: u64) -> Vec<Request> {
    let spec = scenario(name, seed, 25.0).expect("scenario exists");
    generate_requests(&spec, 10_000_000, 0).expect("generation succeeds")
}

// =============================================================================
// Trace export and load
// =============================================================================

mod round_trip {
    use super::*;
    use blis_core::trace::{records_from_requests, TraceHeader, TraceMode, TraceV2};

    /// Generated requests survive export and load unchanged
    #[test]
    fn test_generated_trace_round_trip() {
        let dir = TempDir::new().unwrap();
        let header_path = dir.path().join("trace.toml");
        let data_path = dir.path().join("trace.csv");

        let requests = generated("mixed_slo", 5);
        let mut header = TraceHeader::new(TraceMode::Generated);
        header.workload_spec = Some("scenario:mixed_slo".to_string());
        let trace = TraceV2::new(header, records_from_requests(&requests));
        trace.export(&header_path, &data_path).unwrap();

        let loaded = TraceV2::load(&header_path, &data_path).unwrap();
        assert_eq!(loaded, trace);
        assert_eq!(loaded.records.len(), requests.len());
        assert!(loaded.records.windows(2).all(|w| w[0].arrival_time_us <= w[1].arrival_time_us));
    }

    /// Identical seeds produce byte-identical data files
    #[test]
    fn test_trace_files_deterministic() {
        let dir = TempDir::new().unwrap();
        let mut contents = Vec::new();
        for run in 0..2 {
            let header_path = dir.path().join(format!("h{run}.toml"));
            let data_path = dir.path().join(format!("d{run}.csv"));
            let trace = TraceV2::new(
                TraceHeader::new(TraceMode::Generated),
                records_from_requests(&generated("bursty", 77)),
            );
            trace.export(&header_path, &data_path).unwrap();
            contents.push(fs::read(&data_path).unwrap());
        }
        assert_eq!(contents[0], contents[1]);
    }

    /// A hand-written real trace with a missing network section loads
    #[test]
    fn test_load_real_trace() {
        let dir = TempDir::new().unwrap();
        let header_path = dir.path().join("real.toml");
        let data_path = dir.path().join("real.csv");
        write(
            &header_path,
            r#"
trace_version = 2
time_unit = "us"
mode = "real"
warm_up_requests = 1

[server]
type = "vllm"
max_num_seqs = 256
"#,
        );
        write(
            &data_path,
            "request_id,client_id,tenant_id,slo_class,session_id,round_index,prefix_group,streaming,input_tokens,output_tokens,text_tokens,image_tokens,audio_tokens,video_tokens,reason_ratio,arrival_time_us,send_time_us,first_chunk_time_us,last_chunk_time_us,num_chunks,status,error_message\n\
             0,c,t,standard,,0,,true,10,5,0,0,0,0,0,100,100,300,900,5,ok,\n\
             1,c,t,standard,,0,,false,12,6,0,0,0,0,0.5,200,205,500,1500,1,error, boom \n",
        );

        let trace = TraceV2::load(&header_path, &data_path).unwrap();
        assert_eq!(trace.header.mode, TraceMode::Real);
        assert_eq!(trace.header.warm_up_requests, 1);
        assert_eq!(trace.records.len(), 2);
        assert_eq!(trace.records[0].ttft_us(), 200);
        assert_eq!(trace.records[1].e2e_us(), 1295);
        assert_eq!(trace.records[1].error_message, "boom");
        assert!(!trace.records[1].is_ok());
    }
}

// =============================================================================
// Replay
// =============================================================================

mod replay {
    use super::*;
    use blis_core::trace::{records_from_requests, replay_requests, TraceHeader, TraceMode, TraceV2};
    use blis_core::workload::GenerationConfig;

    /// Replayed requests keep timing, lengths and metadata of the trace
    #[test]
    fn test_replay_matches_generated_shape() {
        let requests = generated("unfair_tenants", 3);
        let trace =
            TraceV2::new(TraceHeader::new(TraceMode::Generated), records_from_requests(&requests));

        let replayed = replay_requests(&trace, 3, &GenerationConfig::default()).unwrap();
        assert_eq!(replayed.len(), requests.len());
        for (orig, rep) in requests.iter().zip(&replayed) {
            assert_eq!(rep.id, orig.id);
            assert_eq!(rep.arrival_time_us, orig.arrival_time_us);
            assert_eq!(rep.input_len(), orig.input_len());
            assert_eq!(rep.output_len(), orig.output_len());
            assert_eq!(rep.client_id, orig.client_id);
            assert_eq!(rep.slo_class, orig.slo_class);
            assert_eq!(rep.streaming, orig.streaming);
        }
    }

    /// Replay draws are keyed on the seed
    #[test]
    fn test_replay_seed_dependence() {
        let trace = TraceV2::new(
            TraceHeader::new(TraceMode::Generated),
            records_from_requests(&generated("bursty", 1)),
        );
        let config = GenerationConfig::default();
        let a = replay_requests(&trace, 10, &config).unwrap();
        let b = replay_requests(&trace, 10, &config).unwrap();
        let c = replay_requests(&trace, 11, &config).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}

// =============================================================================
// Calibration
// =============================================================================

mod calibration {
    use super::*;
    use blis_core::calibrate::{
        build_report, prepare_pairs, CalibrationConfig, ConfigMatch, Quality, SimResult,
    };
    use blis_core::trace::TraceV2;

    /// A real trace plus a close simulator run yields a good report
    #[test]
    fn test_end_to_end_report() {
        let dir = TempDir::new().unwrap();
        let header_path = dir.path().join("real.toml");
        let data_path = dir.path().join("real.csv");
        let sim_path = dir.path().join("sim.json");

        write(
            &header_path,
            "trace_version = 2\ntime_unit = \"us\"\nmode = \"real\"\nwarm_up_requests = 5\n\n[network]\nmeasured_rtt_ms = 1.0\n",
        );

        let mut data = String::from(
            "request_id,client_id,tenant_id,slo_class,session_id,round_index,prefix_group,streaming,input_tokens,output_tokens,text_tokens,image_tokens,audio_tokens,video_tokens,reason_ratio,arrival_time_us,send_time_us,first_chunk_time_us,last_chunk_time_us,num_chunks,status,error_message\n",
        );
        let mut sims = Vec::new();
        for i in 0..50u64 {
            let send = i as i64 * 10_000;
            let ttft = 20_000 + i as i64 * 400;
            let e2e = 200_000 + i as i64 * 3_000;
            data.push_str(&format!(
                "{i},c,t,standard,,0,,true,100,40,0,0,0,0,0,{send},{send},{},{},40,ok,\n",
                send + ttft,
                send + e2e
            ));
            // server-side prediction, 1ms short of the client view plus a little noise
            let noise = if i % 2 == 0 { 1.02 } else { 0.98 };
            sims.push(SimResult {
                request_id: i,
                ttft_us: (ttft - 1_000) as f64 * noise,
                e2e_us: (e2e - 1_000) as f64 * noise,
                input_tokens: 100,
                output_tokens: 40,
            });
        }
        write(&data_path, &data);
        write(&sim_path, &serde_json::to_string(&sims).unwrap());

        let trace = TraceV2::load(&header_path, &data_path).unwrap();
        let sim_results: Vec<SimResult> =
            serde_json::from_str(&fs::read_to_string(&sim_path).unwrap()).unwrap();
        let config = CalibrationConfig {
            warm_up_requests: trace.header.warm_up_requests,
            network_rtt_us: 1_000,
            bandwidth_mbps: 0.0,
        };
        let pairs = prepare_pairs(&trace.records, &sim_results, &config);
        let report = build_report(&pairs, ConfigMatch::from_header(&trace.header)).unwrap();

        assert_eq!(report.trace_info.num_requests, 50);
        assert_eq!(report.trace_info.warm_up_excluded, 5);
        assert_eq!(report.trace_info.matched_pairs, 45);
        assert_eq!(report.trace_info.token_mismatches, 0);
        let ttft = &report.metrics["ttft"];
        assert!(ttft.mape < 0.05, "ttft mape {}", ttft.mape);
        assert!(ttft.pearson_r > 0.95, "ttft r {}", ttft.pearson_r);
        assert!(matches!(ttft.quality, Quality::Excellent | Quality::Good));
        assert!(report.config_match.matched.contains(&"network.measured_rtt_ms".to_string()));
    }
}

// =============================================================================
// ServeGen-backed generation
// =============================================================================

mod servegen {
    use super::*;
    use blis_core::workload::{ServeGenDataSpec, WorkloadSpec};

    fn write_chunk(dir: &Path, id: u32, rate: f64, pattern: &str) {
        write(
            &dir.join(format!("chunk-{id}-trace.csv")),
            &format!("0,{rate},1.0,{pattern}\n600,{},1.0,{pattern}\n", rate / 2.0),
        );
        write(
            &dir.join(format!("chunk-{id}-dataset.json")),
            r#"{"0": {"input_tokens": "{100: 0.5, 200: 0.5}", "output_tokens": "{50: 1.0}"}}"#,
        );
    }

    /// A directory of chunks becomes one client per usable chunk
    #[test]
    fn test_generate_from_servegen_directory() {
        let dir = TempDir::new().unwrap();
        write_chunk(dir.path(), 1, 4.0, "Gamma");
        write_chunk(dir.path(), 2, 1.0, "Weibull");

        let spec = WorkloadSpec {
            seed: 9,
            servegen_data: Some(ServeGenDataSpec {
                path: dir.path().to_path_buf(),
                span_start: 0,
                span_end: 0,
            }),
            ..WorkloadSpec::default()
        };
        let resolved = blis_core::workload::resolve_spec(&spec).unwrap();
        assert_eq!(resolved.clients.len(), 2);
        assert!((resolved.aggregate_rate - 5.0).abs() < 1e-9);

        let requests = generate_requests(&spec, 20_000_000, 0).unwrap();
        assert!(!requests.is_empty());
        assert!(requests.iter().all(|r| [100, 200].contains(&r.input_len())));
        assert!(requests.iter().all(|r| r.output_len() == 50));
        let first = requests.iter().filter(|r| r.client_id == "servegen-chunk-1").count();
        let second = requests.iter().filter(|r| r.client_id == "servegen-chunk-2").count();
        assert!(first > second);
    }

    /// An empty directory is an error, not an empty workload
    #[test]
    fn test_empty_servegen_directory_fails() {
        let dir = TempDir::new().unwrap();
        let spec = WorkloadSpec {
            servegen_data: Some(ServeGenDataSpec {
                path: dir.path().to_path_buf(),
                span_start: 0,
                span_end: 0,
            }),
            ..WorkloadSpec::default()
        };
        assert!(generate_requests(&spec, 1_000_000, 0).is_err());
    }
}

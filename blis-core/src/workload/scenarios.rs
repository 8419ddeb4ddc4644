//! Built-in workload presets
//!
//! Each preset is a complete, valid [`WorkloadSpec`] for a common traffic
//! shape, parameterised only by seed and aggregate rate.

use crate::error::{Error, Result};
use crate::workload::spec::{Category, ClientSpec, SloClass, WorkloadSpec};
use blis_common::{ArrivalSpec, DistSpec};

/// Names accepted by [`scenario`]
pub const SCENARIOS: [&str; 4] = ["bursty", "unfair_tenants", "prefix_heavy", "mixed_slo"];

fn language(seed: u64, rate: f64, clients: Vec<ClientSpec>) -> WorkloadSpec {
    WorkloadSpec {
        seed,
        category: Some(Category::Language),
        aggregate_rate: rate,
        clients,
        ..WorkloadSpec::default()
    }
}

fn client(
    id: &str,
    tenant: &str,
    slo: SloClass,
    fraction: f64,
    arrival: ArrivalSpec,
    input: DistSpec,
    output: DistSpec,
) -> ClientSpec {
    let mut c = ClientSpec::new(id, fraction, arrival, input, output);
    c.tenant_id = tenant.to_string();
    c.slo_class = Some(slo);
    c
}

/// Single batch client with Gamma (CV 3.5) arrivals
pub fn bursty(seed: u64, rate: f64) -> WorkloadSpec {
    language(
        seed,
        rate,
        vec![client(
            "bursty-client",
            "tenant-A",
            SloClass::Batch,
            1.0,
            ArrivalSpec::gamma(3.5),
            DistSpec::exponential(512.0),
            DistSpec::exponential(256.0),
        )],
    )
}

/// 90% bulk batch traffic, 10% critical streaming traffic
pub fn unfair_tenants(seed: u64, rate: f64) -> WorkloadSpec {
    let mut realtime = client(
        "high-priority-realtime",
        "tenant-realtime",
        SloClass::Critical,
        0.1,
        ArrivalSpec::poisson(),
        DistSpec::gaussian(128.0, 50.0, 10.0, 2048.0),
        DistSpec::exponential(64.0),
    );
    realtime.streaming = true;
    language(
        seed,
        rate,
        vec![
            client(
                "low-priority-bulk",
                "tenant-bulk",
                SloClass::Batch,
                0.9,
                ArrivalSpec::poisson(),
                DistSpec::exponential(1024.0),
                DistSpec::exponential(512.0),
            ),
            realtime,
        ],
    )
}

/// 80% of traffic shares one system prompt
pub fn prefix_heavy(seed: u64, rate: f64) -> WorkloadSpec {
    let mut shared = client(
        "shared-prefix",
        "tenant-A",
        SloClass::Batch,
        0.8,
        ArrivalSpec::poisson(),
        DistSpec::exponential(256.0),
        DistSpec::exponential(128.0),
    );
    shared.prefix_group = Some("system-prompt".to_string());
    language(
        seed,
        rate,
        vec![
            shared,
            client(
                "unique-prefix",
                "tenant-B",
                SloClass::Standard,
                0.2,
                ArrivalSpec::poisson(),
                DistSpec::exponential(512.0),
                DistSpec::exponential(256.0),
            ),
        ],
    )
}

/// Roughly equal thirds of critical, standard and batch traffic
pub fn mixed_slo(seed: u64, rate: f64) -> WorkloadSpec {
    let mut realtime = client(
        "realtime",
        "tenant-rt",
        SloClass::Critical,
        0.33,
        ArrivalSpec::poisson(),
        DistSpec::gaussian(64.0, 20.0, 10.0, 256.0),
        DistSpec::exponential(32.0),
    );
    realtime.streaming = true;
    language(
        seed,
        rate,
        vec![
            realtime,
            client(
                "interactive",
                "tenant-int",
                SloClass::Standard,
                0.34,
                ArrivalSpec::poisson(),
                DistSpec::gaussian(256.0, 100.0, 32.0, 2048.0),
                DistSpec::exponential(128.0),
            ),
            client(
                "batch",
                "tenant-batch",
                SloClass::Batch,
                0.33,
                ArrivalSpec::poisson(),
                DistSpec::exponential(1024.0),
                DistSpec::exponential(512.0),
            ),
        ],
    )
}

/// Look up a preset by name
pub fn scenario(name: &str, seed: u64, rate: f64) -> Result<WorkloadSpec> {
    match name {
        "bursty" => Ok(bursty(seed, rate)),
        "unfair_tenants" => Ok(unfair_tenants(seed, rate)),
        "prefix_heavy" => Ok(prefix_heavy(seed, rate)),
        "mixed_slo" => Ok(mixed_slo(seed, rate)),
        _ => Err(Error::spec(format!(
            "unknown scenario {:?}; valid: {}",
            name,
            SCENARIOS.join(", ")
        ))),
    }
}

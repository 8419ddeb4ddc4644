//! Cohort expansion
//!
//! A cohort describes a population of identical clients. Expansion turns
//! it into `population` concrete [`ClientSpec`]s with ids `{cohort}-{j}`,
//! each carrying an equal share of the cohort's rate fraction and a
//! lifecycle derived from the cohort's shaping:
//! - diurnal: 24 one-hour windows whose active length follows a cosine
//!   between full rate at the peak hour and `1/R` at the trough
//! - spike: a single window
//! - drain: full rate until the start, then 10 shrinking segments
//!
//! Each cohort draws from its own RNG sub-stream keyed by its index, so a
//! cohort expands identically no matter which other cohorts are present.

use crate::seed::{components, derive_indexed_seed, derive_seed, rng_from_seed};
use crate::workload::spec::{
    ActiveWindow, ClientSpec, CohortSpec, DiurnalSpec, DrainSpec, LifecycleSpec, SpikeSpec,
};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::f64::consts::PI;

const HOURS_PER_DAY: i64 = 24;
const US_PER_HOUR: i64 = 3_600_000_000;
const DRAIN_SEGMENTS: i64 = 10;

/// Expand cohorts into clients
///
/// Pure: the same `(cohorts, seed)` always produces the same clients, and
/// members of cohort `i` depend only on `cohorts[i]`, `i` and `seed`.
pub fn expand_cohorts(cohorts: &[CohortSpec], seed: u64) -> Vec<ClientSpec> {
    let parent = derive_seed(seed, components::COHORTS);
    cohorts
        .iter()
        .enumerate()
        .flat_map(|(i, cohort)| {
            let mut rng = rng_from_seed(derive_indexed_seed(parent, i as u64));
            expand_cohort(cohort, &mut rng)
        })
        .collect()
}

fn expand_cohort(cohort: &CohortSpec, rng: &mut ChaCha8Rng) -> Vec<ClientSpec> {
    let population = cohort.population.max(0) as usize;
    let per_member_fraction = cohort.rate_fraction / cohort.population.max(1) as f64;

    (0..population)
        .map(|j| {
            let mut windows = Vec::new();
            if let Some(diurnal) = &cohort.diurnal {
                windows.extend(diurnal_windows(diurnal, rng));
            }
            if let Some(spike) = &cohort.spike {
                windows.push(spike_window(spike));
            }
            if let Some(drain) = &cohort.drain {
                windows.extend(drain_windows(drain));
            }

            ClientSpec {
                id: format!("{}-{}", cohort.id, j),
                tenant_id: cohort.tenant_id.clone(),
                slo_class: cohort.slo_class,
                model: cohort.model.clone(),
                rate_fraction: per_member_fraction,
                streaming: cohort.streaming,
                prefix_group: cohort.prefix_group.clone(),
                prefix_length: None,
                arrival: cohort.arrival.clone(),
                input_distribution: cohort.input_distribution.clone(),
                output_distribution: cohort.output_distribution.clone(),
                network: None,
                lifecycle: (!windows.is_empty()).then_some(LifecycleSpec { windows }),
                multimodal: None,
                reasoning: None,
            }
        })
        .collect()
}

/// Rate multiplier for `hour`: 1.0 at the peak, `1/ratio` twelve hours away
pub fn diurnal_multiplier(hour: i64, peak_hour: i64, ratio: f64) -> f64 {
    let angle = 2.0 * PI * (hour - peak_hour) as f64 / HOURS_PER_DAY as f64;
    let floor = 1.0 / ratio;
    (1.0 + angle.cos()) / 2.0 * (1.0 - floor) + floor
}

/// One window per hour, active for `multiplier` of the hour
///
/// With `jitter_us > 0` the window start is shifted by a uniform offset
/// bounded by both the jitter and the hour's idle slack.
fn diurnal_windows(d: &DiurnalSpec, rng: &mut ChaCha8Rng) -> Vec<ActiveWindow> {
    (0..HOURS_PER_DAY)
        .map(|h| {
            let multiplier = diurnal_multiplier(h, d.peak_hour, d.peak_to_trough_ratio);
            let duration = ((US_PER_HOUR as f64 * multiplier) as i64).clamp(1, US_PER_HOUR);

            let slack = (US_PER_HOUR - duration).min(d.jitter_us);
            let offset = if slack > 0 { rng.random_range(0..=slack) } else { 0 };

            let start = h * US_PER_HOUR + offset;
            ActiveWindow::new(start, start.saturating_add(duration))
        })
        .collect()
}

/// Bounds saturate at `i64::MAX`, which no horizon reaches
fn spike_window(s: &SpikeSpec) -> ActiveWindow {
    ActiveWindow::new(s.start_time_us, s.start_time_us.saturating_add(s.duration_us))
}

/// Linear ramp-down approximated by 10 segments of shrinking active time
fn drain_windows(d: &DrainSpec) -> Vec<ActiveWindow> {
    let segment = (d.ramp_duration_us / DRAIN_SEGMENTS).max(1);

    let mut windows = Vec::with_capacity(DRAIN_SEGMENTS as usize + 1);
    if d.start_time_us > 0 {
        windows.push(ActiveWindow::new(0, d.start_time_us));
    }
    for i in 0..DRAIN_SEGMENTS {
        let fraction = (DRAIN_SEGMENTS - i) as f64 / DRAIN_SEGMENTS as f64;
        let start = d.start_time_us.saturating_add(i.saturating_mul(segment));
        let active = ((segment as f64 * fraction) as i64).max(1);
        windows.push(ActiveWindow::new(start, start.saturating_add(active)));
    }
    windows
}

//! Compact staged-rate / shared-prefix workload form
//!
//! An [`InferencePerfSpec`] is a short description of a benchmark run: a
//! sequence of `(rate, duration)` stages plus a shared-prefix layout of
//! `N` system prompts each used by `M` users. [`InferencePerfSpec::expand`]
//! rewrites it into a canonical [`WorkloadSpec`] with `N * M` clients.

use crate::error::{Error, Result};
use crate::workload::spec::{
    ActiveWindow, Category, ClientSpec, ContextGrowth, LifecycleSpec, MultiTurnSpec,
    ReasoningSpec, WorkloadSpec,
};
use blis_common::{ArrivalSpec, DistSpec};
use serde::{Deserialize, Serialize};

const US_PER_SEC: i64 = 1_000_000;

const MULTI_TURN_ROUNDS: i64 = 5;
const MULTI_TURN_THINK_TIME_US: i64 = 500_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct InferencePerfSpec {
    pub stages: Vec<StageSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_prefix: Option<SharedPrefixSpec>,
}

/// One constant-rate phase of a run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct StageSpec {
    /// Requests per second
    pub rate: f64,
    /// Seconds
    pub duration: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct SharedPrefixSpec {
    pub num_unique_system_prompts: i64,
    pub num_users_per_system_prompt: i64,
    pub system_prompt_len: i64,
    pub question_len: i64,
    pub output_len: i64,
    #[serde(default)]
    pub enable_multi_turn_chat: bool,
}

impl InferencePerfSpec {
    pub fn validate(&self) -> Result<()> {
        if self.stages.is_empty() {
            return Err(Error::spec("inference_perf: at least one stage required"));
        }
        for (i, stage) in self.stages.iter().enumerate() {
            if stage.duration <= 0 {
                return Err(Error::spec(format!(
                    "inference_perf.stages[{i}]: duration must be positive, got {}",
                    stage.duration
                )));
            }
            if !stage.rate.is_finite() || stage.rate <= 0.0 {
                return Err(Error::spec(format!(
                    "inference_perf.stages[{i}]: rate must be a finite positive number, got {}",
                    stage.rate
                )));
            }
        }

        let Some(sp) = &self.shared_prefix else {
            return Err(Error::spec("inference_perf: shared_prefix is required"));
        };
        let positive = [
            ("num_unique_system_prompts", sp.num_unique_system_prompts),
            ("num_users_per_system_prompt", sp.num_users_per_system_prompt),
        ];
        for (name, value) in positive {
            if value <= 0 {
                return Err(Error::spec(format!(
                    "inference_perf.shared_prefix: {name} must be positive, got {value}"
                )));
            }
        }
        let non_negative = [
            ("system_prompt_len", sp.system_prompt_len),
            ("question_len", sp.question_len),
            ("output_len", sp.output_len),
        ];
        for (name, value) in non_negative {
            if value < 0 {
                return Err(Error::spec(format!(
                    "inference_perf.shared_prefix: {name} must be non-negative, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Duration-weighted mean rate across all stages (requests per second)
    pub fn aggregate_rate(&self) -> f64 {
        let total: i64 = self.stages.iter().map(|s| s.duration).sum();
        if total <= 0 {
            return 0.0;
        }
        let weighted: f64 = self.stages.iter().map(|s| s.rate * s.duration as f64).sum();
        weighted / total as f64
    }

    /// Back-to-back windows, one per stage; none for a single stage
    fn stage_windows(&self) -> Option<LifecycleSpec> {
        if self.stages.len() < 2 {
            return None;
        }
        let mut start = 0i64;
        let windows = self
            .stages
            .iter()
            .map(|stage| {
                let end = start.saturating_add(stage.duration.saturating_mul(US_PER_SEC));
                let window = ActiveWindow::new(start, end);
                start = end;
                window
            })
            .collect();
        Some(LifecycleSpec { windows })
    }

    /// Expand into a canonical spec with `N * M` equal-share clients
    pub fn expand(&self, seed: u64) -> Result<WorkloadSpec> {
        self.validate()?;
        let Some(sp) = &self.shared_prefix else {
            return Err(Error::spec("inference_perf: shared_prefix is required"));
        };

        let prompts = sp.num_unique_system_prompts;
        let users = sp.num_users_per_system_prompt;
        let fraction = 1.0 / (prompts * users) as f64;
        let lifecycle = self.stage_windows();
        let reasoning = sp.enable_multi_turn_chat.then(|| ReasoningSpec {
            reason_ratio_distribution: None,
            multi_turn: Some(MultiTurnSpec {
                max_rounds: MULTI_TURN_ROUNDS,
                think_time_us: MULTI_TURN_THINK_TIME_US,
                context_growth: ContextGrowth::Accumulate,
            }),
        });

        let mut clients = Vec::with_capacity((prompts * users) as usize);
        for p in 0..prompts {
            for u in 0..users {
                let mut client = ClientSpec::new(
                    format!("prompt-{p}-user-{u}"),
                    fraction,
                    ArrivalSpec::poisson(),
                    DistSpec::constant(sp.question_len as f64),
                    DistSpec::constant(sp.output_len as f64),
                );
                client.tenant_id = format!("prompt-{p}");
                client.prefix_group = Some(format!("prompt-{p}"));
                client.prefix_length = Some(sp.system_prompt_len);
                client.lifecycle = lifecycle.clone();
                client.reasoning = reasoning.clone();
                clients.push(client);
            }
        }

        let category =
            if sp.enable_multi_turn_chat { Category::Reasoning } else { Category::Language };
        Ok(WorkloadSpec {
            seed,
            category: Some(category),
            aggregate_rate: self.aggregate_rate(),
            clients,
            ..WorkloadSpec::default()
        })
    }
}

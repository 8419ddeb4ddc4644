//! Multi-turn session expansion
//!
//! For a multi-turn client every arrival tick opens a session of up to
//! `max_rounds` requests sharing one session id. Round `r + 1` arrives
//! `think_time_us + output_len * decode_us_per_token` after round `r`, and
//! at least 1 µs later, so rounds are strictly ordered in time. Sessions of one client overlap
//! freely; the arrival process alone spaces session starts.
//!
//! With [`ContextGrowth::Accumulate`] each round's input is the shared
//! prefix, then every earlier round's input and output tokens, then the
//! round's fresh input. The input length therefore grows strictly.

use crate::error::{Error, Result};
use crate::workload::generator::random_token_ids;
use crate::workload::spec::{ContextGrowth, MultiTurnSpec};
use blis_common::{DistSpec, LengthDistribution, Request};
use rand::Rng;

/// Reason ratio drawn as an integer percentage, mapped to `[0, 1]`
#[derive(Debug, Clone)]
pub struct ReasonRatioSampler(LengthDistribution);

impl ReasonRatioSampler {
    pub fn from_spec(spec: &DistSpec, path: &str) -> Result<Self> {
        LengthDistribution::from_spec(spec)
            .map(Self)
            .map_err(|e| Error::spec(format!("{path}: {e:#}")))
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        (self.0.sample(rng) as f64 / 100.0).clamp(0.0, 1.0)
    }
}

/// Per-client samplers and metadata shared by every session of that client
pub struct SessionContext<'a> {
    /// Metadata copied into every round (ids and tokens are overwritten)
    pub template: &'a Request,
    pub prefix: &'a [u32],
    pub input: &'a LengthDistribution,
    pub output: &'a LengthDistribution,
    pub reason_ratio: Option<&'a ReasonRatioSampler>,
    pub vocab_size: u32,
    /// Rounds at or past the horizon are dropped
    pub horizon_us: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionExpander {
    max_rounds: u32,
    think_time_us: i64,
    growth: ContextGrowth,
    decode_us_per_token: i64,
}

impl SessionExpander {
    pub fn new(spec: &MultiTurnSpec, decode_us_per_token: i64) -> Self {
        Self {
            max_rounds: spec.max_rounds.clamp(0, u32::MAX as i64) as u32,
            think_time_us: spec.think_time_us.max(0),
            growth: spec.context_growth,
            decode_us_per_token: decode_us_per_token.max(0),
        }
    }

    /// Expand one arrival tick at `start_us` into its session's rounds
    pub fn expand<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        ctx: &SessionContext<'_>,
        start_us: i64,
        session_id: &str,
    ) -> Vec<Request> {
        let mut rounds = Vec::with_capacity(self.max_rounds as usize);
        let mut history: Vec<u32> = Vec::new();
        let mut now = start_us;

        for round in 0..self.max_rounds {
            if now >= ctx.horizon_us {
                break;
            }
            let input_len = ctx.input.sample(rng) as usize;
            let output_len = ctx.output.sample(rng);
            let fresh = random_token_ids(rng, input_len, ctx.vocab_size);
            let output_tokens = random_token_ids(rng, output_len as usize, ctx.vocab_size);
            let reason_ratio = ctx.reason_ratio.map(|s| s.sample(rng));

            let mut input_tokens =
                Vec::with_capacity(ctx.prefix.len() + history.len() + fresh.len());
            input_tokens.extend_from_slice(ctx.prefix);
            if self.growth == ContextGrowth::Accumulate {
                input_tokens.extend_from_slice(&history);
                history.extend_from_slice(&fresh);
                history.extend_from_slice(&output_tokens);
            }
            input_tokens.extend_from_slice(&fresh);

            let mut req = ctx.template.clone();
            req.arrival_time_us = now;
            req.input_tokens = input_tokens;
            req.output_tokens = output_tokens;
            req.session_id = Some(session_id.to_string());
            req.round_index = round;
            req.reason_ratio = reason_ratio;
            rounds.push(req);

            let decode = (output_len as i64).saturating_mul(self.decode_us_per_token);
            let step = self.think_time_us.saturating_add(decode).max(1);
            now = now.saturating_add(step);
        }
        rounds
    }
}

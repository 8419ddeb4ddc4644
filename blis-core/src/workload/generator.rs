//! Request generation
//!
//! [`RequestGenerator::generate`] turns a [`WorkloadSpec`] into the complete,
//! ordered request stream:
//!
//! 1. Compact forms (inference-perf, ServeGen) are expanded into clients,
//!    the spec is validated and cohorts are expanded.
//! 2. Rate fractions are normalised into per-client rates (req/µs).
//! 3. Each prefix group gets one shared token sequence.
//! 4. Each client runs its own arrival loop on its own RNG sub-stream.
//!    Clients are independent, so this step runs on the rayon pool.
//! 5. All requests are stable-sorted by arrival time, truncated to the
//!    request cap and numbered `request_0..`.
//!
//! Truncation happens after the interleaving sort so every client keeps
//! its share of the capped output.

use crate::error::{Error, Result};
use crate::seed::{components, derive_indexed_seed, derive_seed, rng_from_seed};
use crate::workload::cohort::expand_cohorts;
use crate::workload::multimodal::{total_input_len, MultimodalSampler};
use crate::workload::reasoning::{ReasonRatioSampler, SessionContext, SessionExpander};
use crate::workload::servegen::load_servegen_clients;
use crate::workload::spec::{ClientSpec, WorkloadSpec};
use blis_common::{ArrivalSampler, DistSpec, LengthDistribution, Request};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

const US_PER_SEC: f64 = 1_000_000.0;

/// Generation tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(default, deny_unknown_fields)]
pub struct GenerationConfig {
    /// Prefix length for groups where no client declares one
    pub default_prefix_length: usize,
    /// Each client stops after `factor * max_requests` requests
    pub per_client_cap_factor: i64,
    /// Modelled decode time per output token between multi-turn rounds
    pub decode_us_per_token: i64,
    /// Token ids are drawn uniformly from `[0, vocab_size)`
    pub vocab_size: u32,
    /// Generate clients on the rayon pool
    pub parallel: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            default_prefix_length: 50,
            per_client_cap_factor: 2,
            decode_us_per_token: 1,
            vocab_size: 128_000,
            parallel: true,
        }
    }
}

/// Uniform random token ids
pub fn random_token_ids<R: Rng + ?Sized>(rng: &mut R, len: usize, vocab_size: u32) -> Vec<u32> {
    let vocab = vocab_size.max(1);
    (0..len).map(|_| rng.random_range(0..vocab)).collect()
}

/// Expand every compact form into clients and validate the result
///
/// Inference-perf and ServeGen sections only apply when the spec declares
/// no explicit clients. Cohorts are expanded after validation and appended
/// to the client list; a member id that collides with any earlier client
/// is an error naming the cohort.
pub fn resolve_spec(spec: &WorkloadSpec) -> Result<WorkloadSpec> {
    let mut resolved = spec.clone();

    if resolved.clients.is_empty() {
        if let Some(ip) = &spec.inference_perf {
            let expanded = ip.expand(spec.seed)?;
            resolved.clients = expanded.clients;
            if resolved.category.is_none() {
                resolved.category = expanded.category;
            }
            if resolved.aggregate_rate <= 0.0 {
                resolved.aggregate_rate = expanded.aggregate_rate;
            }
        }
    }
    if resolved.clients.is_empty() {
        if let Some(sg) = &spec.servegen_data {
            resolved.clients = load_servegen_clients(sg)?;
            if resolved.aggregate_rate <= 0.0 {
                resolved.aggregate_rate = resolved.clients.iter().map(|c| c.rate_fraction).sum();
            }
        }
    }

    resolved.validate()?;

    let mut members = expand_cohorts(&resolved.cohorts, resolved.seed).into_iter();
    let mut ids: HashSet<String> = resolved.clients.iter().map(|c| c.id.clone()).collect();
    for (i, cohort) in resolved.cohorts.iter().enumerate() {
        for member in members.by_ref().take(cohort.population.max(0) as usize) {
            if !ids.insert(member.id.clone()) {
                return Err(Error::spec(format!(
                    "cohorts[{i}].id: member id {:?} collides with another client",
                    member.id
                )));
            }
            resolved.clients.push(member);
        }
    }
    resolved.cohorts.clear();
    Ok(resolved)
}

/// Requests per microsecond for each client
fn normalize_rates(clients: &[ClientSpec], aggregate_rate: f64) -> Vec<f64> {
    let total: f64 = clients.iter().map(|c| c.rate_fraction).sum();
    if total <= 0.0 {
        return vec![0.0; clients.len()];
    }
    clients.iter().map(|c| aggregate_rate * c.rate_fraction / total / US_PER_SEC).collect()
}

/// One shared token sequence per prefix group, in first-appearance order
///
/// A group's length comes from the first member declaring a positive
/// `prefix_length`, else `default_len`.
fn generate_prefixes(
    clients: &[ClientSpec],
    rng: &mut ChaCha8Rng,
    default_len: usize,
    vocab_size: u32,
) -> BTreeMap<String, Vec<u32>> {
    let mut order: Vec<&str> = Vec::new();
    let mut lengths: BTreeMap<&str, usize> = BTreeMap::new();
    for client in clients {
        let Some(group) = client.prefix_group.as_deref() else {
            continue;
        };
        if !lengths.contains_key(group) {
            order.push(group);
            lengths.insert(group, 0);
        }
        if let (Some(slot), Some(len)) = (lengths.get_mut(group), client.prefix_length) {
            if *slot == 0 && len > 0 {
                *slot = len as usize;
            }
        }
    }

    order
        .into_iter()
        .map(|group| {
            let len = match lengths.get(group) {
                Some(&len) if len > 0 => len,
                _ => default_len,
            };
            (group.to_string(), random_token_ids(rng, len, vocab_size))
        })
        .collect()
}

/// Everything one client needs to generate, built before sampling starts
struct ClientSampler<'a> {
    client: &'a ClientSpec,
    seed: u64,
    arrival: ArrivalSampler,
    input: LengthDistribution,
    output: LengthDistribution,
    multimodal: Option<MultimodalSampler>,
    reason_ratio: Option<ReasonRatioSampler>,
    sessions: Option<SessionExpander>,
    prefix: &'a [u32],
}

impl<'a> ClientSampler<'a> {
    fn build(
        index: usize,
        client: &'a ClientSpec,
        rate_per_us: f64,
        seed: u64,
        prefix: &'a [u32],
        config: &GenerationConfig,
    ) -> Result<Self> {
        let path = format!("clients[{index}]");
        let length = |spec: &DistSpec, field: &str| {
            LengthDistribution::from_spec(spec).map_err(|e| {
                Error::spec(format!("{path}.{field} (client {:?}): {e:#}", client.id))
            })
        };
        let input = length(&client.input_distribution, "input_distribution")?;
        let output = length(&client.output_distribution, "output_distribution")?;

        let multimodal = client
            .multimodal
            .as_ref()
            .map(|mm| MultimodalSampler::from_spec(mm, &format!("{path}.multimodal")))
            .transpose()?;

        let reasoning = client.reasoning.as_ref();
        let reason_ratio = reasoning
            .and_then(|r| r.reason_ratio_distribution.as_ref())
            .map(|d| {
                ReasonRatioSampler::from_spec(
                    d,
                    &format!("{path}.reasoning.reason_ratio_distribution"),
                )
            })
            .transpose()?;
        let sessions = reasoning
            .and_then(|r| r.multi_turn.as_ref())
            .map(|mt| SessionExpander::new(mt, config.decode_us_per_token));

        Ok(Self {
            client,
            seed,
            arrival: ArrivalSampler::new(&client.arrival, rate_per_us),
            input,
            output,
            multimodal,
            reason_ratio,
            sessions,
            prefix,
        })
    }

    fn template(&self) -> Request {
        let c = self.client;
        let mut req = Request::new(0, Vec::new(), Vec::new(), c.id.clone());
        req.tenant_id = c.tenant_id.clone();
        req.slo_class = c.slo_str().to_string();
        req.model = c.model.clone();
        req.prefix_group = c.prefix_group.clone();
        req.streaming = c.streaming;
        req
    }

    fn is_active(&self, time_us: i64) -> bool {
        self.client.lifecycle.as_ref().map_or(true, |lc| lc.is_active(time_us))
    }

    /// Run the arrival loop; `cap` of 0 means unlimited
    fn generate(&self, horizon_us: i64, cap: usize, vocab_size: u32) -> Vec<Request> {
        let mut rng = rng_from_seed(self.seed);
        let template = self.template();
        let session_ctx = SessionContext {
            template: &template,
            prefix: self.prefix,
            input: &self.input,
            output: &self.output,
            reason_ratio: self.reason_ratio.as_ref(),
            vocab_size,
            horizon_us,
        };

        let mut requests = Vec::new();
        let mut sessions = 0u64;
        let mut now = 0i64;
        loop {
            if cap > 0 && requests.len() >= cap {
                break;
            }
            now = now.saturating_add(self.arrival.sample_iat(&mut rng));
            if now >= horizon_us {
                break;
            }
            if !self.is_active(now) {
                continue;
            }

            if let Some(expander) = &self.sessions {
                let session_id = format!("{}-session-{}", self.client.id, sessions);
                sessions += 1;
                requests.extend(expander.expand(&mut rng, &session_ctx, now, &session_id));
                continue;
            }

            let mut req = template.clone();
            req.arrival_time_us = now;
            let fresh = match &self.multimodal {
                Some(mm) => {
                    let modality = mm.sample(&mut rng);
                    req.modality = Some(modality);
                    random_token_ids(&mut rng, total_input_len(&modality), vocab_size)
                }
                None => {
                    let len = self.input.sample(&mut rng) as usize;
                    random_token_ids(&mut rng, len, vocab_size)
                }
            };
            let output_len = self.output.sample(&mut rng) as usize;
            req.output_tokens = random_token_ids(&mut rng, output_len, vocab_size);
            req.reason_ratio = self.reason_ratio.as_ref().map(|s| s.sample(&mut rng));

            let mut input = Vec::with_capacity(self.prefix.len() + fresh.len());
            input.extend_from_slice(self.prefix);
            input.extend(fresh);
            req.input_tokens = input;
            requests.push(req);
        }

        if cap > 0 {
            requests.truncate(cap);
        }
        debug!(
            "client {:?} ({} arrivals, {} input, {} output{}): generated {} requests",
            self.client.id,
            self.arrival.name(),
            self.input.name(),
            self.output.name(),
            if self.client.is_multi_turn() { ", multi-turn" } else { "" },
            requests.len()
        );
        requests
    }
}

/// Produces the ordered request stream for a workload spec
#[derive(Debug, Clone, Default)]
pub struct RequestGenerator {
    config: GenerationConfig,
}

impl RequestGenerator {
    pub fn new(config: GenerationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Generate all requests arriving before `horizon_us`
    ///
    /// `max_requests` caps the output (0 = horizon only). A non-positive
    /// horizon yields an empty stream without touching the spec.
    pub fn generate(
        &self,
        spec: &WorkloadSpec,
        horizon_us: i64,
        max_requests: i64,
    ) -> Result<Vec<Request>> {
        if horizon_us <= 0 {
            return Ok(Vec::new());
        }
        if max_requests < 0 {
            return Err(Error::spec(format!(
                "max_requests: must be non-negative, got {max_requests}"
            )));
        }

        let spec = resolve_spec(spec)?;
        let cfg = &self.config;

        let mut workload_rng = rng_from_seed(derive_seed(spec.seed, components::WORKLOAD));
        let rates = normalize_rates(&spec.clients, spec.aggregate_rate);
        let prefixes = generate_prefixes(
            &spec.clients,
            &mut workload_rng,
            cfg.default_prefix_length,
            cfg.vocab_size,
        );

        let per_client_cap = if max_requests > 0 {
            usize::try_from(max_requests.saturating_mul(cfg.per_client_cap_factor.max(1)))
                .unwrap_or(usize::MAX)
        } else {
            0
        };

        let client_parent = derive_seed(spec.seed, components::CLIENTS);
        let mut samplers = Vec::with_capacity(spec.clients.len());
        for (i, client) in spec.clients.iter().enumerate() {
            if rates[i] <= 0.0 {
                warn!("client {:?} has zero rate; skipping", client.id);
                continue;
            }
            let prefix = client
                .prefix_group
                .as_ref()
                .and_then(|g| prefixes.get(g))
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            samplers.push(ClientSampler::build(
                i,
                client,
                rates[i],
                derive_indexed_seed(client_parent, i as u64),
                prefix,
                cfg,
            )?);
        }

        let per_client: Vec<Vec<Request>> = if cfg.parallel {
            samplers
                .par_iter()
                .map(|s| s.generate(horizon_us, per_client_cap, cfg.vocab_size))
                .collect()
        } else {
            samplers
                .iter()
                .map(|s| s.generate(horizon_us, per_client_cap, cfg.vocab_size))
                .collect()
        };

        let mut requests: Vec<Request> = per_client.into_iter().flatten().collect();
        requests.sort_by_key(|r| r.arrival_time_us);
        if max_requests > 0 {
            requests.truncate(usize::try_from(max_requests).unwrap_or(usize::MAX));
        }
        for (i, req) in requests.iter_mut().enumerate() {
            req.id = format!("request_{i}");
        }

        debug!("generated {} requests from {} clients", requests.len(), samplers.len());
        Ok(requests)
    }
}

/// Generate with the default [`GenerationConfig`]
pub fn generate_requests(
    spec: &WorkloadSpec,
    horizon_us: i64,
    max_requests: i64,
) -> Result<Vec<Request>> {
    RequestGenerator::default().generate(spec, horizon_us, max_requests)
}

//! Workload specification and request synthesis

pub mod cohort;
pub mod convert;
pub mod generator;
pub mod inference_perf;
pub mod multimodal;
pub mod reasoning;
pub mod scenarios;
pub mod servegen;
pub mod spec;

// Re-export samplers from blis-common
pub use blis_common::{
    ArrivalProcess, ArrivalSampler, ArrivalSpec, DistKind, DistSpec, LengthDistribution, Request,
};

// Re-export main types
pub use cohort::expand_cohorts;
pub use convert::{
    compose_specs, convert_csv_trace, convert_inference_perf, convert_preset, convert_servegen,
    synthesize_from_distribution, DistributionParams,
};
pub use generator::{generate_requests, resolve_spec, GenerationConfig, RequestGenerator};
pub use inference_perf::{InferencePerfSpec, SharedPrefixSpec, StageSpec};
pub use scenarios::{scenario, SCENARIOS};
pub use spec::{
    ActiveWindow, Category, ClientSpec, CohortSpec, ContextGrowth, DiurnalSpec, DrainSpec,
    LifecycleSpec, MultiTurnSpec, MultimodalSpec, NetworkSpec, ReasoningSpec, ServeGenDataSpec,
    SloClass, SpikeSpec, WorkloadSpec,
};

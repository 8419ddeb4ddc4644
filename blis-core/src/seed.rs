//! Seed derivation for reproducible randomness
//!
//! Every subsystem, cohort and client draws from its own RNG sub-stream
//! derived from one top-level seed. Two derivations are provided:
//! - [`derive_seed`]: named components, via SHA-256 of the master seed and
//!   the component name.
//! - [`derive_indexed_seed`]: positional sub-streams (the i-th cohort, the
//!   i-th client), via a multiplicative 64-bit mix of seed and index.
//!
//! All sub-streams are [`ChaCha8Rng`], whose output is stable across
//! platforms and releases.
//!
//! # Example
//!
//! ```
//! use blis_core::seed::{derive_indexed_seed, derive_seed};
//!
//! let master_seed = 42;
//! let workload = derive_seed(master_seed, "workload");
//!
//! // Same inputs always produce same output
//! assert_eq!(derive_indexed_seed(workload, 3), derive_indexed_seed(workload, 3));
//!
//! // Different indices get different seeds
//! assert_ne!(derive_indexed_seed(workload, 0), derive_indexed_seed(workload, 1));
//! ```

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};

/// Derive a component-specific seed from a master seed using SHA-256
///
/// # Example
///
/// ```
/// use blis_core::seed::derive_seed;
///
/// let master = 12345;
/// let seed1 = derive_seed(master, "workload");
/// let seed2 = derive_seed(master, "cohorts");
///
/// assert_eq!(seed1, derive_seed(master, "workload"));
/// assert_ne!(seed1, seed2);
/// ```
pub fn derive_seed(master_seed: u64, component: &str) -> u64 {
    let mut hasher = Sha256::new();

    // Big-endian for consistency
    hasher.update(master_seed.to_be_bytes());
    hasher.update(component.as_bytes());

    let result = hasher.finalize();
    u64::from_be_bytes([
        result[0], result[1], result[2], result[3], result[4], result[5], result[6], result[7],
    ])
}

const GOLDEN_GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;
const SEED_MULTIPLIER: u64 = 0xD605_BBB5_8C8A_BBED;

/// SplitMix64 finalizer
fn mix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Derive the seed of the `index`-th sub-stream of `seed`
///
/// Seed and index are each spread by an odd multiplier and a full
/// avalanche before they are combined, so `(seed, i)` and `(seed', i')`
/// pairs that agree under XOR or addition do not collide.
pub fn derive_indexed_seed(seed: u64, index: u64) -> u64 {
    let s = mix64(seed.wrapping_mul(SEED_MULTIPLIER));
    let i = mix64(index.wrapping_add(1).wrapping_mul(GOLDEN_GAMMA));
    mix64(s ^ i.rotate_left(17))
}

/// Construct the RNG for a derived seed
pub fn rng_from_seed(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// Standard component names for seed derivation
///
/// Using constants ensures consistent naming across the codebase
pub mod components {
    /// Shared prefix token sequences
    pub const WORKLOAD: &str = "workload";
    /// Parent of per-client sub-streams
    pub const CLIENTS: &str = "client_streams";
    /// Parent of per-cohort sub-streams
    pub const COHORTS: &str = "cohort_expansion";
    /// Synthetic token ids for trace replay
    pub const REPLAY: &str = "trace_replay";
}

//! Client-perspective latency adjustment
//!
//! The simulator reports server-side latencies. A client additionally pays
//! one round trip plus the time to move token ids over its link: input
//! tokens before the first token, output tokens before completion.

use crate::workload::spec::NetworkSpec;

/// Token ids travel as 32-bit integers
const BYTES_PER_TOKEN: f64 = 4.0;

/// Microseconds to transfer `tokens` token ids over a `bandwidth_mbps` link
///
/// A non-positive bandwidth means an unconstrained link.
pub fn transfer_delay_us(bandwidth_mbps: f64, tokens: usize) -> f64 {
    if bandwidth_mbps <= 0.0 {
        return 0.0;
    }
    let bits = tokens as f64 * BYTES_PER_TOKEN * 8.0;
    bits / (bandwidth_mbps * 1e6) * 1e6
}

/// Server TTFT plus RTT and input upload
pub fn client_ttft(server_ttft_us: f64, network: Option<&NetworkSpec>, input_tokens: usize) -> f64 {
    match network {
        None => server_ttft_us,
        Some(net) => {
            server_ttft_us + net.rtt_ms * 1000.0 + transfer_delay_us(net.bandwidth_mbps, input_tokens)
        }
    }
}

/// Server E2E plus RTT, input upload and output download
pub fn client_e2e(
    server_e2e_us: f64,
    network: Option<&NetworkSpec>,
    input_tokens: usize,
    output_tokens: usize,
) -> f64 {
    match network {
        None => server_e2e_us,
        Some(net) => {
            server_e2e_us
                + net.rtt_ms * 1000.0
                + transfer_delay_us(net.bandwidth_mbps, input_tokens)
                + transfer_delay_us(net.bandwidth_mbps, output_tokens)
        }
    }
}

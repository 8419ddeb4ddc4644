//! The request record handed to the simulator core.

use serde::{Deserialize, Serialize};

/// Per-modality token counts for multimodal requests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModalityTokens {
    pub text: u32,
    pub image: u32,
    pub audio: u32,
    pub video: u32,
}

impl ModalityTokens {
    pub fn total(&self) -> u64 {
        self.text as u64 + self.image as u64 + self.audio as u64 + self.video as u64
    }
}

/// A synthesized inference request
///
/// `id` is empty until the generator assigns final ids after ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    /// Arrival time in microseconds since the start of the run
    pub arrival_time_us: i64,
    pub input_tokens: Vec<u32>,
    pub output_tokens: Vec<u32>,
    pub client_id: String,
    pub tenant_id: String,
    pub slo_class: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix_group: Option<String>,
    pub streaming: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub round_index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modality: Option<ModalityTokens>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_ratio: Option<f64>,
}

impl Request {
    /// Create an unnumbered single-round request
    pub fn new(
        arrival_time_us: i64,
        input_tokens: Vec<u32>,
        output_tokens: Vec<u32>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            id: String::new(),
            arrival_time_us,
            input_tokens,
            output_tokens,
            client_id: client_id.into(),
            tenant_id: String::new(),
            slo_class: String::new(),
            model: None,
            prefix_group: None,
            streaming: false,
            session_id: None,
            round_index: 0,
            modality: None,
            reason_ratio: None,
        }
    }

    pub fn input_len(&self) -> usize {
        self.input_tokens.len()
    }

    pub fn output_len(&self) -> usize {
        self.output_tokens.len()
    }
}

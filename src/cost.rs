//! Cost estimates.

use std::fmt;

use schemars::JsonSchema;

use crate::{drivers::TokenUsage, models::ModelInfo, prelude::*};

/// Estimated cost of a call, in USD.
#[derive(Clone, Copy, Debug, Default, JsonSchema, PartialEq, Serialize)]
pub struct CostEstimate {
    /// Cost of the input tokens.
    pub input_cost: f64,
    /// Cost of the output tokens.
    pub output_cost: f64,
    /// `input_cost + output_cost`.
    pub total_cost: f64,
}

/// Estimate the cost of a call. Unknown models are priced like our default
/// model. Nothing is rounded.
pub fn estimate_cost(model_id: &str, prompt_tokens: u64, completion_tokens: u64) -> CostEstimate {
    let rates = ModelInfo::find_or_default(model_id);
    let input_cost = (prompt_tokens as f64 / 1_000_000.0) * rates.input_price;
    let output_cost = (completion_tokens as f64 / 1_000_000.0) * rates.output_price;
    CostEstimate {
        input_cost,
        output_cost,
        total_cost: input_cost + output_cost,
    }
}

/// Estimate the cost of some token usage.
pub fn estimate_usage_cost(model_id: &str, usage: &TokenUsage) -> CostEstimate {
    estimate_cost(model_id, usage.prompt_tokens, usage.completion_tokens)
}

impl fmt::Display for CostEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "${:.6} (input ${:.6}, output ${:.6})",
            self.total_cost, self.input_cost, self.output_cost
        )
    }
}

//! Technique registry + engine: a catalog of prompt transformations applied
//! in priority order, plus closed-form quality metrics.
//!
//! `Technique` trait grounded on `agent/tools/base.rs`'s `Tool` trait shape
//! (default-impl methods where the spec allows). `TechniqueRegistry` grounded
//! on `agent/tools/registry.rs`'s `ToolRegistry`: idempotent registration,
//! rejecting conflicting re-registration. The teacher's ordered-middleware
//! chain is repurposed (not reused verbatim) into the engine's
//! priority-ordered stable application loop.

mod engine;
pub(crate) mod implementations;
mod metrics;
mod registry;

pub use engine::{EnhanceOutcome, TechniqueEngine};
pub use metrics::QualityMetrics;
pub use registry::{TechniqueRegistry, TechniqueRegistryError};

use std::collections::HashMap;

use serde_json::Value;

/// Per-call option bag forwarded to techniques; unrecognized keys are
/// ignored, recognized ones are pulled out by each technique's `apply`.
pub type TechniqueContext = HashMap<String, Value>;

/// Static, immutable-after-registration record per technique.
#[derive(Debug, Clone)]
pub struct TechniqueDescriptor {
    pub id: &'static str,
    pub name: &'static str,
    pub priority: i32,
    pub enabled: bool,
    pub default_parameters: TechniqueContext,
}

/// Result of validating a generated payload against a requested output
/// format (used by `structured_output`, spec §4.4 and §8 scenario 6).
#[derive(Debug, Clone, serde::Serialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub errors: Vec<String>,
    pub parsed_data: Option<Value>,
}

/// Contract every technique implements. `apply` must be a pure,
/// deterministic function of `(text, ctx, descriptor.parameters)`.
pub trait Technique: Send + Sync {
    fn descriptor(&self) -> &TechniqueDescriptor;

    fn apply(&self, text: &str, ctx: &TechniqueContext) -> String;

    /// Quick gate; a `false` result causes the engine to skip this
    /// technique for the current call and record a warning.
    fn validate_input(&self, text: &str, _ctx: &TechniqueContext) -> bool {
        !text.trim().is_empty()
    }

    /// Rough, char-based token estimate; exact tokenizer fidelity is not
    /// required.
    fn estimate_tokens(&self, text: &str) -> usize {
        (text.chars().count() as f64 / 4.0).ceil() as usize
    }

    /// Optional introspective quality metrics specific to this technique.
    fn metrics(&self, _generated_text: &str) -> HashMap<String, f64> {
        HashMap::new()
    }
}

pub use implementations::{all_techniques, validate_structured_output};

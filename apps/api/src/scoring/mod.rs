//! The scoring core: deterministic rules that turn an opaque oracle result
//! into normalized, evidence-linked, policy-weighted hiring decisions.
//!
//! Everything in this module tree except the orchestrator is pure and
//! synchronous; the orchestrator adds the timeout/retry envelope around the
//! oracle call and drives the pipeline.

pub mod cost;
pub mod evidence;
pub mod normalize;
pub mod orchestrator;
pub mod policy;
pub mod record;
pub mod result;

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub(crate) fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

pub(crate) fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

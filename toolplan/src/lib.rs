//! Tool orchestration for language-model agents.
//!
//! Depend on this crate via `cargo add toolplan`. It bundles the workspace
//! crates behind feature flags so applications can pull in only what they
//! use.

#![warn(missing_docs, clippy::pedantic)]

/// Re-export shared primitives for convenience.
pub use toolplan_primitives as primitives;

/// Model adapters (enabled by `adapters` feature).
#[cfg(feature = "adapters")]
pub use toolplan_adapters as adapters;

/// Capability registry, executor and built-in tools (enabled by `tools` feature).
#[cfg(feature = "tools")]
pub use toolplan_tools as tools;

/// Plan-then-execute engine (enabled by `planner` feature).
#[cfg(feature = "planner")]
pub use toolplan_planner as planner;

/// Logging setup (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use toolplan_telemetry as telemetry;

/// Configuration loading (enabled by `config` feature).
#[cfg(feature = "config")]
pub use toolplan_config as config;

/// Registry with every built-in capability, plus `plan` backed by `adapter`.
#[cfg(feature = "planner")]
#[must_use]
pub fn default_registry(
    adapter: std::sync::Arc<dyn adapters::ModelAdapter>,
) -> std::sync::Arc<tools::CapabilityRegistry> {
    let mut builder = tools::RegistryBuilder::new();
    tools::builtin::register_all(&mut builder);
    planner::register(&mut builder, adapter);
    builder.freeze()
}

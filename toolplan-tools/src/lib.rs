//! Capability registry, per-task executor, and built-in tools.
//!
//! Applications register capability factories on a [`RegistryBuilder`],
//! freeze it, and build one [`Executor`] per task. The executor validates
//! every call against the tool's JSON Schema before dispatching it and owns
//! the resources its tools acquired until [`Executor::cleanup`] runs.

#![warn(missing_docs, clippy::pedantic)]

pub mod builtin;
pub mod descriptor;
pub mod error;
pub mod executor;
pub mod http;
pub mod process;
pub mod registry;
pub mod schema;
pub mod workspace;

#[cfg(test)]
mod test_server;

pub use descriptor::{CleanupHook, Tool, ToolDescriptor, ToolMetadata};
pub use error::{ErrorKind, Phase, ToolError, ToolResult};
pub use executor::{Executor, ExecutorBuilder, Scoped, run_scoped};
pub use registry::{BuildContext, CapabilityFactory, CapabilityRegistry, RegistryBuilder};

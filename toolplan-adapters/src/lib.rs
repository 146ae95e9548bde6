//! Language model adapters used by the planner.
//!
//! Each module exposes an implementation for a specific provider while sharing
//! a common trait-based interface defined in [`traits`].

#![warn(missing_docs, clippy::pedantic)]

pub mod factory;
pub mod ollama;
pub mod openai;
pub mod text;
pub mod traits;

mod http_client;

pub use factory::from_settings;
pub use text::{strip_code_fence, strip_think_tags};
pub use traits::{
    AdapterError, AdapterMetadata, AdapterResult, AdapterStream, InferenceChunk, InferenceOutput,
    InferenceRequest, MessageRole, ModelAdapter, PromptMessage, collect_output,
};

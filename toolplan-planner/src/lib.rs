//! Plan-then-execute engine on top of the toolplan executor.
//!
//! A [`Planner`] asks a model for a JSON plan over the executor's tools,
//! validates it, runs the steps in order while feeding each step's output
//! into later steps through `${<step-id>.output}` placeholders, and asks the
//! model to answer from the collected evidence.
//!
//! [`ask_with_tools`] is the single-turn alternative: the model emits tool
//! calls directly and the executor runs them.

#![warn(missing_docs, clippy::pedantic)]

pub mod capability;
pub mod direct;
pub mod lifecycle;
mod model;
pub mod parse;
pub mod placeholder;
pub mod plan;
pub mod planner;
pub mod prompt;
pub mod task;

pub use capability::register;
pub use direct::ask_with_tools;
pub use lifecycle::{Lifecycle, LifecycleError, PlannerEvent, PlannerState};
pub use parse::{DEFAULT_MAX_STEPS, PlanParser, plan_schema};
pub use placeholder::Placeholders;
pub use plan::{Plan, Step, StepOutcome};
pub use planner::{PlanOutcome, Planner};
pub use task::{TaskError, TaskReport, run_task};

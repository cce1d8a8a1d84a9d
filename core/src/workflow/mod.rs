// orderflow/src/workflow/mod.rs

//! A small named-step runner for the multi-step compensation and dispatch
//! flows. Each workflow owns an ordered list of steps; each step has one or
//! more async handlers operating on a shared `ContextData<T>`. A handler can
//! stop the run early (`StepControl::Stop`) or fail it (`Err`).

pub mod context_data;
pub mod control;
pub mod definition;

pub use context_data::ContextData;
pub use control::{StepControl, WorkflowOutcome};
pub use definition::{Handler, SkipCondition, StepDef, Workflow};

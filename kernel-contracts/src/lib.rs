//! Kernel Contracts - the access-contract evaluator.
//!
//! Contract `code` is not a foreign bytecode VM (out of scope: agent code
//! execution is a sandbox/container collaborator concern, not this
//! kernel's). Evaluation is instead a closed set of [`ContractProgram`]
//! variants matching the genesis templates, plus a predicate that
//! dispatches back through the execution engine for artifacts whose code
//! names a registered evaluator function.

mod evaluator;
mod program;

pub use evaluator::ContractEvaluator;
pub use program::ContractProgram;

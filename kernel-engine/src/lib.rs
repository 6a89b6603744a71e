//! Kernel Engine - the top-level dispatcher for the five primitive actions
//! (read/write/edit/delete/invoke) and the capability object handed to
//! invoked artifact code.

mod capability;
mod engine;
mod handler;
mod llm;

pub use capability::Capability;
pub use engine::{EngineInvoker, ExecutionEngine};
pub use handler::InvocationHandler;
pub use llm::{EchoLlmProvider, LlmProvider, LlmRequest, LlmResponse};

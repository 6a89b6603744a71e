//! Shared test infrastructure for the kernel workspace: proptest
//! generators for the core entity types, pre-wired store/ledger/engine
//! fixtures with genesis installed, and assertions for the invariants this
//! kernel actually makes (scrip conservation, error-kind shape, event-log
//! presence).
//!
//! Nothing here is `cfg(test)` — other crates' `[dev-dependencies]` pull
//! this crate in, so its own exports must build under an ordinary
//! dependency edge.

pub mod assertions;
pub mod fixtures;
pub mod generators;

pub use fixtures::{bare_kernel, bare_kernel_with_config, data_artifact, genesis_kernel, new_account, BareKernel, GenesisKernel};

//! Kernel Ledger - scrip accounting and token-bucket resource metering.

mod ledger;

pub use ledger::{InMemoryLedger, Ledger, LedgerSnapshot};

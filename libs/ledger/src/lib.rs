//! Host ledger layer
//!
//! The exchange core runs inside a host that executes transactions
//! serially against an ordered key–value store, stamps every transaction
//! with a deterministic id and timestamp, attests the caller's identity,
//! and accepts at most one named event per transaction. This crate models
//! that contract so the matching, compliance and settlement logic stays
//! independent of any concrete platform.
//!
//! # Modules
//! - `store`: `StateStore` trait and the in-memory `MemoryStore`
//! - `context`: per-transaction context with buffered writes and the event slot
//! - `identity`: MSP identity directory and caller roles
//! - `error`: host-side error type

pub mod context;
pub mod error;
pub mod identity;
pub mod store;

pub use context::{EmittedEvent, TxContext, TxStamp};
pub use error::LedgerError;
pub use identity::{Caller, IdentityDirectory, Role};
pub use store::{MemoryStore, StateStore};

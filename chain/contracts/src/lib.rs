//! Exchange core contracts
//!
//! Three cooperating services share one ledger keyspace and hand work to
//! each other only through persisted records and named events: the
//! matching engine creates pending trades, the compliance engine gates
//! them, and the settlement engine exchanges cash against securities with
//! a guarantee-fund fallback.
//!
//! # Modules
//! - `events`: Event names and shaped payloads
//! - `errors`: Per-contract error taxonomies with kind tags
//! - `matching`: Security listing, order entry, continuous double-auction matching
//! - `rules`: Compliance rule definitions and evaluation
//! - `compliance`: Regulator records and trade checks
//! - `accounts`: Cash and securities custody, deposits, withdrawals
//! - `settlement`: DvP instructions, execution, failure mutualization

pub mod accounts;
pub mod compliance;
pub mod errors;
pub mod events;
pub mod matching;
pub mod rules;
pub mod settlement;

pub use compliance::ComplianceContract;
pub use matching::MatchingContract;
pub use settlement::SettlementContract;

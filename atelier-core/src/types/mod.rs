//! Core row types
//!
//! The four persisted objects the engine coordinates:
//!
//! - [`TraitListing`]: catalog read model with supply counters
//! - [`Reservation`]: time-bounded capacity hold
//! - [`Purchase`]: the settlement unit with its forward-only state machine
//! - [`GiftBalance`]: free-redemption allowance
//!
//! Row ownership is strict: the reservation manager owns reservations, the
//! purchase orchestrator owns purchases and is the only writer of trait
//! supply counters, the gift ledger owns gift balances.

pub mod common;
pub mod gift;
pub mod listing;
pub mod purchase;
pub mod reservation;

pub use common::*;
pub use gift::*;
pub use listing::*;
pub use purchase::*;
pub use reservation::*;

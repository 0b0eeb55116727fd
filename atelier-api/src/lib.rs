//! Atelier API Server
//!
//! Provides the REST API over the trait checkout engine.
//!
//! ## Endpoints
//!
//! ### Checkout flow
//! - POST /reservations - Reserve one unit of a trait
//! - POST /reservations/:reservation_id/cancel - Release a hold
//! - POST /transactions/build - Build the settlement bundle for a hold
//! - POST /transactions/submit - Submit a signed bundle
//!
//! ### Purchases
//! - GET /purchases/:purchase_id - Get purchase status
//! - GET /purchases/by-signature/:signature - Look up by ledger signature
//! - GET /purchases/pending - Purchases awaiting settlement
//!
//! ### Catalog & gift balances
//! - GET /traits - List the trait catalog
//! - GET /traits/:trait_id - Get a trait listing
//! - GET /gift-balances/:wallet_address/:trait_id - Get a gift balance
//!
//! ### Administration
//! - POST /admin/traits - Create or replace a trait listing
//! - POST /admin/gift-balances - Credit gift redemptions
//! - POST /admin/sweep - Expire lapsed holds
//! - POST /admin/reconcile - Resolve stale pending purchases
//!
//! ### Introspection
//! - GET /health, GET /ready - Liveness and readiness
//! - GET /stats - Service, storage and metrics snapshot
//! - GET /metrics - Prometheus text exposition

pub mod dto;
pub mod error;
pub mod routes;
pub mod server;
pub mod state;

pub use dto::*;
pub use error::*;
pub use routes::*;
pub use server::*;
pub use state::*;

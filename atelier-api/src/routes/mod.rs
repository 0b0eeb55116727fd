//! API route handlers

pub mod admin;
pub mod gifts;
pub mod health;
pub mod purchases;
pub mod reservations;
pub mod traits;
pub mod transactions;

use axum::{routing::get, routing::post, Router};

use crate::state::AppState;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))
        .route("/stats", get(health::stats))
        .route("/metrics", get(health::metrics_export))
        // Reservation endpoints
        .route("/reservations", post(reservations::create_reservation))
        .route(
            "/reservations/:reservation_id/cancel",
            post(reservations::cancel_reservation),
        )
        // Transaction endpoints
        .route("/transactions/build", post(transactions::build_transaction))
        .route("/transactions/submit", post(transactions::submit_transaction))
        // Purchase endpoints
        .route("/purchases/pending", get(purchases::list_pending))
        .route(
            "/purchases/by-signature/:signature",
            get(purchases::get_purchase_by_signature),
        )
        .route("/purchases/:purchase_id", get(purchases::get_purchase))
        // Trait catalog endpoints
        .route("/traits", get(traits::list_traits))
        .route("/traits/:trait_id", get(traits::get_trait))
        // Gift balance endpoints
        .route(
            "/gift-balances/:wallet_address/:trait_id",
            get(gifts::get_gift_balance),
        )
        // Admin endpoints
        .route("/admin/traits", post(traits::upsert_trait))
        .route("/admin/gift-balances", post(gifts::credit_gift_balance))
        .route("/admin/sweep", post(admin::run_sweep))
        .route("/admin/reconcile", post(admin::run_reconciliation))
        // State
        .with_state(state)
}

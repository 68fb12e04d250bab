use axum::{
    middleware as axum_middleware,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;

use crate::api::handlers;
use crate::auth::middleware::auth_middleware;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let public_routes = Router::new()
        .route("/markets/:symbol/depth", get(handlers::order::order_book_depth))
        .route("/accounts", get(handlers::account::list_accounts))
        .route("/accounts", post(handlers::account::create_account))
        .route("/accounts/:id", get(handlers::account::get_account))
        .route("/accounts/:id", patch(handlers::account::update_account))
        .route("/risk/orders", get(handlers::risk::list_all_orders))
        .route("/risk/alerts", get(handlers::risk::list_risk_alerts))
        .route("/risk/symbols/:symbol/halt", post(handlers::risk::halt_symbol));

    let protected_routes = Router::new()
        .route("/accounts/me", get(handlers::account::get_current_account))
        .route("/accounts/me/positions", get(handlers::account::list_positions))
        .route("/accounts/me/transactions", get(handlers::account::list_transactions))
        .route("/accounts/me/transactions", post(handlers::account::post_transaction))
        .route("/orders", post(handlers::order::submit_order))
        .route("/orders/me", get(handlers::order::list_my_orders))
        .route("/orders/:id", patch(handlers::order::edit_order))
        .route("/orders/:id", axum::routing::delete(handlers::order::cancel_order))
        .layer(axum_middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(public_routes).merge(protected_routes)
}

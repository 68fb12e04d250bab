//! Order API handlers: submit, cancel, edit, and query orders; order book
//! depth snapshots.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::middleware::AuthAccount;
use crate::models::{EditOrderRequest, Order, OrderResponse, OrderStatus, SubmitOrderRequest, Trade};
use crate::orderbook::BookSnapshot;
use crate::utils::response::AppError;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct SubmitOrderResponse {
    pub order: OrderResponse,
    pub trades: Vec<Trade>,
}

/// POST /orders
pub async fn submit_order(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthAccount>,
    Json(req): Json<SubmitOrderRequest>,
) -> Result<Json<SubmitOrderResponse>, AppError> {
    let now = Utc::now();
    let order = Order {
        id: Uuid::new_v4(),
        account_id: auth.account_id,
        symbol: req.symbol,
        side: req.side,
        order_type: req.order_type,
        price: req.price,
        quantity: req.quantity,
        filled_quantity: rust_decimal::Decimal::ZERO,
        time_in_force: req.time_in_force,
        internal: req.internal,
        status: OrderStatus::Open,
        edited: false,
        created_at: now,
        updated_at: now,
        closed_at: None,
        reject_reason: None,
        execution_price: None,
    };

    crate::metrics::record_order_submitted(&order.side.to_string(), &format!("{:?}", order.order_type));
    let timer = crate::metrics::Timer::new();
    let outcome = state.matching.submit(order).await?;
    crate::metrics::record_order_match_duration(timer.elapsed_secs());
    if outcome.order.status == OrderStatus::Rejected {
        crate::metrics::record_order_rejected();
    }
    for trade in &outcome.trades {
        crate::metrics::record_trade_executed(&trade.symbol, (trade.price * trade.quantity).to_f64().unwrap_or(0.0));
    }

    Ok(Json(SubmitOrderResponse {
        order: outcome.order.into(),
        trades: outcome.trades,
    }))
}

/// DELETE /orders/:id
pub async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthAccount>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = state.matching.cancel(order_id, auth.account_id).await?;
    crate::metrics::record_order_cancelled();
    Ok(Json(order.into()))
}

/// PATCH /orders/:id
pub async fn edit_order(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthAccount>,
    Path(order_id): Path<Uuid>,
    Json(req): Json<EditOrderRequest>,
) -> Result<Json<SubmitOrderResponse>, AppError> {
    let outcome = state
        .matching
        .edit(order_id, auth.account_id, req.price, req.quantity)
        .await?;
    Ok(Json(SubmitOrderResponse {
        order: outcome.order.into(),
        trades: outcome.trades,
    }))
}

/// GET /orders/me
pub async fn list_my_orders(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthAccount>,
) -> Result<Json<Vec<Order>>, AppError> {
    Ok(Json(
        state
            .store
            .list_orders_by_account(auth.account_id)
            .await
            .map_err(crate::error::EngineError::from)?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct DepthQuery {
    #[serde(default = "default_depth")]
    pub levels: usize,
    #[serde(default)]
    pub internal: bool,
}

fn default_depth() -> usize {
    10
}

/// GET /markets/:symbol/depth
pub async fn order_book_depth(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
    Query(query): Query<DepthQuery>,
) -> Json<BookSnapshot> {
    let snapshot = state.matching.depth(&symbol, query.levels, query.internal);
    let bid_depth: rust_decimal::Decimal = snapshot.bids.iter().map(|(_, qty)| qty).sum();
    let ask_depth: rust_decimal::Decimal = snapshot.asks.iter().map(|(_, qty)| qty).sum();
    crate::metrics::set_orderbook_depth(&symbol, "bid", bid_depth.to_i64().unwrap_or(0));
    crate::metrics::set_orderbook_depth(&symbol, "ask", ask_depth.to_i64().unwrap_or(0));
    Json(snapshot)
}

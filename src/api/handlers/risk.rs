//! Risk API handlers (§6): operator-facing views over every order in the
//! system, joined against the submitting account and filtered to rejections,
//! plus the trading-halt admin action.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{OrderResponse, OrderStatus};
use crate::utils::response::AppError;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct OrderWithAccount {
    #[serde(flatten)]
    pub order: OrderResponse,
    pub account_id: Uuid,
    pub account_name: String,
}

/// GET /risk/orders
pub async fn list_all_orders(State(state): State<Arc<AppState>>) -> Result<Json<Vec<OrderWithAccount>>, AppError> {
    let orders = state.store.list_all_orders().await.map_err(EngineError::from)?;
    let accounts = state.ledger.list_accounts().await?;
    let names: std::collections::HashMap<Uuid, String> =
        accounts.into_iter().map(|a| (a.id, a.name)).collect();

    Ok(Json(
        orders
            .into_iter()
            .map(|order| {
                let account_id = order.account_id;
                let account_name = names.get(&account_id).cloned().unwrap_or_else(|| "unknown".to_string());
                OrderWithAccount {
                    order: order.into(),
                    account_id,
                    account_name,
                }
            })
            .collect(),
    ))
}

/// GET /risk/alerts
///
/// Every rejected order, surfaced with its risk-gate rejection reason.
pub async fn list_risk_alerts(State(state): State<Arc<AppState>>) -> Result<Json<Vec<OrderWithAccount>>, AppError> {
    let Json(all) = list_all_orders(State(state)).await?;
    Ok(Json(
        all.into_iter()
            .filter(|o| o.order.status == OrderStatus::Rejected)
            .collect(),
    ))
}

#[derive(Debug, Serialize)]
pub struct HaltResponse {
    pub symbol: String,
    pub halted: bool,
}

/// POST /risk/symbols/:symbol/halt
///
/// Halts trading in a symbol: every subsequent order submission for it is
/// rejected by the risk gate's symbol-disabled check.
pub async fn halt_symbol(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> Json<HaltResponse> {
    state.matching.disable_symbol(&symbol).await;
    Json(HaltResponse { symbol, halted: true })
}

//! Account API handlers: account CRUD, balances, positions, and the
//! transaction ledger.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::middleware::AuthAccount;
use crate::models::{
    Account, CreateAccountRequest, Position, Transaction, UpdateAccountRequest,
};
use crate::utils::response::AppError;
use crate::AppState;

/// POST /accounts
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateAccountRequest>,
) -> Result<Json<Account>, AppError> {
    let account = Account::new(req.name, req.account_type, req.starting_cash);
    let account = state.ledger.create_account(account).await?;
    Ok(Json(account))
}

/// GET /accounts
pub async fn list_accounts(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Account>>, AppError> {
    let accounts = state.ledger.list_accounts().await?;
    let active = accounts.iter().filter(|a| a.enabled).count();
    crate::metrics::set_accounts_active(active as i64);
    Ok(Json(accounts))
}

/// GET /accounts/me
pub async fn get_current_account(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthAccount>,
) -> Result<Json<Account>, AppError> {
    Ok(Json(state.ledger.get_account(auth.account_id).await?))
}

/// GET /accounts/:id
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Account>, AppError> {
    Ok(Json(state.ledger.get_account(id).await?))
}

/// PATCH /accounts/:id
pub async fn update_account(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateAccountRequest>,
) -> Result<Json<Account>, AppError> {
    let account = state
        .ledger
        .update_account(id, req.enabled, req.max_order_value, req.max_position_qty, req.risk_level)
        .await?;
    Ok(Json(account))
}

/// GET /accounts/me/positions
pub async fn list_positions(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthAccount>,
) -> Result<Json<Vec<Position>>, AppError> {
    Ok(Json(state.ledger.list_positions(auth.account_id).await?))
}

/// GET /accounts/me/transactions
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthAccount>,
) -> Result<Json<Vec<Transaction>>, AppError> {
    Ok(Json(state.ledger.list_transactions(auth.account_id).await?))
}

#[derive(Debug, serde::Deserialize)]
pub struct PostTransactionRequest {
    pub transaction_type: crate::models::TransactionType,
    pub amount: rust_decimal::Decimal,
}

/// POST /accounts/me/transactions
pub async fn post_transaction(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthAccount>,
    Json(req): Json<PostTransactionRequest>,
) -> Result<Json<Account>, AppError> {
    let account = state
        .ledger
        .post_transaction(auth.account_id, req.transaction_type, req.amount)
        .await?;
    Ok(Json(account))
}

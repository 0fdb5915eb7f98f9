//! Account management HTTP handlers.
//!
//! Provisioning convenience endpoints, not part of the core engine (see
//! module docs on `crate::models::account`) - there is no per-caller
//! ownership scoping because the engine itself has none; any authenticated
//! caller may create, list, or look up any account.
//!
//! - `POST /api/v1/accounts` - create a new account
//! - `GET /api/v1/accounts/:id` - get account by id
//! - `GET /api/v1/accounts` - list all accounts

use crate::{
    db::DbPool,
    error::AppError,
    models::account::{AccountResponse, CreateAccountRequest},
    store,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

/// Create a new account.
pub async fn create_account(
    State(pool): State<DbPool>,
    Json(request): Json<CreateAccountRequest>,
) -> Result<impl IntoResponse, AppError> {
    let account =
        store::accounts::insert(&pool, &request.name, &request.currency, request.initial_balance)
            .await?;

    Ok((StatusCode::CREATED, Json(AccountResponse::from(account))))
}

/// Get a specific account by id.
pub async fn get_account(
    State(pool): State<DbPool>,
    Path(account_id): Path<Uuid>,
) -> Result<Json<AccountResponse>, AppError> {
    let account = store::accounts::find_by_id(&pool, account_id)
        .await?
        .ok_or(AppError::AccountNotFound)?;

    Ok(Json(account.into()))
}

/// List all accounts.
pub async fn list_accounts(
    State(pool): State<DbPool>,
) -> Result<Json<Vec<AccountResponse>>, AppError> {
    let accounts = store::accounts::list_all(&pool).await?;
    let responses: Vec<AccountResponse> = accounts.into_iter().map(Into::into).collect();

    Ok(Json(responses))
}

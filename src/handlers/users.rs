//! User handlers

use crate::storage::NewUser;
use crate::AppState;
use axum::extract::rejection::JsonRejection;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::ApiError;

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    user_id: i64,
    first_name: String,
    last_name: String,
    #[serde(default)]
    addresses: Vec<AddressEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddressEntry {
    address: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    user_id: i64,
    first_name: String,
    last_name: String,
    addresses: Vec<AddressEntry>,
}

pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(req) = payload.map_err(|rejection| {
        warn!("Rejected create request: {}", rejection);
        ApiError::bad_request("error parsing request input")
    })?;

    info!("Creating user: id={}", req.user_id);

    let user = NewUser {
        id: req.user_id,
        first_name: req.first_name,
        last_name: req.last_name,
        addresses: req.addresses.into_iter().map(|a| a.address).collect(),
    };
    state.db.create_user(&user).await?;

    Ok(StatusCode::OK)
}

pub async fn addresses(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UserResponse>, ApiError> {
    let user_id = headers
        .get("USER_ID")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<i64>().ok())
        .ok_or_else(|| ApiError::bad_request("wrong USER_ID value"))?;

    let user = state.db.get_user_by_id(user_id).await?;

    Ok(Json(UserResponse {
        user_id: user.id,
        first_name: user.first_name,
        last_name: user.last_name,
        addresses: user
            .addresses
            .into_iter()
            .map(|address| AddressEntry { address })
            .collect(),
    }))
}

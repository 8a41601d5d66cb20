use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use crate::error::GatewayError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(input): Json<RegisterRequest>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let commands = state.commands().await?;
    commands.register(&input.username, &input.password).await?;
    Ok(Json(serde_json::json!({ "data": { "ok": true } })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(input): Json<LoginRequest>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let commands = state.commands().await?;
    let identity = commands.login(&input.username, &input.password).await?;
    Ok(Json(serde_json::json!({
        "data": { "user_id": identity.user_id }
    })))
}

/// Reports who the gateway is currently acting as. The token itself never
/// leaves the process.
pub async fn session(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let body = match state.session.get().await {
        Some(identity) => serde_json::json!({
            "data": { "authenticated": true, "user_id": identity.user_id }
        }),
        None => serde_json::json!({
            "data": { "authenticated": false }
        }),
    };
    Ok(Json(body))
}

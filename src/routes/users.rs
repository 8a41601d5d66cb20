use axum::extract::{Path, State};
use axum::Json;

use crate::error::GatewayError;
use crate::state::AppState;

/// Accepts either a username or a UUID-shaped user id and resolves it to
/// the canonical user record.
pub async fn lookup_user(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let commands = state.commands().await?;
    let user = commands.lookup_user(&identifier).await?;
    Ok(Json(serde_json::json!({ "data": { "user": user } })))
}

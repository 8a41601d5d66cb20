use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use crate::error::GatewayError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub name: String,
    #[serde(default)]
    pub member_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
}

pub async fn list_rooms(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let commands = state.commands().await?;
    let rooms = commands.list_rooms().await?;
    Ok(Json(serde_json::json!({ "data": { "rooms": rooms } })))
}

pub async fn create_room(
    State(state): State<AppState>,
    Json(input): Json<CreateRoomRequest>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let commands = state.commands().await?;
    let room_id = commands.create_room(&input.name, &input.member_ids).await?;
    Ok(Json(serde_json::json!({ "data": { "room_id": room_id } })))
}

pub async fn list_messages(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let commands = state.commands().await?;
    let messages = commands.list_messages(&room_id).await?;
    Ok(Json(serde_json::json!({ "data": { "messages": messages } })))
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(input): Json<SendMessageRequest>,
) -> Result<Json<serde_json::Value>, GatewayError> {
    let commands = state.commands().await?;
    commands.send_message(&room_id, &input.text).await?;
    Ok(Json(serde_json::json!({ "data": { "ok": true } })))
}

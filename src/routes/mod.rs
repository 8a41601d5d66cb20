mod auth;
mod events;
mod health;
mod rooms;
mod users;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        // Auth (register/login talk to the remote registry)
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/session", get(auth::session))
        // Rooms and messages
        .route("/rooms", get(rooms::list_rooms).post(rooms::create_room))
        .route(
            "/rooms/{room_id}/messages",
            get(rooms::list_messages).post(rooms::send_message),
        )
        // Event streams (SSE re-publication of upstream subscriptions)
        .route("/rooms/{room_id}/events", get(events::room_events))
        .route("/users/@me/events", get(events::user_events))
        // Users
        .route("/users/{identifier}", get(users::lookup_user))
        // Version
        .route("/version", get(health::version))
}

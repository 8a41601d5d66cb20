use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::{self, Stream};

use crate::error::GatewayError;
use crate::state::AppState;
use crate::subscriptions::{Consumer, SubscriptionEvent, Target};

pub async fn room_events(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, GatewayError> {
    let consumer = state.bridge.subscribe(Target::Room(room_id)).await?;
    Ok(sse_response(consumer))
}

pub async fn user_events(
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, GatewayError> {
    let consumer = state.bridge.subscribe(Target::User).await?;
    Ok(sse_response(consumer))
}

/// The stream owns the consumer, so the consumer detaches exactly when the
/// HTTP response body is dropped.
fn sse_response(consumer: Consumer) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = stream::unfold(consumer, |mut consumer| async move {
        let event = consumer.recv().await?;
        Some((Ok(to_sse_event(&event)), consumer))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn to_sse_event(event: &SubscriptionEvent) -> Event {
    let name = match event {
        SubscriptionEvent::Message(_) => "message",
        SubscriptionEvent::AddedToRoom { .. } => "added_to_room",
        SubscriptionEvent::Error { .. } => "error",
    };
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    Event::default().event(name).data(data)
}

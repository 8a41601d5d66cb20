use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tonic::transport::Channel;

use crate::channel::ChannelManager;
use crate::commands::{request_with_identity, MessageRecord};
use crate::error::GatewayError;
use crate::proto;
use crate::proto::chat_client::ChatClient;
use crate::session::{Identity, SessionStore};

/// What a subscription observes: one room's event stream, or the
/// notifications addressed to the logged-in user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    Room(String),
    User,
}

/// Lifecycle of one target's upstream stream. A closed subscription is never
/// resurrected; re-subscribing creates a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Opening,
    Streaming,
    Closed,
}

/// One event republished to every consumer attached to a target.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SubscriptionEvent {
    Message(MessageRecord),
    AddedToRoom { room_id: String },
    /// Terminal: the upstream stream ended or failed. Consumers must
    /// re-subscribe to trigger a fresh attempt.
    Error { message: String },
}

struct Subscription {
    events_tx: broadcast::Sender<SubscriptionEvent>,
    phase_tx: watch::Sender<Phase>,
    consumers: usize,
    reader: JoinHandle<()>,
    epoch: u64,
}

/// Fans remote event streams out to HTTP consumers. Each target gets one
/// read loop shared by all of its consumers; the loop outlives any single
/// HTTP request and never blocks other targets or the session store.
pub struct SubscriptionBridge {
    session: SessionStore,
    channels: Arc<ChannelManager>,
    subscriptions: Arc<DashMap<Target, Subscription>>,
    buffer: usize,
    next_epoch: AtomicU64,
}

impl SubscriptionBridge {
    pub fn new(session: SessionStore, channels: Arc<ChannelManager>, buffer: usize) -> Self {
        Self {
            session,
            channels,
            subscriptions: Arc::new(DashMap::new()),
            buffer,
            next_epoch: AtomicU64::new(0),
        }
    }

    /// Attaches a consumer to `target`, starting the upstream stream if this
    /// is the first interest in it. Dropping the returned handle detaches.
    pub async fn subscribe(&self, target: Target) -> Result<Consumer, GatewayError> {
        let identity = self
            .session
            .get()
            .await
            .ok_or_else(|| GatewayError::Auth("not logged in".to_string()))?;
        let channel = self.channels.get().await?;

        let (events, phase, epoch) = match self.subscriptions.entry(target.clone()) {
            Entry::Occupied(mut entry) => {
                let subscription = entry.get_mut();
                subscription.consumers += 1;
                (
                    subscription.events_tx.subscribe(),
                    subscription.phase_tx.subscribe(),
                    subscription.epoch,
                )
            }
            Entry::Vacant(slot) => {
                let (events_tx, events_rx) = broadcast::channel(self.buffer);
                let (phase_tx, phase_rx) = watch::channel(Phase::Opening);
                let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);

                tracing::info!(?target, "opening upstream subscription");
                let reader = tokio::spawn(read_loop(
                    channel,
                    identity,
                    target.clone(),
                    events_tx.clone(),
                    phase_tx.clone(),
                    Arc::clone(&self.subscriptions),
                    epoch,
                ));

                slot.insert(Subscription {
                    events_tx,
                    phase_tx,
                    consumers: 1,
                    reader,
                    epoch,
                });
                (events_rx, phase_rx, epoch)
            }
        };

        Ok(Consumer {
            target,
            events,
            phase,
            subscriptions: Arc::clone(&self.subscriptions),
            epoch,
            lagged: false,
        })
    }

    /// Number of live subscriptions, across all targets.
    pub fn active_count(&self) -> usize {
        self.subscriptions.len()
    }
}

/// One consumer's attachment to a subscription. Events arrive in upstream
/// arrival order. Dropping the handle detaches; the underlying stream is
/// torn down when the last consumer for its target detaches.
pub struct Consumer {
    target: Target,
    events: broadcast::Receiver<SubscriptionEvent>,
    phase: watch::Receiver<Phase>,
    subscriptions: Arc<DashMap<Target, Subscription>>,
    epoch: u64,
    lagged: bool,
}

impl Consumer {
    /// The next event, or `None` once the subscription is gone and every
    /// buffered event (including the terminal error) has been delivered.
    /// A consumer that falls behind the event buffer never skips ahead
    /// silently; it gets a terminal error of its own and must re-subscribe.
    pub async fn recv(&mut self) -> Option<SubscriptionEvent> {
        if self.lagged {
            return None;
        }
        match self.events.recv().await {
            Ok(event) => Some(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(target = ?self.target, skipped, "event consumer fell behind, ending its stream");
                self.lagged = true;
                Some(SubscriptionEvent::Error {
                    message: format!("fell behind the event stream, {skipped} events missed"),
                })
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Resolves once the upstream stream is live, or once it has already
    /// closed without ever becoming live.
    pub async fn wait_until_streaming(&mut self) {
        let _ = self.phase.wait_for(|phase| *phase != Phase::Opening).await;
    }

    pub fn target(&self) -> &Target {
        &self.target
    }
}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("target", &self.target)
            .field("epoch", &self.epoch)
            .field("phase", &*self.phase.borrow())
            .finish_non_exhaustive()
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        let last = match self.subscriptions.get_mut(&self.target) {
            Some(mut entry) if entry.epoch == self.epoch => {
                entry.consumers -= 1;
                entry.consumers == 0
            }
            // The read loop already tore this subscription down, or a fresh
            // one replaced it.
            _ => false,
        };

        if last {
            // Re-checked under the map lock: a consumer that attached in the
            // meantime keeps the stream alive.
            let removed = self
                .subscriptions
                .remove_if(&self.target, |_, sub| {
                    sub.epoch == self.epoch && sub.consumers == 0
                });
            if let Some((_, subscription)) = removed {
                subscription.reader.abort();
                tracing::info!(target = ?self.target, "last consumer detached, closed upstream subscription");
            }
        }
    }
}

async fn read_loop(
    channel: Channel,
    identity: Identity,
    target: Target,
    events_tx: broadcast::Sender<SubscriptionEvent>,
    phase_tx: watch::Sender<Phase>,
    subscriptions: Arc<DashMap<Target, Subscription>>,
    epoch: u64,
) {
    let result = run_stream(channel, &identity, &target, &events_tx, &phase_tx).await;

    // Remove the entry before publishing the terminal event, so a subscriber
    // arriving now starts a fresh subscription instead of attaching to this
    // one and missing the error. Existing receivers stay connected until the
    // local sender handles drop at the end of this function.
    subscriptions.remove_if(&target, |_, sub| sub.epoch == epoch);

    phase_tx.send_replace(Phase::Closed);
    let message = match result {
        Ok(()) => "stream closed by the chat service".to_string(),
        Err(error) => error.to_string(),
    };
    tracing::warn!(?target, %message, "subscription ended");
    let _ = events_tx.send(SubscriptionEvent::Error { message });
}

async fn run_stream(
    channel: Channel,
    identity: &Identity,
    target: &Target,
    events_tx: &broadcast::Sender<SubscriptionEvent>,
    phase_tx: &watch::Sender<Phase>,
) -> Result<(), GatewayError> {
    let mut client = ChatClient::new(channel);

    match target {
        Target::Room(room_id) => {
            let request = request_with_identity(
                identity,
                proto::Uuid {
                    uuid: room_id.clone(),
                },
            )?;
            let mut stream = client.subscribe_to_room(request).await?.into_inner();
            phase_tx.send_replace(Phase::Streaming);

            while let Some(event) = stream.message().await? {
                if let Some(mapped) = map_room_event(event) {
                    let _ = events_tx.send(mapped);
                }
            }
        }
        Target::User => {
            let request = request_with_identity(identity, ())?;
            let mut stream = client.subscribe_to_user(request).await?.into_inner();
            phase_tx.send_replace(Phase::Streaming);

            while let Some(event) = stream.message().await? {
                if let Some(mapped) = map_user_event(event) {
                    let _ = events_tx.send(mapped);
                }
            }
        }
    }

    Ok(())
}

fn map_room_event(event: proto::ServersideRoomEvent) -> Option<SubscriptionEvent> {
    use proto::serverside_room_event::Event;
    match event.event? {
        Event::NewMessage(msg) => Some(SubscriptionEvent::Message(MessageRecord::from(msg))),
    }
}

fn map_user_event(event: proto::ServersideUserEvent) -> Option<SubscriptionEvent> {
    use proto::serverside_user_event::Event;
    match event.event? {
        Event::AddedToRoom(room) => Some(SubscriptionEvent::AddedToRoom { room_id: room.uuid }),
    }
}

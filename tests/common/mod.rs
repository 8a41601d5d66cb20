#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use palaver::channel::ChannelManager;
use palaver::config::UpstreamConfig;
use palaver::proto;
use palaver::proto::chat_server::{Chat, ChatServer};
use palaver::proto::registry_server::{Registry, RegistryServer};
use palaver::session::SessionStore;
use palaver::state::AppState;
use palaver::subscriptions::SubscriptionBridge;
use tokio::sync::{broadcast, Mutex};
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tonic::{Request, Response, Status};

/// In-process stand-in for the remote chat service. Logins succeed for any
/// username with password "secret" and mint the identity pair
/// (`u-<name>`, `tok-<name>`); authenticated calls verify that exact pair
/// from the request metadata.
pub struct MockChatService {
    pub registered: Mutex<Vec<proto::UserCredentials>>,
    pub created_rooms: Mutex<Vec<proto::ClientsideRoom>>,
    pub sent_messages: Mutex<Vec<proto::ClientsideMessage>>,
    room_events_tx: broadcast::Sender<Result<proto::ServersideRoomEvent, Status>>,
    user_events_tx: broadcast::Sender<Result<proto::ServersideUserEvent, Status>>,
}

impl MockChatService {
    pub fn new() -> Self {
        let (room_events_tx, _) = broadcast::channel(64);
        let (user_events_tx, _) = broadcast::channel(64);
        Self {
            registered: Mutex::new(Vec::new()),
            created_rooms: Mutex::new(Vec::new()),
            sent_messages: Mutex::new(Vec::new()),
            room_events_tx,
            user_events_tx,
        }
    }

    /// Publishes a new-message event to every open room stream.
    pub fn emit_room_message(&self, room_id: &str, message_id: &str, text: &str) {
        let event = proto::ServersideRoomEvent {
            room_uuid: Some(uuid_of(room_id)),
            event: Some(proto::serverside_room_event::Event::NewMessage(
                proto::ServersideMessage {
                    uuid: Some(uuid_of(message_id)),
                    sender_uuid: Some(uuid_of("u-bob")),
                    room_uuid: Some(uuid_of(room_id)),
                    text: text.to_string(),
                    timestamp: Some(prost_types::Timestamp {
                        seconds: 1_700_000_000,
                        nanos: 0,
                    }),
                },
            )),
        };
        let _ = self.room_events_tx.send(Ok(event));
    }

    /// Publishes an added-to-room notification to every open user stream.
    pub fn emit_added_to_room(&self, user_id: &str, room_id: &str) {
        let event = proto::ServersideUserEvent {
            user_uuid: Some(uuid_of(user_id)),
            event: Some(proto::serverside_user_event::Event::AddedToRoom(uuid_of(
                room_id,
            ))),
        };
        let _ = self.user_events_tx.send(Ok(event));
    }

    /// Fails every open room stream with the given status.
    pub fn fail_room_streams(&self, status: Status) {
        let _ = self.room_events_tx.send(Err(status));
    }
}

fn uuid_of(id: &str) -> proto::Uuid {
    proto::Uuid {
        uuid: id.to_string(),
    }
}

fn check_credentials<T>(request: &Request<T>) -> Result<String, Status> {
    let metadata = request.metadata();
    let user = metadata
        .get("user_uuid")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let token = metadata
        .get("auth_token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if user.is_empty() || token.is_empty() {
        return Err(Status::unauthenticated("missing credentials"));
    }
    let expected = user
        .strip_prefix("u-")
        .map(|name| format!("tok-{name}"))
        .unwrap_or_default();
    if token != expected {
        return Err(Status::unauthenticated("invalid token"));
    }
    Ok(user)
}

#[tonic::async_trait]
impl Registry for MockChatService {
    async fn register_new_user(
        &self,
        request: Request<proto::UserCredentials>,
    ) -> Result<Response<()>, Status> {
        let credentials = request.into_inner();
        if credentials.username == "taken" {
            return Err(Status::already_exists("username already registered"));
        }
        self.registered.lock().await.push(credentials);
        Ok(Response::new(()))
    }

    async fn login_as_user(
        &self,
        request: Request<proto::UserCredentials>,
    ) -> Result<Response<proto::AuthPair>, Status> {
        let credentials = request.into_inner();
        if credentials.password != "secret" {
            return Err(Status::unauthenticated("wrong password"));
        }
        // A degenerate reply shape, for exercising the gateway's checks.
        let token = if credentials.username == "tokenless" {
            String::new()
        } else {
            format!("tok-{}", credentials.username)
        };
        Ok(Response::new(proto::AuthPair {
            user_uuid: Some(uuid_of(&format!("u-{}", credentials.username))),
            token,
        }))
    }
}

#[tonic::async_trait]
impl Chat for MockChatService {
    type SubscribeToRoomStream = ReceiverStream<Result<proto::ServersideRoomEvent, Status>>;
    type SubscribeToUserStream = ReceiverStream<Result<proto::ServersideUserEvent, Status>>;

    async fn send_message(
        &self,
        request: Request<proto::ClientsideMessage>,
    ) -> Result<Response<()>, Status> {
        check_credentials(&request)?;
        let message = request.into_inner();
        let room = message.room_uuid.as_ref().map(|u| u.uuid.as_str());
        if room == Some("missing") {
            return Err(Status::not_found("no such room"));
        }
        self.sent_messages.lock().await.push(message);
        Ok(Response::new(()))
    }

    async fn subscribe_to_room(
        &self,
        request: Request<proto::Uuid>,
    ) -> Result<Response<Self::SubscribeToRoomStream>, Status> {
        check_credentials(&request)?;
        let room = request.into_inner().uuid;
        if room == "missing" {
            return Err(Status::not_found("no such room"));
        }
        if room == "forbidden" {
            return Err(Status::permission_denied("not a member of this room"));
        }

        let (tx, rx) = tokio::sync::mpsc::channel(16);
        let mut events = self.room_events_tx.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                let deliver = match &event {
                    Ok(event) => {
                        event.room_uuid.as_ref().map(|u| u.uuid.as_str()) == Some(room.as_str())
                    }
                    Err(_) => true,
                };
                if deliver {
                    let failed = event.is_err();
                    if tx.send(event).await.is_err() || failed {
                        break;
                    }
                }
            }
        });
        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn subscribe_to_user(
        &self,
        request: Request<()>,
    ) -> Result<Response<Self::SubscribeToUserStream>, Status> {
        let user = check_credentials(&request)?;
        let (tx, rx) = tokio::sync::mpsc::channel(16);
        let mut events = self.user_events_tx.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                let deliver = match &event {
                    Ok(event) => {
                        event.user_uuid.as_ref().map(|u| u.uuid.as_str()) == Some(user.as_str())
                    }
                    Err(_) => true,
                };
                if deliver && tx.send(event).await.is_err() {
                    break;
                }
            }
        });
        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn create_room(
        &self,
        request: Request<proto::ClientsideRoom>,
    ) -> Result<Response<proto::Uuid>, Status> {
        check_credentials(&request)?;
        let room = request.into_inner();
        if room.name.is_empty() {
            return Err(Status::invalid_argument("room name must not be empty"));
        }
        let mut created = self.created_rooms.lock().await;
        created.push(room);
        Ok(Response::new(uuid_of(&format!(
            "room-created-{}",
            created.len()
        ))))
    }

    async fn list_rooms(&self, request: Request<()>) -> Result<Response<proto::RoomList>, Status> {
        let user = check_credentials(&request)?;
        Ok(Response::new(proto::RoomList {
            rooms: vec![proto::ServersideRoom {
                uuid: Some(uuid_of("room-7")),
                name: "general".to_string(),
                members: vec![uuid_of(&user), uuid_of("u-bob")],
            }],
        }))
    }

    async fn list_messages(
        &self,
        request: Request<proto::Uuid>,
    ) -> Result<Response<proto::MessageList>, Status> {
        check_credentials(&request)?;
        let room = request.into_inner().uuid;
        if room == "missing" {
            return Err(Status::not_found("no such room"));
        }
        Ok(Response::new(proto::MessageList {
            messages: vec![proto::ServersideMessage {
                uuid: Some(uuid_of("m-1")),
                sender_uuid: Some(uuid_of("u-bob")),
                room_uuid: Some(uuid_of(&room)),
                text: "hello".to_string(),
                timestamp: Some(prost_types::Timestamp {
                    seconds: 1_700_000_000,
                    nanos: 0,
                }),
            }],
        }))
    }

    async fn lookup_user(
        &self,
        request: Request<proto::UserLookupRequest>,
    ) -> Result<Response<proto::User>, Status> {
        check_credentials(&request)?;
        use proto::user_lookup_request::Identifier;
        let (id, name) = match request.into_inner().identifier {
            Some(Identifier::Username(name)) => (format!("u-{name}"), name),
            Some(Identifier::Uuid(u)) => {
                let name = u.uuid.strip_prefix("u-").unwrap_or(&u.uuid).to_string();
                (u.uuid, name)
            }
            None => return Err(Status::invalid_argument("empty lookup")),
        };
        if name.contains("ghost") {
            return Err(Status::not_found("no such user"));
        }
        Ok(Response::new(proto::User {
            uuid: Some(uuid_of(&id)),
            nickname: name,
        }))
    }
}

pub struct TestHarness {
    pub state: AppState,
    pub service: Arc<MockChatService>,
}

impl TestHarness {
    /// Starts the mock service on a loopback port and builds an app state
    /// whose channel points at it.
    pub async fn start() -> Self {
        let service = Arc::new(MockChatService::new());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock service listener");
        let addr = listener.local_addr().expect("mock service local addr");
        let incoming = TcpListenerStream::new(listener);
        let server = Arc::clone(&service);
        tokio::spawn(async move {
            tonic::transport::Server::builder()
                .add_service(RegistryServer::from_arc(Arc::clone(&server)))
                .add_service(ChatServer::from_arc(server))
                .serve_with_incoming(incoming)
                .await
                .expect("mock service terminated");
        });

        let session = SessionStore::new();
        let channels = Arc::new(ChannelManager::new(UpstreamConfig {
            url: format!("http://{addr}"),
            ca_cert: None,
            domain: None,
            connect_timeout: Duration::from_secs(2),
        }));
        let bridge = Arc::new(SubscriptionBridge::new(
            session.clone(),
            Arc::clone(&channels),
            64,
        ));
        let state = AppState {
            session,
            channels,
            bridge,
            rpc_timeout: Duration::from_secs(2),
        };

        TestHarness { state, service }
    }

    pub fn app(&self) -> Router {
        palaver::routes::router(self.state.clone())
    }

    /// Logs in as `name` through the same path the HTTP handler uses.
    pub async fn login(&self, name: &str) {
        self.state
            .commands()
            .await
            .expect("channel to mock service")
            .login(name, "secret")
            .await
            .expect("login against mock service");
    }
}

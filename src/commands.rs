use std::time::Duration;

use serde::Serialize;
use tonic::metadata::MetadataValue;
use tonic::transport::Channel;
use tonic::Request;

use crate::error::GatewayError;
use crate::proto;
use crate::proto::chat_client::ChatClient;
use crate::proto::registry_client::RegistryClient;
use crate::session::{Identity, SessionStore};

/// A room as reported by the remote service.
#[derive(Debug, Clone, Serialize)]
pub struct RoomSummary {
    pub id: String,
    pub name: String,
    pub member_ids: Vec<String>,
}

impl From<proto::ServersideRoom> for RoomSummary {
    fn from(room: proto::ServersideRoom) -> Self {
        Self {
            id: room.uuid.map(|u| u.uuid).unwrap_or_default(),
            name: room.name,
            member_ids: room.members.into_iter().map(|u| u.uuid).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageRecord {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<String>,
}

impl From<proto::ServersideMessage> for MessageRecord {
    fn from(msg: proto::ServersideMessage) -> Self {
        Self {
            id: msg.uuid.map(|u| u.uuid).unwrap_or_default(),
            room_id: msg.room_uuid.map(|u| u.uuid).unwrap_or_default(),
            sender_id: msg.sender_uuid.map(|u| u.uuid).unwrap_or_default(),
            text: msg.text,
            sent_at: msg.timestamp.and_then(format_timestamp),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
}

impl From<proto::User> for UserRecord {
    fn from(user: proto::User) -> Self {
        Self {
            id: user.uuid.map(|u| u.uuid).unwrap_or_default(),
            username: user.nickname,
        }
    }
}

fn format_timestamp(ts: prost_types::Timestamp) -> Option<String> {
    chrono::DateTime::from_timestamp(ts.seconds, ts.nanos.max(0) as u32)
        .map(|dt| dt.to_rfc3339())
}

/// Builds a request carrying `identity` as out-of-band call metadata, the
/// way the remote contract expects credentials on every authenticated call.
pub fn request_with_identity<T>(
    identity: &Identity,
    msg: T,
) -> Result<Request<T>, GatewayError> {
    let user = MetadataValue::try_from(identity.user_id.as_str())
        .map_err(|_| GatewayError::Validation("user id is not valid call metadata".to_string()))?;
    let token = MetadataValue::try_from(identity.auth_token.as_str()).map_err(|_| {
        GatewayError::Validation("auth token is not valid call metadata".to_string())
    })?;

    let mut request = Request::new(msg);
    request.metadata_mut().insert("user_uuid", user);
    request.metadata_mut().insert("auth_token", token);
    Ok(request)
}

/// One-shot request/response operations against the remote chat service,
/// invoked by the HTTP boundary. Stateless apart from the shared channel
/// and session store handles.
#[derive(Clone)]
pub struct Commands {
    channel: Channel,
    session: SessionStore,
    rpc_timeout: Duration,
}

impl Commands {
    pub fn new(channel: Channel, session: SessionStore, rpc_timeout: Duration) -> Self {
        Self {
            channel,
            session,
            rpc_timeout,
        }
    }

    async fn require_identity(&self) -> Result<Identity, GatewayError> {
        self.session
            .get()
            .await
            .ok_or_else(|| GatewayError::Auth("not logged in".to_string()))
    }

    async fn authed_request<T>(&self, msg: T) -> Result<Request<T>, GatewayError> {
        let identity = self.require_identity().await?;
        let mut request = request_with_identity(&identity, msg)?;
        request.set_timeout(self.rpc_timeout);
        Ok(request)
    }

    fn plain_request<T>(&self, msg: T) -> Request<T> {
        let mut request = Request::new(msg);
        request.set_timeout(self.rpc_timeout);
        request
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<(), GatewayError> {
        let credentials = credentials(username, password)?;
        let mut client = RegistryClient::new(self.channel.clone());
        client
            .register_new_user(self.plain_request(credentials))
            .await?;
        tracing::info!(username, "registered new user");
        Ok(())
    }

    /// Logs in and stores the returned identity. This is the sole writer of
    /// the session store.
    pub async fn login(&self, username: &str, password: &str) -> Result<Identity, GatewayError> {
        let credentials = credentials(username, password)?;
        let mut client = RegistryClient::new(self.channel.clone());
        let pair = client
            .login_as_user(self.plain_request(credentials))
            .await?
            .into_inner();

        let user_id = pair
            .user_uuid
            .map(|u| u.uuid)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                GatewayError::Rpc(tonic::Status::internal("login reply carried no user id"))
            })?;
        if pair.token.is_empty() {
            return Err(GatewayError::Rpc(tonic::Status::internal(
                "login reply carried no token",
            )));
        }

        let identity = Identity {
            user_id,
            auth_token: pair.token,
        };
        self.session.set(identity.clone()).await;
        tracing::info!(user_id = %identity.user_id, "session identity updated");
        Ok(identity)
    }

    pub async fn send_message(&self, room_id: &str, text: &str) -> Result<(), GatewayError> {
        if text.trim().is_empty() {
            return Err(GatewayError::Validation(
                "message text must not be empty".to_string(),
            ));
        }
        let message = proto::ClientsideMessage {
            room_uuid: Some(proto::Uuid {
                uuid: room_id.to_string(),
            }),
            text: text.to_string(),
        };
        let request = self.authed_request(message).await?;
        let mut client = ChatClient::new(self.channel.clone());
        client.send_message(request).await?;
        tracing::debug!(room_id, "message relayed");
        Ok(())
    }

    /// Creates a room. The caller is always a member of the rooms they
    /// create, whether or not they listed themselves.
    pub async fn create_room(
        &self,
        name: &str,
        member_ids: &[String],
    ) -> Result<String, GatewayError> {
        if name.trim().is_empty() {
            return Err(GatewayError::Validation(
                "room name must not be empty".to_string(),
            ));
        }
        let identity = self.require_identity().await?;
        let members = members_with_self(member_ids, &identity.user_id);
        let room = proto::ClientsideRoom {
            name: name.to_string(),
            members: members
                .into_iter()
                .map(|uuid| proto::Uuid { uuid })
                .collect(),
        };
        let mut request = request_with_identity(&identity, room)?;
        request.set_timeout(self.rpc_timeout);

        let mut client = ChatClient::new(self.channel.clone());
        let created = client.create_room(request).await?.into_inner();
        tracing::info!(room_id = %created.uuid, "room created");
        Ok(created.uuid)
    }

    pub async fn list_rooms(&self) -> Result<Vec<RoomSummary>, GatewayError> {
        let request = self.authed_request(()).await?;
        let mut client = ChatClient::new(self.channel.clone());
        let rooms = client.list_rooms(request).await?.into_inner();
        Ok(rooms.rooms.into_iter().map(RoomSummary::from).collect())
    }

    pub async fn list_messages(&self, room_id: &str) -> Result<Vec<MessageRecord>, GatewayError> {
        let request = self
            .authed_request(proto::Uuid {
                uuid: room_id.to_string(),
            })
            .await?;
        let mut client = ChatClient::new(self.channel.clone());
        let messages = client.list_messages(request).await?.into_inner();
        Ok(messages
            .messages
            .into_iter()
            .map(MessageRecord::from)
            .collect())
    }

    /// Resolves a username or UUID-shaped identifier to a canonical user.
    pub async fn lookup_user(&self, identifier: &str) -> Result<UserRecord, GatewayError> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(GatewayError::Validation(
                "user identifier must not be empty".to_string(),
            ));
        }
        let lookup = proto::UserLookupRequest {
            identifier: Some(lookup_identifier(identifier)),
        };
        let request = self.authed_request(lookup).await?;
        let mut client = ChatClient::new(self.channel.clone());
        let user = client.lookup_user(request).await?.into_inner();
        Ok(UserRecord::from(user))
    }
}

fn credentials(username: &str, password: &str) -> Result<proto::UserCredentials, GatewayError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(GatewayError::Validation(
            "username must not be empty".to_string(),
        ));
    }
    if password.is_empty() {
        return Err(GatewayError::Validation(
            "password must not be empty".to_string(),
        ));
    }
    Ok(proto::UserCredentials {
        username: username.to_string(),
        password: password.to_string(),
    })
}

fn members_with_self(member_ids: &[String], own_id: &str) -> Vec<String> {
    let mut members: Vec<String> = Vec::with_capacity(member_ids.len() + 1);
    for id in member_ids {
        if !id.is_empty() && !members.iter().any(|m| m == id) {
            members.push(id.clone());
        }
    }
    if !members.iter().any(|m| m == own_id) {
        members.push(own_id.to_string());
    }
    members
}

fn lookup_identifier(raw: &str) -> proto::user_lookup_request::Identifier {
    use proto::user_lookup_request::Identifier;
    match uuid::Uuid::parse_str(raw) {
        Ok(_) => Identifier::Uuid(proto::Uuid {
            uuid: raw.to_string(),
        }),
        Err(_) => Identifier::Username(raw.to_string()),
    }
}

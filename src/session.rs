use std::sync::Arc;
use tokio::sync::RwLock;

/// The identity attached to every authenticated upstream call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub auth_token: String,
}

/// The one login session shared by the whole process. Readers always observe
/// a consistent (user id, token) pair; the lock is never held across an RPC.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<Option<Identity>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the identity wholesale. Only a successful login calls this.
    pub async fn set(&self, identity: Identity) {
        *self.inner.write().await = Some(identity);
    }

    pub async fn get(&self) -> Option<Identity> {
        self.inner.read().await.clone()
    }

    /// Extension point for logout/token expiry. No HTTP route drives it yet.
    pub async fn clear(&self) {
        *self.inner.write().await = None;
    }
}

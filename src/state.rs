use std::sync::Arc;
use std::time::Duration;

use crate::channel::ChannelManager;
use crate::commands::Commands;
use crate::error::GatewayError;
use crate::session::SessionStore;
use crate::subscriptions::SubscriptionBridge;

#[derive(Clone)]
pub struct AppState {
    pub session: SessionStore,
    pub channels: Arc<ChannelManager>,
    pub bridge: Arc<SubscriptionBridge>,
    pub rpc_timeout: Duration,
}

impl AppState {
    /// Command invoker bound to the shared channel and session. Establishes
    /// the channel on first use.
    pub async fn commands(&self) -> Result<Commands, GatewayError> {
        let channel = self.channels.get().await?;
        Ok(Commands::new(
            channel,
            self.session.clone(),
            self.rpc_timeout,
        ))
    }
}

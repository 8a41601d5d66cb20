use tokio::sync::OnceCell;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint};

use crate::config::UpstreamConfig;
use crate::error::GatewayError;

/// Owns the single connection to the remote chat service. The channel is
/// established on first use and then cloned into every call site; tonic
/// channels multiplex internally, so one per process is enough.
pub struct ChannelManager {
    config: UpstreamConfig,
    established: OnceCell<Channel>,
}

impl ChannelManager {
    pub fn new(config: UpstreamConfig) -> Self {
        Self {
            config,
            established: OnceCell::new(),
        }
    }

    pub async fn get(&self) -> Result<Channel, GatewayError> {
        self.established
            .get_or_try_init(|| self.connect())
            .await
            .cloned()
    }

    async fn connect(&self) -> Result<Channel, GatewayError> {
        let mut endpoint = Endpoint::from_shared(self.config.url.clone())
            .map_err(|e| GatewayError::Connection(format!("invalid upstream url: {e}")))?
            .connect_timeout(self.config.connect_timeout);

        if let Some(ref ca_path) = self.config.ca_cert {
            let pem = tokio::fs::read(ca_path).await.map_err(|e| {
                GatewayError::Connection(format!(
                    "failed to read CA certificate {}: {e}",
                    ca_path.display()
                ))
            })?;
            let mut tls = ClientTlsConfig::new().ca_certificate(Certificate::from_pem(pem));
            if let Some(ref domain) = self.config.domain {
                tls = tls.domain_name(domain.clone());
            }
            endpoint = endpoint.tls_config(tls)?;
        }

        let channel = endpoint.connect().await?;
        tracing::info!("connected to chat service at {}", self.config.url);
        Ok(channel)
    }
}

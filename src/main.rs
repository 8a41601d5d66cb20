use std::sync::Arc;
use tokio::net::TcpListener;

use palaver::channel::ChannelManager;
use palaver::config::Config;
use palaver::session::SessionStore;
use palaver::state::AppState;
use palaver::subscriptions::SubscriptionBridge;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "palaver=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env();
    print_banner(&config);

    let session = SessionStore::new();
    let channels = Arc::new(ChannelManager::new(config.upstream.clone()));

    // Fail fast: every operation is meaningless without the upstream channel.
    if let Err(e) = channels.get().await {
        tracing::error!("could not reach the chat service: {e}");
        std::process::exit(1);
    }

    let bridge = Arc::new(SubscriptionBridge::new(
        session.clone(),
        Arc::clone(&channels),
        config.event_buffer,
    ));

    let state = AppState {
        session,
        channels,
        bridge,
        rpc_timeout: config.rpc_timeout,
    };

    let app = palaver::routes::router(state);

    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .expect("failed to bind");

    let actual_port = listener
        .local_addr()
        .expect("failed to get local address")
        .port();
    eprintln!("  \x1b[32m→ listening on 0.0.0.0:{actual_port}\x1b[0m");
    eprintln!();

    axum::serve(listener, app).await.expect("server error");
}

fn print_banner(config: &Config) {
    let version = env!("CARGO_PKG_VERSION");

    eprintln!();
    eprintln!("  \x1b[1;36mpalaver\x1b[0m \x1b[2mv{version}\x1b[0m");
    eprintln!();
    eprintln!("  \x1b[2mport\x1b[0m         {}", config.port);
    eprintln!("  \x1b[2mupstream\x1b[0m     {}", config.upstream.url);
    if let Some(ref ca) = config.upstream.ca_cert {
        eprintln!("  \x1b[2mtls ca\x1b[0m       {}", ca.display());
    }
    eprintln!();
}

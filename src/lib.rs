pub mod channel;
pub mod commands;
pub mod config;
pub mod error;
pub mod routes;
pub mod session;
pub mod state;
pub mod subscriptions;

/// Generated bindings for the remote chat service contract.
pub mod proto {
    tonic::include_proto!("wirechat");
}

//! Sentinel service: configuration, startup and the webhook ingress.

pub mod config;
pub mod server;
pub mod startup;

pub mod api;
pub mod broadcast;
pub mod command_queue;
pub mod config;
pub mod error;
pub mod metrics;
pub mod model;
pub mod relay;
pub mod settings_store;
pub mod subscriber;
pub mod ws_server;

pub mod commands;
pub mod config;
pub mod debounce;
pub mod dispatch;
pub mod error;
pub mod gemini;
pub mod handler;
pub mod health;
pub mod metrics;
pub mod metrics_server;
pub mod reply;
pub mod schema;
pub mod sections;
pub mod sync_state;

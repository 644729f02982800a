//! # courier-server
//!
//! Ties the job queues to the law firm's integrations:
//!
//! - six named queues with per-queue retry policies ([`queues`])
//! - the call webhook dispatcher ([`webhook`])
//! - one processor per queue ([`processors`])
//! - queue health snapshots and event logging ([`monitoring`], [`health`])
//! - a small HTTP surface over all of the above ([`server`])
//!
//! The `courier` binary wraps these for operators.

pub mod analysis;
pub mod config;
pub mod context;
pub mod error;
pub mod health;
pub mod mail;
pub mod monitoring;
pub mod processors;
pub mod queues;
pub mod server;
pub mod telemetry;
pub mod webhook;
pub mod workers;

pub use config::{load_dotenv, AppConfig, ConfigError, Environment, QueueBackendKind};
pub use context::AppContext;
pub use error::{Result, ServerError};
pub use health::{HealthCheck, HealthCheckBuilder, HealthCheckResult, HealthStatus};
pub use monitoring::{
    setup_queue_monitoring, HealthSnapshot, ObservedEvents, QueueHealth, QueueMonitor,
};
pub use processors::register_processors;
pub use queues::{QueueName, Queues};
pub use server::Server;
pub use telemetry::init_tracing;
pub use webhook::{handle_webhook_async, WebhookAck, WebhookEvent};
pub use workers::{start_background, Workers};

//! Observability and resilience core
//!
//! This crate provides the core functionality for:
//! - Metric ingestion from collectors or direct pushes
//! - Rule-based alerting with prioritization, correlation and fatigue suppression
//! - Node failure prediction and anomaly detection
//! - Safety-gated chaos experiments and resilience scoring
//! - Health checks and observability

pub mod alerting;
pub mod anomaly;
pub mod chaos;
pub mod collector;
pub mod config;
pub mod engine;
pub mod error;
pub mod feed;
pub mod health;
pub mod integration;
pub mod models;
pub mod observability;
pub mod predictor;
pub mod scheduler;
pub mod store;

pub use config::{EngineConfig, SchedulerConfig};
pub use engine::{DashboardSnapshot, MonitoringEngine};
pub use error::{AlertError, ChaosError, ConfigError, PredictorError, ValidationError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::{Impact, Metric, Severity};
pub use observability::{EngineMetrics, StructuredLogger};

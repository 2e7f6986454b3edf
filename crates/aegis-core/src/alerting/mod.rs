//! Alerting pipeline
//!
//! This module provides:
//! - Threshold rules and their evaluation against the metrics feed
//! - Priority scoring for each alert
//! - Correlation of related alerts into groups
//! - Fatigue suppression of noisy sources
//! - The alert lifecycle, including escalation of critical alerts

mod alert;
mod correlation;
mod evaluator;
mod fatigue;
mod manager;
mod prioritizer;
mod rule;

pub use alert::{recommended_actions, Alert, AlertStatus};
pub use correlation::{
    AlertGroup, CorrelationEngine, CorrelationRule, GroupBy, GroupStatus,
    DEFAULT_CORRELATION_WINDOW,
};
pub use evaluator::RuleEvaluator;
pub use fatigue::{FatigueConfig, FatigueCounter, FatigueReducer};
pub use manager::{AlertConfig, AlertManager, DEFAULT_AUTO_RESOLVE_TIMEOUT, DEFAULT_ESCALATION_DELAY};
pub use prioritizer::{severity_feature, Prioritizer, PriorityModelConfig, FEATURE_NAMES, PRIORITY_FEATURES};
pub use rule::{default_rules, AlertRule, Condition, PREDICTIVE_RULE_ID};

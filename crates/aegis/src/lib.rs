//! Aegis service: configuration loading and the HTTP surface over the engine

pub mod api;
pub mod config;

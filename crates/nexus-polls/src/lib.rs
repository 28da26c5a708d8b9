pub mod auth;
pub mod config;
pub mod error;
pub mod polls;
pub mod telemetry;
pub mod validation;

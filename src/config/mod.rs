//! Configuration module for the chirp recorder.
//!
//! Provides CLI argument parsing and configuration management.

#[allow(clippy::module_inception)]
mod config;

pub use config::AppConfig;

//! # Configuration Module
//!
//! This module provides the enhancer configuration shared by the library, the
//! CLI and JSON config files.

pub mod config;

pub use config::EnhancerConfig;

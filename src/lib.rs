//! dob library
//!
//! This module exports the core components for testing and integration.

pub mod addons;
pub mod aggregate;
pub mod cli;
pub mod config;
pub mod error;
pub mod migrate;
pub mod modules;
pub mod runtime;
pub mod scripts;
pub mod upgrade;
pub mod version;

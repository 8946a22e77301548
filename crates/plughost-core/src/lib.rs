//! # plughost-core
//!
//! Core crate for the plugin host. Contains configuration schemas and the
//! unified error system.
//!
//! This crate has **no** internal dependencies on other plughost crates.

pub mod config;
pub mod error;
pub mod result;

pub use error::HostError;
pub use result::HostResult;

/*!
 * LoRaBridge Core
 *
 * This crate provides the shared plumbing for the LoRaBridge gateway:
 * configuration loading, error types, logging setup and task utilities.
 */

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;
pub mod utils;

/// LoRaBridge version, reported to the platform as the gateway version attribute
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

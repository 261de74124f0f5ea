//! # arcnet-common
//!
//! Shared utilities and types for the arcnet crates.
//!
//! This crate provides:
//! - The common error type and result alias
//! - Validated Linux network interface names

#![warn(missing_docs)]

pub mod error;
pub mod ifname;

pub use error::{ArcNetError, ArcNetResult};
pub use ifname::IfName;

//! Common error types for arcnet.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`ArcNetError`].
pub type ArcNetResult<T> = Result<T, ArcNetError>;

/// Common errors across the arcnet crates.
#[derive(Error, Diagnostic, Debug)]
pub enum ArcNetError {
    /// Invalid network interface name.
    #[error("Invalid interface name '{name}': {reason}")]
    #[diagnostic(
        code(arcnet::ifname::invalid),
        help("Interface names must be 1-15 bytes with no '/', ':' or whitespace")
    )]
    InvalidInterfaceName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An external command exited with a non-zero status.
    #[error("Command failed with status {status}: {command}")]
    #[diagnostic(code(arcnet::command_failed))]
    CommandFailed {
        /// The rendered command line.
        command: String,
        /// The exit status reported by the runner.
        status: i32,
    },

    /// Unknown device requested from the settings.
    #[error("Device not configured: {name}")]
    #[diagnostic(
        code(arcnet::device::not_found),
        help("Add a [[devices]] entry with this name to the settings file")
    )]
    DeviceNotFound {
        /// The device name that was not found.
        name: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(arcnet::io))]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(arcnet::config))]
    Config {
        /// The error message.
        message: String,
    },
}

impl ArcNetError {
    /// Shorthand for a [`ArcNetError::Config`] error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

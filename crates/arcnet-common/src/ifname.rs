//! Network interface name validation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ArcNetError, ArcNetResult};

/// A validated Linux network interface name.
///
/// Interface names must:
/// - Be 1-15 bytes long (`IFNAMSIZ` minus the trailing NUL)
/// - Not be `.` or `..`
/// - Not contain `/`, `:` or whitespace
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IfName(String);

impl IfName {
    /// Maximum length of an interface name.
    pub const MAX_LENGTH: usize = 15;

    /// Create a new interface name, validating the format.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is not a usable interface name.
    pub fn new(name: impl Into<String>) -> ArcNetResult<Self> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    /// Derive a new name by prepending `prefix`, e.g. `veth_` + `arc0`.
    ///
    /// # Errors
    ///
    /// Returns an error if the combined name is too long.
    pub fn with_prefix(&self, prefix: &str) -> ArcNetResult<Self> {
        Self::new(format!("{prefix}{}", self.0))
    }

    /// Get the interface name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(name: &str) -> ArcNetResult<()> {
        let invalid = |reason: &str| ArcNetError::InvalidInterfaceName {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        if name.is_empty() {
            return Err(invalid("empty"));
        }
        if name.len() > Self::MAX_LENGTH {
            return Err(invalid("longer than 15 bytes"));
        }
        if name == "." || name == ".." {
            return Err(invalid("reserved name"));
        }
        if name
            .chars()
            .any(|c| c == '/' || c == ':' || c.is_whitespace() || c.is_control())
        {
            return Err(invalid("contains a forbidden character"));
        }

        Ok(())
    }
}

impl fmt::Display for IfName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for IfName {
    type Err = ArcNetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for IfName {
    type Error = ArcNetError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<IfName> for String {
    fn from(name: IfName) -> Self {
        name.0
    }
}

impl AsRef<str> for IfName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

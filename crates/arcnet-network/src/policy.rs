//! What to do when a configuration command fails.

use serde::{Deserialize, Serialize};

use arcnet_common::{ArcNetError, ArcNetResult};

use crate::command::Command;

/// Failure handling strategy for issued commands.
///
/// Both policies issue identical command sequences when every command
/// succeeds. They only differ once something fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Log the failure and keep going.
    #[default]
    BestEffort,
    /// Stop at the first failure and report it.
    Strict,
}

impl FailurePolicy {
    /// Judge the exit `status` of `command`.
    ///
    /// Quiet commands never fail a sequence.
    ///
    /// # Errors
    ///
    /// Returns [`ArcNetError::CommandFailed`] under [`FailurePolicy::Strict`]
    /// when a loud command exits non-zero.
    pub fn check(self, command: &Command, status: i32) -> ArcNetResult<()> {
        if status == 0 || !command.log_failures() {
            return Ok(());
        }

        match self {
            Self::BestEffort => {
                tracing::warn!(command = %command, status, "Command failed, continuing");
                Ok(())
            }
            Self::Strict => Err(ArcNetError::CommandFailed {
                command: command.to_string(),
                status,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_passes() {
        let cmd = Command::brctl_addbr("br");
        assert!(FailurePolicy::Strict.check(&cmd, 0).is_ok());
        assert!(FailurePolicy::BestEffort.check(&cmd, 0).is_ok());
    }

    #[test]
    fn test_best_effort_swallows_failure() {
        let cmd = Command::brctl_addbr("br");
        assert!(FailurePolicy::BestEffort.check(&cmd, 1).is_ok());
    }

    #[test]
    fn test_strict_reports_failure() {
        let cmd = Command::brctl_addbr("br");
        let err = FailurePolicy::Strict.check(&cmd, 1).unwrap_err();
        assert!(matches!(err, ArcNetError::CommandFailed { status: 1, .. }));
    }

    #[test]
    fn test_quiet_commands_never_fail() {
        let cmd = Command::ip_link_delete("veth_arc0");
        assert!(FailurePolicy::Strict.check(&cmd, 2).is_ok());
    }

    #[test]
    fn test_default_is_best_effort() {
        assert_eq!(FailurePolicy::default(), FailurePolicy::BestEffort);
    }
}

//! Process execution for network configuration commands.
//!
//! [`ProcessRunner`] is the seam between the configuration logic and the
//! host. [`SystemProcessRunner`] spawns real processes;
//! [`FakeProcessRunner`](crate::FakeProcessRunner) records them for tests.

use std::process::Command;

use serde::{Deserialize, Serialize};

use crate::command::{IFCONFIG_PATH, IP_PATH};

/// Executes external commands on behalf of a bridge configuration.
///
/// All methods return a process exit status, `0` meaning success.
pub trait ProcessRunner: Send + Sync {
    /// Run a single command. `argv[0]` is the program.
    fn run(&self, argv: &[String], log_failures: bool) -> i32;

    /// Rename and address an interface that was moved into a container's
    /// network namespace.
    fn add_interface_to_container(
        &self,
        host_ifname: &str,
        con_ifname: &str,
        con_ipv4: &str,
        con_nmask: &str,
        enable_multicast: bool,
        con_pid: &str,
    ) -> i32;

    /// Tell the container its network is configured.
    fn write_sentinel_to_container(&self, con_pid: &str) -> i32;
}

/// Tool and file locations used by [`SystemProcessRunner`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerPaths {
    /// nsenter binary on the host.
    pub nsenter: String,
    /// touch binary inside the container's mount namespace.
    pub touch: String,
    /// Sentinel file created inside the container.
    pub sentinel: String,
}

impl Default for RunnerPaths {
    fn default() -> Self {
        Self {
            nsenter: "/usr/bin/nsenter".to_string(),
            touch: "/system/bin/touch".to_string(),
            sentinel: "/dev/.arc_network_ready".to_string(),
        }
    }
}

/// Runs commands as child processes of the current process.
#[derive(Debug, Clone, Default)]
pub struct SystemProcessRunner {
    paths: RunnerPaths,
}

impl SystemProcessRunner {
    /// Create a runner with default tool paths.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a runner with custom tool paths.
    #[must_use]
    pub fn with_paths(paths: RunnerPaths) -> Self {
        Self { paths }
    }

    /// The nsenter prefix entering `pid`'s network namespace.
    fn in_netns(&self, pid: &str) -> Vec<String> {
        [self.paths.nsenter.as_str(), "-t", pid, "-n", "--"]
            .map(String::from)
            .to_vec()
    }
}

impl ProcessRunner for SystemProcessRunner {
    fn run(&self, argv: &[String], log_failures: bool) -> i32 {
        let Some((program, args)) = argv.split_first() else {
            tracing::warn!("Refusing to run an empty command");
            return -1;
        };

        tracing::debug!(command = %argv.join(" "), "Running command");

        let output = match Command::new(program).args(args).output() {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(program = %program, error = %e, "Failed to execute command");
                return -1;
            }
        };

        // Killed by a signal has no exit code.
        let status = output.status.code().unwrap_or(-1);
        if status != 0 && log_failures {
            tracing::warn!(
                command = %argv.join(" "),
                status,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "Command failed"
            );
        }

        status
    }

    fn add_interface_to_container(
        &self,
        host_ifname: &str,
        con_ifname: &str,
        con_ipv4: &str,
        con_nmask: &str,
        enable_multicast: bool,
        con_pid: &str,
    ) -> i32 {
        let mut rename = self.in_netns(con_pid);
        rename.extend(
            [IP_PATH, "link", "set", host_ifname, "name", con_ifname].map(String::from),
        );
        let status = self.run(&rename, true);
        if status != 0 {
            return status;
        }

        let mut address = self.in_netns(con_pid);
        address.extend(
            [IFCONFIG_PATH, con_ifname, con_ipv4, "netmask", con_nmask].map(String::from),
        );
        if enable_multicast {
            address.push("multicast".to_string());
        }
        self.run(&address, true)
    }

    fn write_sentinel_to_container(&self, con_pid: &str) -> i32 {
        let argv = [
            self.paths.nsenter.as_str(),
            "-t",
            con_pid,
            "--mount",
            "--pid",
            "--",
            self.paths.touch.as_str(),
            self.paths.sentinel.as_str(),
        ]
        .map(String::from);
        self.run(&argv, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_paths() {
        let paths = RunnerPaths::default();
        assert_eq!(paths.nsenter, "/usr/bin/nsenter");
        assert_eq!(paths.sentinel, "/dev/.arc_network_ready");
    }

    #[test]
    fn test_empty_command_fails() {
        assert_eq!(SystemProcessRunner::new().run(&[], true), -1);
    }

    #[test]
    fn test_missing_program_fails() {
        let argv = ["/nonexistent/arcnet-test-binary".to_string()];
        assert_eq!(SystemProcessRunner::new().run(&argv, false), -1);
    }

    #[test]
    fn test_netns_prefix() {
        let runner = SystemProcessRunner::new();
        assert_eq!(
            runner.in_netns("42"),
            ["/usr/bin/nsenter", "-t", "42", "-n", "--"]
        );
    }
}

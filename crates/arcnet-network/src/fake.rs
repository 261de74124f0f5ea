//! Recording process runner for tests and dry runs.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::runner::ProcessRunner;

/// Arguments of one `add_interface_to_container` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceRecord {
    /// Interface name before the move.
    pub host_ifname: String,
    /// Interface name inside the container.
    pub con_ifname: String,
    /// Container-side address.
    pub con_ipv4: String,
    /// Container-side netmask.
    pub con_nmask: String,
    /// Whether multicast was enabled.
    pub enable_multicast: bool,
    /// Target container pid.
    pub con_pid: String,
}

/// One call made against a [`FakeProcessRunner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeCall {
    /// A `run` call, argv joined with spaces.
    Run(String),
    /// An `add_interface_to_container` call.
    AddInterface(InterfaceRecord),
    /// A `write_sentinel_to_container` call with the pid.
    Sentinel(String),
}

impl fmt::Display for FakeCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Run(line) => write!(f, "{line}"),
            Self::AddInterface(r) => write!(
                f,
                "<container {}> {} -> {} {}/{}{}",
                r.con_pid,
                r.host_ifname,
                r.con_ifname,
                r.con_ipv4,
                r.con_nmask,
                if r.enable_multicast { " multicast" } else { "" }
            ),
            Self::Sentinel(pid) => write!(f, "<container {pid}> network ready"),
        }
    }
}

#[derive(Debug)]
struct FakeState {
    capture: bool,
    calls: Vec<FakeCall>,
    failures: Vec<(String, i32)>,
}

/// A [`ProcessRunner`] that records calls instead of executing them.
///
/// Clones share the same log, so a test can keep one handle while the
/// configuration under test owns another.
#[derive(Debug, Clone)]
pub struct FakeProcessRunner {
    state: Arc<Mutex<FakeState>>,
}

impl Default for FakeProcessRunner {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                capture: true,
                calls: Vec::new(),
                failures: Vec::new(),
            })),
        }
    }
}

impl FakeProcessRunner {
    /// Create a runner that records every call.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start or stop recording. Calls still succeed while not capturing.
    pub fn capture(&self, enabled: bool) {
        self.state.lock().capture = enabled;
    }

    /// Make every `run` whose command line starts with `prefix` return
    /// `status`.
    pub fn fail_on(&self, prefix: &str, status: i32) {
        self.state.lock().failures.push((prefix.to_string(), status));
    }

    /// Drop every failure set with [`fail_on`](Self::fail_on).
    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Forget all recorded calls.
    pub fn clear(&self) {
        self.state.lock().calls.clear();
    }

    /// Every recorded call, in order.
    pub fn calls(&self) -> Vec<FakeCall> {
        self.state.lock().calls.clone()
    }

    /// Recorded `run` command lines, in order.
    pub fn runs(&self) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                FakeCall::Run(line) => Some(line.clone()),
                _ => None,
            })
            .collect()
    }

    /// Recorded `add_interface_to_container` calls.
    pub fn interfaces(&self) -> Vec<InterfaceRecord> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                FakeCall::AddInterface(record) => Some(record.clone()),
                _ => None,
            })
            .collect()
    }

    /// Recorded sentinel pids.
    pub fn sentinels(&self) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                FakeCall::Sentinel(pid) => Some(pid.clone()),
                _ => None,
            })
            .collect()
    }

    /// Return recorded calls and clear the log.
    pub fn take(&self) -> Vec<FakeCall> {
        std::mem::take(&mut self.state.lock().calls)
    }

    fn record(&self, call: FakeCall) {
        let mut state = self.state.lock();
        if state.capture {
            state.calls.push(call);
        }
    }
}

impl ProcessRunner for FakeProcessRunner {
    fn run(&self, argv: &[String], _log_failures: bool) -> i32 {
        let line = argv.join(" ");
        let status = self
            .state
            .lock()
            .failures
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map_or(0, |(_, status)| *status);
        self.record(FakeCall::Run(line));
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
        self.record(FakeCall::AddInterface(InterfaceRecord {
            host_ifname: host_ifname.to_string(),
            con_ifname: con_ifname.to_string(),
            con_ipv4: con_ipv4.to_string(),
            con_nmask: con_nmask.to_string(),
            enable_multicast,
            con_pid: con_pid.to_string(),
        }));
        0
    }

    fn write_sentinel_to_container(&self, con_pid: &str) -> i32 {
        self.record(FakeCall::Sentinel(con_pid.to_string()));
        0
    }
}

//! Bridge, veth and NAT lifecycle for one container device.
//!
//! A [`BridgeNetworkConfig`] sets up the bridge and baseline NAT rules when
//! it is created and removes them, in reverse order, when it is dropped.
//! [`BridgeNetworkConfig::init`] wires a container's network namespace into
//! the bridge, and the inbound methods drive forwarding for the legacy
//! Android device.

use std::sync::Arc;

use arcnet_common::{ArcNetError, ArcNetResult, IfName};

use crate::command::{Command, DEFAULT_NETMASK};
use crate::device::{DeviceConfig, DeviceKind};
use crate::inbound::{InboundAction, InboundMachine, InboundState};
use crate::plan::{self, Plan};
use crate::policy::FailurePolicy;
use crate::runner::ProcessRunner;

/// Bridge and NAT configuration owned for the lifetime of a device.
pub struct BridgeNetworkConfig {
    device_name: String,
    kind: DeviceKind,
    config: DeviceConfig,
    veth_ifname: IfName,
    peer_ifname: IfName,
    runner: Arc<dyn ProcessRunner>,
    policy: FailurePolicy,
    plan: Plan,
    /// Setup steps that have been applied and still need undoing.
    completed: usize,
    pid: u32,
    inbound: InboundMachine,
}

impl BridgeNetworkConfig {
    /// Set up the bridge for `device_name`, logging and skipping over
    /// failed commands.
    ///
    /// # Errors
    ///
    /// Fails only if `config` is invalid; no commands are issued then.
    pub fn new(
        device_name: &str,
        config: DeviceConfig,
        runner: Arc<dyn ProcessRunner>,
    ) -> ArcNetResult<Self> {
        Self::with_policy(device_name, config, runner, FailurePolicy::default())
    }

    /// Set up the bridge for `device_name` under `policy`.
    ///
    /// With [`FailurePolicy::Strict`] the first failed setup command stops
    /// construction and the steps applied so far are undone.
    ///
    /// # Errors
    ///
    /// Fails if `config` is invalid, or under a strict policy if a setup
    /// command fails.
    pub fn with_policy(
        device_name: &str,
        config: DeviceConfig,
        runner: Arc<dyn ProcessRunner>,
        policy: FailurePolicy,
    ) -> ArcNetResult<Self> {
        let kind = DeviceKind::from_device_name(device_name);
        if kind == DeviceKind::Default {
            // The device name doubles as the host interface in NAT rules.
            IfName::new(device_name)?;
        }
        config.validate(kind)?;

        let veth_ifname = config.veth_ifname()?;
        let peer_ifname = config.peer_ifname()?;
        let plan = Plan::build(device_name, kind, &config, veth_ifname.as_str());

        let mut this = Self {
            device_name: device_name.to_string(),
            kind,
            config,
            veth_ifname,
            peer_ifname,
            runner,
            policy,
            plan,
            completed: 0,
            pid: 0,
            inbound: InboundMachine::new(),
        };

        tracing::info!(
            device = %this.device_name,
            kind = %this.kind,
            bridge = %this.config.br_ifname,
            "Setting up bridge"
        );

        if let Err(e) = this.apply_plan() {
            tracing::warn!(device = %this.device_name, error = %e, "Setup failed, unwinding");
            // Drop undoes the completed steps.
            return Err(e);
        }

        Ok(this)
    }

    fn apply_plan(&mut self) -> ArcNetResult<()> {
        for step in self.plan.steps() {
            if let Some(command) = &step.apply {
                self.issue(command)?;
            }
            self.completed += 1;
        }
        Ok(())
    }

    /// Device name this configuration was created for.
    #[must_use]
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Rule set variant.
    #[must_use]
    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    /// Addressing in use.
    #[must_use]
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Container pid passed to the last [`init`](Self::init), `0` if none.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Inbound forwarding state.
    #[must_use]
    pub fn inbound_state(&self) -> &InboundState {
        self.inbound.state()
    }

    /// Whether the container reported ready.
    #[must_use]
    pub fn is_container_ready(&self) -> bool {
        self.inbound.container_ready()
    }

    /// Whether an inbound forwarding rule is installed.
    #[must_use]
    pub fn inbound_active(&self) -> bool {
        self.inbound.is_active()
    }

    /// Attach the container running as `pid` to the bridge.
    ///
    /// A `pid` of `0` means there is no container and issues nothing. Any
    /// previous veth is removed first, so this can be called again when the
    /// container restarts.
    ///
    /// # Errors
    ///
    /// Only under a strict policy, when a command fails.
    pub fn init(&mut self, pid: u32) -> ArcNetResult<()> {
        if pid == 0 {
            tracing::info!(device = %self.device_name, "Clearing container");
            self.pid = 0;
            return Ok(());
        }

        tracing::info!(device = %self.device_name, pid, "Attaching container");

        let br = self.config.br_ifname.as_str();
        let veth = self.veth_ifname.as_str();
        let peer = self.peer_ifname.as_str();
        let commands = [
            Command::ip_link_delete(veth),
            Command::ip_link_add_veth(veth, peer),
            Command::ifconfig_link_up(veth),
            Command::ip_link_set_addr_down(peer, self.config.mac_addr.as_str()),
            Command::brctl_addif(br, veth),
            Command::ip_link_set_netns(peer, pid),
        ];
        for command in &commands {
            self.issue(command)?;
        }

        let con_pid = pid.to_string();
        let arc_ipv4 = self.config.arc_ipv4.to_string();
        let status = self.runner.add_interface_to_container(
            peer,
            self.config.arc_ifname.as_str(),
            &arc_ipv4,
            DEFAULT_NETMASK,
            self.kind.has_inbound_chain(),
            &con_pid,
        );
        self.check_container_call("add interface", status, pid)?;

        if self.kind.writes_sentinel() {
            let status = self.runner.write_sentinel_to_container(&con_pid);
            self.check_container_call("write sentinel", status, pid)?;
        }

        self.pid = pid;
        Ok(())
    }

    /// Forward new inbound connections arriving on `ifname` to the
    /// container, replacing any interface forwarded before.
    ///
    /// The rule is deferred until the container is ready. Does nothing on
    /// devices without inbound forwarding.
    ///
    /// # Errors
    ///
    /// Fails if `ifname` is not a valid interface name, in which case nothing
    /// is issued and the state is unchanged. Under a strict policy, also
    /// fails when a command fails.
    pub fn enable_inbound(&mut self, ifname: &str) -> ArcNetResult<()> {
        if !self.kind.has_inbound_chain() {
            return Ok(());
        }
        IfName::new(ifname)?;
        tracing::info!(device = %self.device_name, ifname, "Enabling inbound forwarding");

        let mut inbound = std::mem::take(&mut self.inbound);
        let result = inbound.enable(ifname, |action| self.inbound_action(action));
        self.inbound = inbound;
        result
    }

    /// Record whether the container is ready, installing deferred
    /// forwarding once it is.
    ///
    /// # Errors
    ///
    /// Only under a strict policy, when a command fails.
    pub fn container_ready(&mut self, is_ready: bool) -> ArcNetResult<()> {
        if !self.kind.has_inbound_chain() {
            return Ok(());
        }
        tracing::debug!(device = %self.device_name, is_ready, "Container readiness changed");

        let mut inbound = std::mem::take(&mut self.inbound);
        let result = inbound.set_ready(is_ready, |action| self.inbound_action(action));
        self.inbound = inbound;
        result
    }

    /// Stop forwarding inbound connections.
    ///
    /// # Errors
    ///
    /// Only under a strict policy, when a command fails.
    pub fn disable_inbound(&mut self) -> ArcNetResult<()> {
        if !self.kind.has_inbound_chain() {
            return Ok(());
        }
        tracing::info!(device = %self.device_name, "Disabling inbound forwarding");

        let mut inbound = std::mem::take(&mut self.inbound);
        let result = inbound.disable(|action| self.inbound_action(action));
        self.inbound = inbound;
        result
    }

    /// Remove everything set up for this device.
    ///
    /// Dropping the value does the same; this form makes the point of
    /// teardown explicit at the call site.
    pub fn teardown(self) {
        drop(self);
    }

    fn inbound_action(&self, action: InboundAction<'_>) -> ArcNetResult<()> {
        match action {
            InboundAction::Flush => self.issue(&plan::inbound_flush()),
            InboundAction::Install(ifname) => self.issue(&plan::inbound_rule(ifname).append()),
        }
    }

    fn issue(&self, command: &Command) -> ArcNetResult<()> {
        tracing::debug!(device = %self.device_name, command = %command, "Issuing command");
        let status = self.runner.run(command.argv(), command.log_failures());
        self.policy.check(command, status)
    }

    fn check_container_call(&self, what: &str, status: i32, pid: u32) -> ArcNetResult<()> {
        if status == 0 {
            return Ok(());
        }
        let command = format!("{what} in container {pid}");
        match self.policy {
            FailurePolicy::BestEffort => {
                tracing::warn!(
                    device = %self.device_name,
                    command = %command,
                    status,
                    "Container call failed"
                );
                Ok(())
            }
            FailurePolicy::Strict => Err(ArcNetError::CommandFailed { command, status }),
        }
    }
}

impl Drop for BridgeNetworkConfig {
    fn drop(&mut self) {
        if self.completed == 0 {
            return;
        }
        tracing::info!(device = %self.device_name, "Tearing down bridge");

        for command in self.plan.undo_commands(self.completed) {
            let status = self.runner.run(command.argv(), command.log_failures());
            // Teardown always runs to the end.
            if status != 0 && command.log_failures() {
                tracing::warn!(command = %command, status, "Teardown command failed");
            }
        }
        self.completed = 0;
    }
}

impl std::fmt::Debug for BridgeNetworkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeNetworkConfig")
            .field("device_name", &self.device_name)
            .field("kind", &self.kind)
            .field("config", &self.config)
            .field("policy", &self.policy)
            .field("pid", &self.pid)
            .field("inbound", &self.inbound)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeProcessRunner;

    fn config() -> DeviceConfig {
        DeviceConfig {
            br_ifname: "br".parse().unwrap(),
            br_ipv4: "1.2.3.4".parse().unwrap(),
            arc_ifname: "arc".parse().unwrap(),
            arc_ipv4: "6.7.8.9".parse().unwrap(),
            mac_addr: "00:11:22:33:44:55".parse().unwrap(),
            fwd_multicast: false,
        }
    }

    #[test]
    fn test_invalid_host_ifname_issues_nothing() {
        let runner = FakeProcessRunner::new();
        let result = BridgeNetworkConfig::new("eth 0", config(), Arc::new(runner.clone()));
        assert!(result.is_err());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_pid_is_remembered() {
        let runner = FakeProcessRunner::new();
        let mut cfg = BridgeNetworkConfig::new("android", config(), Arc::new(runner)).unwrap();
        assert_eq!(cfg.pid(), 0);
        cfg.init(42).unwrap();
        assert_eq!(cfg.pid(), 42);
        cfg.init(0).unwrap();
        assert_eq!(cfg.pid(), 0);
    }

    #[test]
    fn test_explicit_teardown_runs_once() {
        let runner = FakeProcessRunner::new();
        let cfg = BridgeNetworkConfig::new("android", config(), Arc::new(runner.clone())).unwrap();
        runner.clear();
        cfg.teardown();
        assert_eq!(runner.runs().len(), 4);
    }

    #[test]
    fn test_accessors() {
        let runner = FakeProcessRunner::new();
        let cfg = BridgeNetworkConfig::new("legacy_android", config(), Arc::new(runner)).unwrap();
        assert_eq!(cfg.device_name(), "legacy_android");
        assert_eq!(cfg.kind(), DeviceKind::LegacyAndroid);
        assert_eq!(cfg.config().br_ifname.as_str(), "br");
        assert_eq!(cfg.inbound_state(), &InboundState::Idle);
        assert!(!cfg.inbound_active());
    }
}

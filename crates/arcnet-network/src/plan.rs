//! Ordered setup steps and their undo commands.

use crate::command::{ChainOp, Command, Protocol, Rule, Table, Target};
use crate::device::{DeviceConfig, DeviceKind};

/// Chain that dispatches inbound traffic to [`DNAT_CHAIN`].
pub const TRY_CHAIN: &str = "try_arc";
/// Chain rewriting the destination to the container.
pub const DNAT_CHAIN: &str = "dnat_arc";

/// One setup command and what undoes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Command issued during setup, if any.
    pub apply: Option<Command>,
    /// Commands issued, in order, when unwinding this step.
    pub undo: Vec<Command>,
}

impl Step {
    fn new(apply: Command, undo: impl IntoIterator<Item = Command>) -> Self {
        Self {
            apply: Some(apply),
            undo: undo.into_iter().collect(),
        }
    }

    fn rule(rule: &Rule) -> Self {
        Self::new(rule.append(), [rule.delete()])
    }

    fn chain(table: Table, chain: &str, undo: &[ChainOp]) -> Self {
        Self::new(
            Command::iptables_chain(table, ChainOp::New, chain),
            undo.iter()
                .map(|op| Command::iptables_chain(table, *op, chain)),
        )
    }
}

/// The full setup sequence for one device.
///
/// Teardown is the undo commands of each step, steps taken in reverse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    steps: Vec<Step>,
}

impl Plan {
    /// Build the plan for `device_name` of variant `kind`.
    ///
    /// `veth_ifname` is the host end of the container link; it is removed
    /// on teardown even if no container was ever attached.
    #[must_use]
    pub fn build(
        device_name: &str,
        kind: DeviceKind,
        config: &DeviceConfig,
        veth_ifname: &str,
    ) -> Self {
        let br = config.br_ifname.as_str();
        let arc_ipv4 = config.arc_ipv4.to_string();

        let mut steps = vec![
            Step::new(Command::brctl_addbr(br), [Command::brctl_delbr(br)]),
            Step::new(
                Command::ifconfig_up(br, &config.br_ipv4.to_string()),
                [Command::ifconfig_down(br)],
            ),
            Step {
                apply: None,
                undo: vec![Command::ip_link_delete(veth_ifname)],
            },
            Step::rule(&Rule::new(Table::Mangle, "PREROUTING", Target::Mark(1)).in_iface(br)),
        ];

        let forward = Rule::new(Table::Filter, "FORWARD", Target::Accept).out_iface(br);

        match kind {
            DeviceKind::Default => {
                let host = device_name;
                steps.push(Step::rule(
                    &Rule::new(Table::Nat, "PREROUTING", Target::Accept)
                        .in_iface(host)
                        .existing_socket(),
                ));
                for protocol in [Protocol::Tcp, Protocol::Udp] {
                    steps.push(Step::rule(
                        &Rule::new(Table::Nat, "PREROUTING", Target::Dnat(arc_ipv4.clone()))
                            .in_iface(host)
                            .protocol(protocol),
                    ));
                }
                steps.push(Step::rule(&forward));
            }
            DeviceKind::LegacyAndroid => {
                steps.push(Step::chain(Table::Nat, DNAT_CHAIN, &[ChainOp::Delete]));
                // Flushing the populated chain is enough to undo this rule.
                steps.push(Step::new(
                    Rule::new(Table::Nat, DNAT_CHAIN, Target::Dnat(arc_ipv4)).append(),
                    [Command::iptables_chain(Table::Nat, ChainOp::Flush, DNAT_CHAIN)],
                ));
                // Filled later by inbound forwarding.
                steps.push(Step::chain(
                    Table::Nat,
                    TRY_CHAIN,
                    &[ChainOp::Flush, ChainOp::Delete],
                ));
                steps.push(Step::rule(
                    &Rule::new(Table::Nat, "PREROUTING", Target::Accept).existing_socket(),
                ));
                for protocol in [Protocol::Tcp, Protocol::Udp] {
                    steps.push(Step::rule(
                        &Rule::new(Table::Nat, "PREROUTING", Target::Jump(TRY_CHAIN.into()))
                            .protocol(protocol),
                    ));
                }
                steps.push(Step::rule(&forward));
            }
            DeviceKind::Android => {}
        }

        Self { steps }
    }

    /// Steps in setup order.
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Every setup command, in order.
    pub fn setup_commands(&self) -> impl Iterator<Item = &Command> {
        self.steps.iter().filter_map(|step| step.apply.as_ref())
    }

    /// Undo commands for the first `completed` steps, in teardown order.
    pub fn undo_commands(&self, completed: usize) -> impl Iterator<Item = &Command> {
        self.steps[..completed.min(self.steps.len())]
            .iter()
            .rev()
            .flat_map(|step| step.undo.iter())
    }
}

/// The rule routing inbound traffic on `ifname` to the container.
#[must_use]
pub fn inbound_rule(ifname: &str) -> Rule {
    Rule::new(Table::Nat, TRY_CHAIN, Target::Jump(DNAT_CHAIN.into())).in_iface(ifname)
}

/// Flush every inbound forwarding rule.
#[must_use]
pub fn inbound_flush() -> Command {
    Command::iptables_chain(Table::Nat, ChainOp::Flush, TRY_CHAIN)
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn lines<'a>(cmds: impl Iterator<Item = &'a Command>) -> Vec<String> {
        cmds.map(ToString::to_string).collect()
    }

    #[test]
    fn android_plan_is_minimal() {
        let plan = Plan::build("android", DeviceKind::Android, &config(), "veth_arc");
        assert_eq!(plan.setup_commands().count(), 3);
        assert_eq!(
            lines(plan.undo_commands(plan.steps().len())),
            [
                "/sbin/iptables -t mangle -D PREROUTING -i br -j MARK --set-mark 1 -w",
                "/bin/ip link delete veth_arc",
                "/bin/ifconfig br down",
                "/sbin/brctl delbr br",
            ]
        );
    }

    #[test]
    fn partial_undo_only_covers_completed_steps() {
        let plan = Plan::build("eth0", DeviceKind::Default, &config(), "veth_arc");
        assert_eq!(
            lines(plan.undo_commands(2)),
            ["/bin/ifconfig br down", "/sbin/brctl delbr br"]
        );
        assert_eq!(plan.undo_commands(0).count(), 0);
        assert_eq!(
            plan.undo_commands(usize::MAX).count(),
            plan.undo_commands(plan.steps().len()).count()
        );
    }

    #[test]
    fn every_apply_has_an_undo() {
        for (name, kind) in [
            ("eth0", DeviceKind::Default),
            ("android", DeviceKind::Android),
            ("legacy_android", DeviceKind::LegacyAndroid),
        ] {
            let plan = Plan::build(name, kind, &config(), "veth_arc");
            assert!(plan.steps().iter().all(|step| !step.undo.is_empty()));
        }
    }

    #[test]
    fn inbound_commands() {
        assert_eq!(
            inbound_rule("eth0").append().to_string(),
            "/sbin/iptables -t nat -A try_arc -i eth0 -j dnat_arc -w"
        );
        assert_eq!(inbound_flush().to_string(), "/sbin/iptables -t nat -F try_arc -w");
    }
}

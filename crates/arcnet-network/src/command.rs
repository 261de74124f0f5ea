//! Structured builders for the external commands issued by arcnet.
//!
//! Every argv the crate hands to a [`ProcessRunner`](crate::ProcessRunner)
//! is produced here, so the exact command strings live in one place.

use std::fmt;

/// Path to the bridge control utility.
pub const BRCTL_PATH: &str = "/sbin/brctl";
/// Path to ifconfig.
pub const IFCONFIG_PATH: &str = "/bin/ifconfig";
/// Path to iptables.
pub const IPTABLES_PATH: &str = "/sbin/iptables";
/// Path to iproute2's `ip`.
pub const IP_PATH: &str = "/bin/ip";

/// Netmask used on both ends of the bridge link.
pub const DEFAULT_NETMASK: &str = "255.255.255.252";

/// A single external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    argv: Vec<String>,
    log_failures: bool,
}

impl Command {
    fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut argv = vec![program.to_string()];
        argv.extend(args.into_iter().map(Into::into));
        Self {
            argv,
            log_failures: true,
        }
    }

    /// Mark the command as expected to fail sometimes.
    ///
    /// Runners do not log failures of quiet commands and strict failure
    /// policies do not treat them as errors.
    #[must_use]
    pub fn quiet(mut self) -> Self {
        self.log_failures = false;
        self
    }

    /// The full argv, program first.
    #[must_use]
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// Whether the runner should log a non-zero exit.
    #[must_use]
    pub fn log_failures(&self) -> bool {
        self.log_failures
    }

    /// `brctl addbr <bridge>`
    #[must_use]
    pub fn brctl_addbr(bridge: &str) -> Self {
        Self::new(BRCTL_PATH, ["addbr", bridge])
    }

    /// `brctl delbr <bridge>`
    #[must_use]
    pub fn brctl_delbr(bridge: &str) -> Self {
        Self::new(BRCTL_PATH, ["delbr", bridge])
    }

    /// `brctl addif <bridge> <interface>`
    #[must_use]
    pub fn brctl_addif(bridge: &str, interface: &str) -> Self {
        Self::new(BRCTL_PATH, ["addif", bridge, interface])
    }

    /// `ifconfig <interface> <addr> netmask 255.255.255.252 up`
    #[must_use]
    pub fn ifconfig_up(interface: &str, addr: &str) -> Self {
        Self::new(
            IFCONFIG_PATH,
            [interface, addr, "netmask", DEFAULT_NETMASK, "up"],
        )
    }

    /// `ifconfig <interface> up`
    #[must_use]
    pub fn ifconfig_link_up(interface: &str) -> Self {
        Self::new(IFCONFIG_PATH, [interface, "up"])
    }

    /// `ifconfig <interface> down`
    #[must_use]
    pub fn ifconfig_down(interface: &str) -> Self {
        Self::new(IFCONFIG_PATH, [interface, "down"])
    }

    /// `ip link delete <interface>`
    ///
    /// Deleting a link that does not exist fails, so this is always quiet.
    #[must_use]
    pub fn ip_link_delete(interface: &str) -> Self {
        Self::new(IP_PATH, ["link", "delete", interface]).quiet()
    }

    /// `ip link add <veth> type veth peer name <peer>`
    #[must_use]
    pub fn ip_link_add_veth(veth: &str, peer: &str) -> Self {
        Self::new(IP_PATH, ["link", "add", veth, "type", "veth", "peer", "name", peer])
    }

    /// `ip link set dev <interface> addr <mac> down`
    #[must_use]
    pub fn ip_link_set_addr_down(interface: &str, mac: &str) -> Self {
        Self::new(IP_PATH, ["link", "set", "dev", interface, "addr", mac, "down"])
    }

    /// `ip link set <interface> netns <pid>`
    #[must_use]
    pub fn ip_link_set_netns(interface: &str, pid: u32) -> Self {
        let pid = pid.to_string();
        Self::new(IP_PATH, ["link", "set", interface, "netns", pid.as_str()])
    }

    /// `iptables -t <table> <-N|-F|-X> <chain> -w`
    #[must_use]
    pub fn iptables_chain(table: Table, op: ChainOp, chain: &str) -> Self {
        Self::new(
            IPTABLES_PATH,
            ["-t", table.as_str(), op.as_flag(), chain, "-w"],
        )
    }

    fn iptables_rule(flag: &str, rule: &Rule) -> Self {
        let mut args = vec![
            "-t".to_string(),
            rule.table.as_str().to_string(),
            flag.to_string(),
            rule.chain.clone(),
        ];
        rule.push_matches(&mut args);
        // Wait for the xtables lock instead of failing on contention.
        args.push("-w".to_string());
        Self::new(IPTABLES_PATH, args)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv.join(" "))
    }
}

/// iptables table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    /// Packet alteration (marks).
    Mangle,
    /// Address translation.
    Nat,
    /// Packet filtering.
    Filter,
}

impl Table {
    /// Get the table name for iptables.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mangle => "mangle",
            Self::Nat => "nat",
            Self::Filter => "filter",
        }
    }
}

/// Operations on a whole user-defined chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainOp {
    /// `-N`: create the chain.
    New,
    /// `-F`: remove every rule in the chain.
    Flush,
    /// `-X`: delete the (empty) chain.
    Delete,
}

impl ChainOp {
    fn as_flag(self) -> &'static str {
        match self {
            Self::New => "-N",
            Self::Flush => "-F",
            Self::Delete => "-X",
        }
    }
}

/// Protocol match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// TCP protocol.
    Tcp,
    /// UDP protocol.
    Udp,
}

impl Protocol {
    fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rule target (`-j`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// `-j ACCEPT`
    Accept,
    /// `-j MARK --set-mark <mark>`
    Mark(u32),
    /// `-j DNAT --to-destination <addr>`
    Dnat(String),
    /// `-j <chain>`
    Jump(String),
}

/// An iptables rule: table, chain, matches and target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    table: Table,
    chain: String,
    in_iface: Option<String>,
    out_iface: Option<String>,
    protocol: Option<Protocol>,
    socket_nowildcard: bool,
    target: Target,
}

impl Rule {
    /// Create a rule in `table`/`chain` jumping to `target`.
    pub fn new(table: Table, chain: &str, target: Target) -> Self {
        Self {
            table,
            chain: chain.to_string(),
            in_iface: None,
            out_iface: None,
            protocol: None,
            socket_nowildcard: false,
            target,
        }
    }

    /// Match on input interface (`-i`).
    #[must_use]
    pub fn in_iface(mut self, interface: &str) -> Self {
        self.in_iface = Some(interface.to_string());
        self
    }

    /// Match on output interface (`-o`).
    #[must_use]
    pub fn out_iface(mut self, interface: &str) -> Self {
        self.out_iface = Some(interface.to_string());
        self
    }

    /// Match on protocol (`-p`).
    #[must_use]
    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    /// Match packets that belong to an existing, non-wildcard socket.
    #[must_use]
    pub fn existing_socket(mut self) -> Self {
        self.socket_nowildcard = true;
        self
    }

    /// The command appending this rule (`-A`).
    #[must_use]
    pub fn append(&self) -> Command {
        Command::iptables_rule("-A", self)
    }

    /// The command deleting this rule (`-D`), mirror of [`Rule::append`].
    #[must_use]
    pub fn delete(&self) -> Command {
        Command::iptables_rule("-D", self)
    }

    fn push_matches(&self, args: &mut Vec<String>) {
        if let Some(iface) = &self.in_iface {
            args.extend(["-i".to_string(), iface.clone()]);
        }
        if let Some(iface) = &self.out_iface {
            args.extend(["-o".to_string(), iface.clone()]);
        }
        if let Some(protocol) = self.protocol {
            args.extend(["-p".to_string(), protocol.as_str().to_string()]);
        }
        if self.socket_nowildcard {
            args.extend(["-m", "socket", "--nowildcard"].map(String::from));
        }

        args.push("-j".to_string());
        match &self.target {
            Target::Accept => args.push("ACCEPT".to_string()),
            Target::Mark(mark) => {
                args.extend(["MARK".to_string(), "--set-mark".to_string(), mark.to_string()]);
            }
            Target::Dnat(addr) => {
                args.extend([
                    "DNAT".to_string(),
                    "--to-destination".to_string(),
                    addr.clone(),
                ]);
            }
            Target::Jump(chain) => args.push(chain.clone()),
        }
    }
}

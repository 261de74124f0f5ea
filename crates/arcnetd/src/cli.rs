//! CLI command definitions and handlers.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::Result;
use serde::Serialize;

use arcnet_common::{ArcNetResult, IfName};
use arcnet_network::{
    BridgeNetworkConfig, FakeCall, FakeProcessRunner, Settings, SystemProcessRunner,
};

/// arcnetd - bridge and NAT setup for container networking
#[derive(Parser)]
#[command(name = "arcnetd")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Settings file
    #[arg(
        short,
        long,
        global = true,
        env = "ARCNET_CONFIG",
        default_value = "/etc/arcnet/arcnet.toml"
    )]
    pub config: PathBuf,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for `plan`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// One command per line, grouped by phase.
    Text,
    /// A JSON object keyed by phase.
    Json,
}

/// Subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Print the commands a device would issue without running them
    Plan {
        /// Device name from the settings file
        #[arg(short, long)]
        device: String,

        /// Container pid to attach
        #[arg(long)]
        pid: Option<u32>,

        /// Host interface to forward inbound traffic from (repeatable)
        #[arg(long)]
        inbound: Vec<IfName>,

        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Configure a device, wait for Ctrl-C, then tear it down
    Up {
        /// Device name from the settings file
        #[arg(short, long)]
        device: String,

        /// Container pid to attach
        #[arg(long)]
        pid: Option<u32>,

        /// Host interface to forward inbound traffic from
        #[arg(long)]
        inbound: Option<IfName>,
    },
}

impl Cli {
    /// Execute the parsed command.
    pub async fn execute(self) -> Result<()> {
        let settings = Settings::from_file(&self.config)?;

        match self.command {
            Commands::Plan {
                device,
                pid,
                inbound,
                format,
            } => {
                let report = plan_report(&settings, &device, pid, &inbound)?;
                match format {
                    Format::Text => print!("{}", report.render_text()),
                    Format::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                }
                Ok(())
            }
            Commands::Up {
                device,
                pid,
                inbound,
            } => up(&settings, &device, pid, inbound.as_ref()).await,
        }
    }
}

/// Commands a device issues in each phase of its life.
#[derive(Debug, Serialize)]
pub struct PlanReport {
    /// Device name.
    pub device: String,
    /// Variant derived from the name.
    pub kind: String,
    /// Issued on creation.
    pub setup: Vec<String>,
    /// Issued when attaching the container.
    pub init: Vec<String>,
    /// Issued when enabling inbound forwarding on a ready container.
    pub inbound: Vec<String>,
    /// Issued on teardown.
    pub teardown: Vec<String>,
}

impl PlanReport {
    fn render_text(&self) -> String {
        let mut out = format!("# device {} ({})\n", self.device, self.kind);
        for (phase, lines) in [
            ("setup", &self.setup),
            ("init", &self.init),
            ("inbound", &self.inbound),
            ("teardown", &self.teardown),
        ] {
            if lines.is_empty() {
                continue;
            }
            out.push_str(&format!("\n## {phase}\n"));
            for line in lines {
                out.push_str(line);
                out.push('\n');
            }
        }
        out
    }
}

fn lines(calls: Vec<FakeCall>) -> Vec<String> {
    calls.iter().map(ToString::to_string).collect()
}

/// Record what `device` would issue, using a recording runner.
pub fn plan_report(
    settings: &Settings,
    device: &str,
    pid: Option<u32>,
    inbound: &[IfName],
) -> ArcNetResult<PlanReport> {
    let entry = settings.device(device)?;
    let runner = FakeProcessRunner::new();

    let mut cfg = BridgeNetworkConfig::with_policy(
        &entry.name,
        entry.config.clone(),
        Arc::new(runner.clone()),
        settings.failure_policy,
    )?;
    let kind = cfg.kind().to_string();
    let setup = lines(runner.take());

    if let Some(pid) = pid {
        cfg.init(pid)?;
    }
    let init = lines(runner.take());

    if !inbound.is_empty() {
        cfg.container_ready(true)?;
        for ifname in inbound {
            cfg.enable_inbound(ifname.as_str())?;
        }
    }
    let inbound = lines(runner.take());

    cfg.teardown();
    let teardown = lines(runner.take());

    Ok(PlanReport {
        device: entry.name.clone(),
        kind,
        setup,
        init,
        inbound,
        teardown,
    })
}

async fn up(
    settings: &Settings,
    device: &str,
    pid: Option<u32>,
    inbound: Option<&IfName>,
) -> Result<()> {
    let entry = settings.device(device)?;
    let runner = SystemProcessRunner::with_paths(settings.runner.clone());

    let mut cfg = BridgeNetworkConfig::with_policy(
        &entry.name,
        entry.config.clone(),
        Arc::new(runner),
        settings.failure_policy,
    )?;

    if let Some(pid) = pid {
        cfg.init(pid)?;
    }
    if let Some(ifname) = inbound {
        cfg.enable_inbound(ifname.as_str())?;
        cfg.container_ready(pid.is_some())?;
    }

    tracing::info!(device = %entry.name, "Device configured, press Ctrl-C to tear down");
    tokio::signal::ctrl_c().await?;

    cfg.teardown();
    tracing::info!(device = %entry.name, "Device torn down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    const SETTINGS: &str = r#"
[[devices]]
name = "legacy_android"
br_ifname = "arcbr0"
br_ipv4 = "100.115.92.1"
arc_ifname = "arc0"
arc_ipv4 = "100.115.92.2"
mac_addr = "00:FF:AA:00:00:56"
fwd_multicast = true

[[devices]]
name = "android"
br_ifname = "arcbr1"
br_ipv4 = "100.115.92.5"
arc_ifname = "arc1"
arc_ipv4 = "100.115.92.6"
mac_addr = "00:FF:AA:00:00:57"
"#;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_plan_arguments() {
        let cli = Cli::try_parse_from([
            "arcnetd",
            "plan",
            "--device",
            "legacy_android",
            "--pid",
            "42",
            "--inbound",
            "eth0",
            "--inbound",
            "wlan0",
        ])
        .unwrap();
        match cli.command {
            Commands::Plan {
                device,
                pid,
                inbound,
                format,
            } => {
                assert_eq!(device, "legacy_android");
                assert_eq!(pid, Some(42));
                let inbound: Vec<&str> = inbound.iter().map(IfName::as_str).collect();
                assert_eq!(inbound, ["eth0", "wlan0"]);
                assert_eq!(format, Format::Text);
            }
            Commands::Up { .. } => panic!("expected plan"),
        }
    }

    #[test]
    fn rejects_invalid_inbound_ifname() {
        for bad in ["", "averyverylongname", "eth/0"] {
            let parsed = Cli::try_parse_from([
                "arcnetd",
                "plan",
                "--device",
                "legacy_android",
                "--inbound",
                bad,
            ]);
            assert!(parsed.is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn plan_records_every_phase() {
        let settings = Settings::from_toml_str(SETTINGS).unwrap();
        let report =
            plan_report(&settings, "legacy_android", Some(42), &["eth0".parse().unwrap()])
                .unwrap();

        assert_eq!(report.kind, "legacy-android");
        assert_eq!(report.setup.len(), 10);
        assert_eq!(report.init.len(), 8);
        assert_eq!(
            report.inbound,
            ["/sbin/iptables -t nat -A try_arc -i eth0 -j dnat_arc -w"]
        );
        assert_eq!(report.teardown.len(), 12);
        assert_eq!(report.teardown.last().unwrap(), "/sbin/brctl delbr arcbr0");
    }

    #[test]
    fn plan_without_pid_skips_init() {
        let settings = Settings::from_toml_str(SETTINGS).unwrap();
        let report = plan_report(&settings, "android", None, &[]).unwrap();

        assert!(report.init.is_empty());
        assert!(report.inbound.is_empty());
        let text = report.render_text();
        assert!(text.starts_with("# device android (android)\n"));
        assert!(!text.contains("## init"));
        assert!(text.contains("## teardown\n"));
    }

    #[test]
    fn plan_unknown_device_fails() {
        let settings = Settings::from_toml_str(SETTINGS).unwrap();
        assert!(plan_report(&settings, "wlan0", None, &[]).is_err());
    }

    #[test]
    fn plan_serializes_to_json() {
        let settings = Settings::from_toml_str(SETTINGS).unwrap();
        let report = plan_report(&settings, "android", Some(7), &[]).unwrap();
        let json: serde_json::Value = serde_json::to_value(&report).unwrap();
        assert_eq!(json["device"], "android");
        assert_eq!(json["init"][0], "/bin/ip link delete veth_arc1");
    }

    #[tokio::test]
    async fn execute_reads_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arcnet.toml");
        std::fs::write(&path, SETTINGS).unwrap();

        let cli = Cli::try_parse_from([
            "arcnetd",
            "--config",
            path.to_str().unwrap(),
            "plan",
            "--device",
            "android",
        ])
        .unwrap();
        assert!(cli.execute().await.is_ok());
    }
}

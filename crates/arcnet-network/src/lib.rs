//! # arcnet-network
//!
//! Bridge and NAT configuration connecting a container's network namespace
//! to the host.
//!
//! [`BridgeNetworkConfig`] owns one bridge, the veth pair into the container
//! and the iptables rules around them. Every command goes through a
//! [`ProcessRunner`], so the whole sequence can be recorded with
//! [`FakeProcessRunner`] instead of touching the host.

#![warn(missing_docs)]

pub mod bridge;
pub mod command;
pub mod device;
pub mod fake;
pub mod inbound;
pub mod plan;
pub mod policy;
pub mod runner;
pub mod settings;

pub use bridge::BridgeNetworkConfig;
pub use command::{Command, DEFAULT_NETMASK};
pub use device::{ANDROID_DEVICE, ANDROID_LEGACY_DEVICE, DeviceConfig, DeviceKind, MacAddr};
pub use fake::{FakeCall, FakeProcessRunner, InterfaceRecord};
pub use inbound::{InboundMachine, InboundState};
pub use plan::Plan;
pub use policy::FailurePolicy;
pub use runner::{ProcessRunner, RunnerPaths, SystemProcessRunner};
pub use settings::{DeviceEntry, Settings};

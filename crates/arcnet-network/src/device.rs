//! Device variants and per-device addressing.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use arcnet_common::{ArcNetError, ArcNetResult, IfName};

/// Device name of the shared Android container.
pub const ANDROID_DEVICE: &str = "android";
/// Device name of the shared Android container with inbound forwarding.
pub const ANDROID_LEGACY_DEVICE: &str = "legacy_android";

/// Host-side veth prefix.
pub const VETH_PREFIX: &str = "veth_";
/// Container-side veth prefix.
pub const PEER_PREFIX: &str = "peer_";

/// Which rule set a device gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// Per-app container; DNAT from the host interface named by the device.
    Default,
    /// Shared Android container; routing is handled elsewhere.
    Android,
    /// Shared Android container with the `try_arc`/`dnat_arc` chains.
    LegacyAndroid,
}

impl DeviceKind {
    /// Derive the variant from a device name.
    #[must_use]
    pub fn from_device_name(name: &str) -> Self {
        match name {
            ANDROID_DEVICE => Self::Android,
            ANDROID_LEGACY_DEVICE => Self::LegacyAndroid,
            _ => Self::Default,
        }
    }

    /// Whether the inbound forwarding chains exist for this variant.
    #[must_use]
    pub fn has_inbound_chain(self) -> bool {
        self == Self::LegacyAndroid
    }

    /// Whether the container gets a readiness sentinel after init.
    #[must_use]
    pub fn writes_sentinel(self) -> bool {
        matches!(self, Self::Android | Self::LegacyAndroid)
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Default => "default",
            Self::Android => "android",
            Self::LegacyAndroid => "legacy-android",
        };
        write!(f, "{name}")
    }
}

/// A MAC address as written in the settings, e.g. `00:FF:AA:00:00:56`.
///
/// The original spelling is kept so commands render it unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddr(String);

impl MacAddr {
    /// Parse a colon-separated MAC address.
    ///
    /// # Errors
    ///
    /// Returns a config error unless the value is six hex octets.
    pub fn new(mac: impl Into<String>) -> ArcNetResult<Self> {
        let mac = mac.into();
        let octets: Vec<&str> = mac.split(':').collect();
        let valid = octets.len() == 6
            && octets
                .iter()
                .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()));
        if !valid {
            return Err(ArcNetError::config(format!("invalid MAC address '{mac}'")));
        }
        Ok(Self(mac))
    }

    /// Get the address as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MacAddr {
    type Err = ArcNetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for MacAddr {
    type Error = ArcNetError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MacAddr> for String {
    fn from(mac: MacAddr) -> Self {
        mac.0
    }
}

/// Addressing for one bridge and the container interface behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Bridge interface on the host.
    pub br_ifname: IfName,
    /// Bridge address (host side of the /30).
    pub br_ipv4: Ipv4Addr,
    /// Interface name inside the container.
    pub arc_ifname: IfName,
    /// Container address.
    pub arc_ipv4: Ipv4Addr,
    /// MAC of the container-side veth end.
    pub mac_addr: MacAddr,
    /// Set for the legacy Android device.
    #[serde(default)]
    pub fwd_multicast: bool,
}

impl DeviceConfig {
    /// Host-side veth name, `veth_<arc_ifname>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the prefixed name is too long.
    pub fn veth_ifname(&self) -> ArcNetResult<IfName> {
        self.arc_ifname.with_prefix(VETH_PREFIX)
    }

    /// Container-side veth name before the rename, `peer_<arc_ifname>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the prefixed name is too long.
    pub fn peer_ifname(&self) -> ArcNetResult<IfName> {
        self.arc_ifname.with_prefix(PEER_PREFIX)
    }

    /// Check the configuration for use as `kind`.
    ///
    /// # Errors
    ///
    /// Fails if the derived veth names are not valid interface names or the
    /// two ends share an address.
    pub fn validate(&self, kind: DeviceKind) -> ArcNetResult<()> {
        self.veth_ifname()?;
        self.peer_ifname()?;

        if self.br_ipv4 == self.arc_ipv4 {
            return Err(ArcNetError::config(format!(
                "bridge and container share address {}",
                self.br_ipv4
            )));
        }

        if !same_slash30(self.br_ipv4, self.arc_ipv4) {
            tracing::warn!(
                br_ipv4 = %self.br_ipv4,
                arc_ipv4 = %self.arc_ipv4,
                "Bridge and container addresses are not in one /30"
            );
        }

        if self.fwd_multicast != kind.has_inbound_chain() {
            tracing::warn!(
                fwd_multicast = self.fwd_multicast,
                %kind,
                "Multicast forwarding flag does not match the device variant"
            );
        }

        Ok(())
    }
}

fn same_slash30(a: Ipv4Addr, b: Ipv4Addr) -> bool {
    u32::from(a) >> 2 == u32::from(b) >> 2
}

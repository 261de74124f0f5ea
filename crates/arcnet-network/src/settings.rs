//! Settings file loading.
//!
//! ```toml
//! failure_policy = "best-effort"
//!
//! [runner]
//! nsenter = "/usr/bin/nsenter"
//!
//! [[devices]]
//! name = "legacy_android"
//! br_ifname = "arcbr0"
//! br_ipv4 = "100.115.92.1"
//! arc_ifname = "arc0"
//! arc_ipv4 = "100.115.92.2"
//! mac_addr = "00:FF:AA:00:00:56"
//! fwd_multicast = true
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use arcnet_common::{ArcNetError, ArcNetResult, IfName};

use crate::device::{DeviceConfig, DeviceKind};
use crate::policy::FailurePolicy;
use crate::runner::RunnerPaths;

/// One configured device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceEntry {
    /// Device name; selects the variant.
    pub name: String,
    /// Addressing for the device.
    #[serde(flatten)]
    pub config: DeviceConfig,
    /// Keys not consumed by `config`; rejected on load.
    #[serde(flatten)]
    unknown: BTreeMap<String, toml::Value>,
}

/// Top-level settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// How command failures are handled.
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Tool locations for the system runner.
    #[serde(default)]
    pub runner: RunnerPaths,
    /// Configured devices.
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

impl Settings {
    /// Load and validate settings from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read, or a config error if
    /// it does not parse or validate.
    pub fn from_file(path: impl AsRef<Path>) -> ArcNetResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let settings = Self::from_toml_str(&text)?;
        tracing::debug!(
            path = %path.display(),
            devices = settings.devices.len(),
            "Loaded settings"
        );
        Ok(settings)
    }

    /// Parse and validate settings from TOML text.
    ///
    /// # Errors
    ///
    /// Returns a config error if the text does not parse or validate.
    pub fn from_toml_str(text: &str) -> ArcNetResult<Self> {
        let settings: Self = toml::from_str(text).map_err(|e| ArcNetError::config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Look up a device by name.
    ///
    /// # Errors
    ///
    /// Returns [`ArcNetError::DeviceNotFound`] if no device has that name.
    pub fn device(&self, name: &str) -> ArcNetResult<&DeviceEntry> {
        self.devices
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| ArcNetError::DeviceNotFound {
                name: name.to_string(),
            })
    }

    fn validate(&self) -> ArcNetResult<()> {
        let mut names = HashSet::new();
        let mut bridges = HashSet::new();

        for entry in &self.devices {
            if let Some(key) = entry.unknown.keys().next() {
                return Err(ArcNetError::config(format!(
                    "device '{}' has unknown field '{key}'",
                    entry.name
                )));
            }
            let kind = DeviceKind::from_device_name(&entry.name);
            if kind == DeviceKind::Default {
                // The device name is also the host interface.
                IfName::new(entry.name.as_str())?;
            }
            if !names.insert(entry.name.as_str()) {
                return Err(ArcNetError::config(format!(
                    "device '{}' is configured twice",
                    entry.name
                )));
            }
            if !bridges.insert(entry.config.br_ifname.as_str()) {
                return Err(ArcNetError::config(format!(
                    "bridge '{}' is used by more than one device",
                    entry.config.br_ifname
                )));
            }
            entry.config.validate(kind)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
failure_policy = "strict"

[runner]
nsenter = "/bin/nsenter"

[[devices]]
name = "legacy_android"
br_ifname = "arcbr0"
br_ipv4 = "100.115.92.1"
arc_ifname = "arc0"
arc_ipv4 = "100.115.92.2"
mac_addr = "00:FF:AA:00:00:56"
fwd_multicast = true

[[devices]]
name = "eth0"
br_ifname = "arc_eth0"
br_ipv4 = "100.115.92.5"
arc_ifname = "eth0"
arc_ipv4 = "100.115.92.6"
mac_addr = "00:FF:AA:00:00:57"
"#;

    #[test]
    fn parse_sample() {
        let settings = Settings::from_toml_str(SAMPLE).unwrap();
        assert_eq!(settings.failure_policy, FailurePolicy::Strict);
        assert_eq!(settings.runner.nsenter, "/bin/nsenter");
        assert_eq!(settings.runner.touch, RunnerPaths::default().touch);
        assert_eq!(settings.devices.len(), 2);

        let eth0 = settings.device("eth0").unwrap();
        assert!(!eth0.config.fwd_multicast);
        assert_eq!(eth0.config.arc_ipv4.to_string(), "100.115.92.6");
    }

    #[test]
    fn defaults_when_empty() {
        let settings = Settings::from_toml_str("").unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn unknown_device() {
        let settings = Settings::from_toml_str(SAMPLE).unwrap();
        let err = settings.device("wlan0").unwrap_err();
        assert!(matches!(err, ArcNetError::DeviceNotFound { .. }));
    }

    #[test]
    fn rejects_duplicate_devices() {
        let twice = format!("{SAMPLE}\n{}", &SAMPLE[SAMPLE.find("[[devices]]").unwrap()..]);
        assert!(Settings::from_toml_str(&twice).is_err());
    }

    #[test]
    fn rejects_bad_values() {
        let bad_mac = SAMPLE.replace("00:FF:AA:00:00:56", "not-a-mac");
        assert!(Settings::from_toml_str(&bad_mac).is_err());

        let bad_ip = SAMPLE.replace("100.115.92.1\"", "100.115.92\"");
        assert!(Settings::from_toml_str(&bad_ip).is_err());

        let long_name = SAMPLE.replace("arc_ifname = \"arc0\"", "arc_ifname = \"arcdevice1234\"");
        assert!(Settings::from_toml_str(&long_name).is_err());
    }

    #[test]
    fn rejects_unknown_device_field() {
        let typo = SAMPLE.replace("fwd_multicast = true", "fwd_multicst = true");
        let err = Settings::from_toml_str(&typo).unwrap_err();
        assert!(matches!(err, ArcNetError::Config { .. }));
        assert!(err.to_string().contains("fwd_multicst"));
    }

    #[test]
    fn rejects_invalid_host_device_name() {
        let bad = SAMPLE.replace("\nname = \"eth0\"", "\nname = \"eth 0\"");
        let err = Settings::from_toml_str(&bad).unwrap_err();
        assert!(matches!(err, ArcNetError::InvalidInterfaceName { .. }));
    }

    #[test]
    fn from_file_reads_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arcnet.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        assert_eq!(Settings::from_file(&path).unwrap().devices.len(), 2);

        let missing = Settings::from_file(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(missing, ArcNetError::Io(_)));
    }
}

//! Property tests for inbound forwarding on the legacy Android device.

use std::sync::Arc;

use arcnet_network::{BridgeNetworkConfig, DeviceConfig, FakeProcessRunner, InboundState};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Enable(&'static str),
    Ready(bool),
    Disable,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        prop::sample::select(vec!["eth0", "wlan0", "usb0"]).prop_map(Op::Enable),
        any::<bool>().prop_map(Op::Ready),
        Just(Op::Disable),
    ]
}

fn device_config() -> DeviceConfig {
    DeviceConfig {
        br_ifname: "arcbr0".parse().unwrap(),
        br_ipv4: "100.115.92.1".parse().unwrap(),
        arc_ifname: "arc0".parse().unwrap(),
        arc_ipv4: "100.115.92.2".parse().unwrap(),
        mac_addr: "00:FF:AA:00:00:56".parse().unwrap(),
        fwd_multicast: true,
    }
}

/// Replays recorded commands against a model of the `try_arc` chain.
fn replay(chain: &mut Vec<String>, lines: &[String]) {
    for line in lines {
        if line == "/sbin/iptables -t nat -F try_arc -w" {
            chain.clear();
        } else if let Some(rest) = line.strip_prefix("/sbin/iptables -t nat -A try_arc -i ") {
            let ifname = rest.strip_suffix(" -j dnat_arc -w").unwrap();
            chain.push(ifname.to_string());
        }
    }
}

proptest! {
    #[test]
    fn try_arc_matches_state(ops in prop::collection::vec(op(), 0..40)) {
        let runner = FakeProcessRunner::new();
        let mut cfg = BridgeNetworkConfig::new(
            "legacy_android",
            device_config(),
            Arc::new(runner.clone()),
        )
        .unwrap();
        runner.clear();

        let mut chain = Vec::new();
        for op in ops {
            let was_active = cfg.inbound_active();
            match op {
                Op::Enable(ifname) => cfg.enable_inbound(ifname).unwrap(),
                Op::Ready(ready) => cfg.container_ready(ready).unwrap(),
                Op::Disable => cfg.disable_inbound().unwrap(),
            }
            replay(&mut chain, &runner.take().iter().map(ToString::to_string).collect::<Vec<_>>());

            prop_assert!(chain.len() <= 1, "try_arc holds {:?}", chain);
            match cfg.inbound_state() {
                InboundState::Active(ifname) => {
                    prop_assert_eq!(&chain, &vec![ifname.clone()]);
                }
                _ => {
                    prop_assert!(chain.is_empty());
                }
            }
            if !was_active && cfg.inbound_active() {
                prop_assert!(cfg.is_container_ready());
            }
        }
    }

    #[test]
    fn other_variants_never_touch_inbound(
        device in prop::sample::select(vec!["eth0", "android"]),
        ops in prop::collection::vec(op(), 0..20),
    ) {
        let runner = FakeProcessRunner::new();
        let mut cfg = BridgeNetworkConfig::new(device, device_config(), Arc::new(runner.clone()))
            .unwrap();
        runner.clear();

        for op in ops {
            match op {
                Op::Enable(ifname) => cfg.enable_inbound(ifname).unwrap(),
                Op::Ready(ready) => cfg.container_ready(ready).unwrap(),
                Op::Disable => cfg.disable_inbound().unwrap(),
            }
        }
        prop_assert!(runner.calls().is_empty());
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host properties sent at worker-update time for placement.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::{Ipv4Addr, Ipv6Addr};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpAddresses {
    pub v4: Vec<String>,
    pub v6: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostProperties {
    #[serde(rename = "hostName")]
    pub host_name: String,
    #[serde(rename = "ipAddresses")]
    pub ip_addresses: IpAddresses,
}

impl HostProperties {
    /// Build host properties from raw per-interface addresses, normalizing
    /// and deduplicating them.
    pub fn from_addresses(
        host_name: impl Into<String>,
        v4_addrs: impl IntoIterator<Item = Ipv4Addr>,
        v6_addrs: impl IntoIterator<Item = (Ipv6Addr, Option<String>)>,
    ) -> Self {
        let mut v4_set: BTreeSet<String> = BTreeSet::new();
        for addr in v4_addrs {
            v4_set.insert(addr.to_string());
        }

        let mut v6_set: BTreeSet<String> = BTreeSet::new();
        for (addr, _zone) in v6_addrs {
            v6_set.insert(normalize_ipv6(addr));
        }

        Self {
            host_name: host_name.into(),
            ip_addresses: IpAddresses {
                v4: v4_set.into_iter().collect(),
                v6: v6_set.into_iter().collect(),
            },
        }
    }
}

/// Normalize an IPv6 address: drop any zone suffix, expand to eight groups
/// of four uppercase hex digits (the canonical "unfolded" form).
fn normalize_ipv6(addr: Ipv6Addr) -> String {
    let segments = addr.segments();
    segments
        .iter()
        .map(|seg| format!("{:04X}", seg))
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v4_addresses_are_deduplicated_across_interfaces() {
        let host = HostProperties::from_addresses(
            "render01",
            [Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 1)],
            [],
        );
        assert_eq!(host.ip_addresses.v4, vec!["10.0.0.1".to_string()]);
    }

    #[test]
    fn ipv6_is_expanded_to_eight_uppercase_groups() {
        let host = HostProperties::from_addresses(
            "render01",
            [],
            [(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1), Some("eth0".to_string()))],
        );
        assert_eq!(
            host.ip_addresses.v6,
            vec!["FE80:0000:0000:0000:0000:0000:0000:0001".to_string()]
        );
    }

    #[test]
    fn zone_suffix_does_not_affect_dedup_identity() {
        let host = HostProperties::from_addresses(
            "render01",
            [],
            [
                (Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1), Some("eth0".to_string())),
                (Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1), Some("eth1".to_string())),
            ],
        );
        assert_eq!(host.ip_addresses.v6.len(), 1);
    }
}

//! Outbound/inbound tag naming.
//!
//! Hop tags are derived from the chain sequence id, the entity id and the hop
//! index, so two chains compiled into one document never collide:
//!
//! ```text
//! profile2 (client-facing)   g-<id>-<idx>
//! profile1                   c-<seq>-<id>-<idx>
//! profile0 (destination)     c-<seq>-<id>-0, or "proxy" for sequence 0
//! ```

use std::collections::HashMap;

pub const PROXY: &str = "proxy";
pub const DIRECT: &str = "direct";
pub const BLOCK: &str = "block";
pub const DNS_OUT: &str = "dns-out";

/// Tags that are always present in a document and never belong to a chain.
pub const RESERVED: [&str; 3] = [DIRECT, BLOCK, DNS_OUT];

pub const SENTINEL_PROXY: i64 = -1;
pub const SENTINEL_DIRECT: i64 = -2;
pub const SENTINEL_BLOCK: i64 = -3;
pub const SENTINEL_DNS_OUT: i64 = -4;

const MAPPING_SUFFIX: &str = "-mapping";

/// Tag of the hop at `index` in a chain of `len` hops.
pub fn hop_tag(chain_seq: u32, entity_id: i64, index: usize, len: usize) -> String {
    if chain_seq == 0 && index == 0 {
        return PROXY.to_string();
    }
    if index + 1 == len {
        return format!("g-{entity_id}-{index}");
    }
    format!("c-{chain_seq}-{entity_id}-{index}")
}

/// Tag of the synthetic redirect inbound that feeds a bridged hop.
pub fn mapping_tag(hop_tag: &str) -> String {
    format!("{hop_tag}{MAPPING_SUFFIX}")
}

/// Hop tag behind a mapping inbound tag.
pub fn mapped_hop(inbound_tag: &str) -> Option<&str> {
    inbound_tag.strip_suffix(MAPPING_SUFFIX)
}

/// Tag of the `n`-th outbound compiled for a routing-rule target.
pub fn route_target_tag(chain_seq: u32, n: usize) -> String {
    if chain_seq == 0 {
        format!("rout-{n}")
    } else {
        format!("rout-{chain_seq}-{n}")
    }
}

pub fn is_reserved(tag: &str) -> bool {
    RESERVED.contains(&tag)
}

/// Sentinel outbound ids mapped to their fixed tags.
pub fn sentinel_map() -> HashMap<i64, String> {
    HashMap::from([
        (SENTINEL_PROXY, PROXY.to_string()),
        (SENTINEL_DIRECT, DIRECT.to_string()),
        (SENTINEL_BLOCK, BLOCK.to_string()),
        (SENTINEL_DNS_OUT, DNS_OUT.to_string()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_chain_destination_is_proxy() {
        assert_eq!(hop_tag(0, 7, 0, 1), "proxy");
        assert_eq!(hop_tag(0, 7, 0, 3), "proxy");
    }

    #[test]
    fn client_facing_hop_is_global() {
        assert_eq!(hop_tag(0, 9, 2, 3), "g-9-2");
        assert_eq!(hop_tag(4, 9, 0, 1), "g-9-0");
    }

    #[test]
    fn inner_hops_carry_the_sequence() {
        assert_eq!(hop_tag(0, 5, 1, 3), "c-0-5-1");
        assert_eq!(hop_tag(3, 5, 0, 3), "c-3-5-0");
    }

    #[test]
    fn sentinels() {
        let m = sentinel_map();
        assert_eq!(m[&SENTINEL_DIRECT], "direct");
        assert_eq!(m[&SENTINEL_DNS_OUT], "dns-out");
        assert_eq!(m.len(), 4);
        assert_eq!(mapping_tag("g-1-0"), "g-1-0-mapping");
        assert_eq!(mapped_hop("g-1-0-mapping"), Some("g-1-0"));
        assert_eq!(mapped_hop("mixed-in"), None);
        assert_eq!(route_target_tag(0, 2), "rout-2");
        assert_eq!(route_target_tag(5, 0), "rout-5-0");
        assert!(is_reserved("dns-out"));
        assert!(!is_reserved("proxy"));
    }
}

//! Routing rules and routing chains.

use crate::tag::{SENTINEL_DIRECT, SENTINEL_DNS_OUT};
use bc_types::RuleSetKind;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

/// One routing rule: a predicate plus the id of the outbound it selects.
///
/// Outbound ids below zero are sentinels (see [`crate::tag::sentinel_map`]).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RouteRule {
    pub name: String,
    /// `4` or `6`; anything else is ignored.
    pub ip_version: String,
    pub network: String,
    pub protocol: String,
    pub inbound: Vec<String>,
    pub domain: Vec<String>,
    pub domain_suffix: Vec<String>,
    pub domain_keyword: Vec<String>,
    pub domain_regex: Vec<String>,
    pub source_ip_cidr: Vec<String>,
    pub source_ip_is_private: bool,
    pub ip_cidr: Vec<String>,
    pub ip_is_private: bool,
    pub source_port: Vec<String>,
    pub source_port_range: Vec<String>,
    pub port: Vec<String>,
    pub port_range: Vec<String>,
    pub process_name: Vec<String>,
    pub process_path: Vec<String>,
    pub process_path_regex: Vec<String>,
    pub rule_set: Vec<String>,
    pub invert: bool,
    pub outbound_id: i64,
}

impl Default for RouteRule {
    fn default() -> Self {
        Self {
            name: String::new(),
            ip_version: String::new(),
            network: String::new(),
            protocol: String::new(),
            inbound: Vec::new(),
            domain: Vec::new(),
            domain_suffix: Vec::new(),
            domain_keyword: Vec::new(),
            domain_regex: Vec::new(),
            source_ip_cidr: Vec::new(),
            source_ip_is_private: false,
            ip_cidr: Vec::new(),
            ip_is_private: false,
            source_port: Vec::new(),
            source_port_range: Vec::new(),
            port: Vec::new(),
            port_range: Vec::new(),
            process_name: Vec::new(),
            process_path: Vec::new(),
            process_path_regex: Vec::new(),
            rule_set: Vec::new(),
            invert: false,
            outbound_id: SENTINEL_DIRECT,
        }
    }
}

impl RouteRule {
    fn string_lists(&self) -> [(&'static str, &Vec<String>); 13] {
        [
            ("inbound", &self.inbound),
            ("domain", &self.domain),
            ("domain_suffix", &self.domain_suffix),
            ("domain_keyword", &self.domain_keyword),
            ("domain_regex", &self.domain_regex),
            ("source_ip_cidr", &self.source_ip_cidr),
            ("ip_cidr", &self.ip_cidr),
            ("source_port_range", &self.source_port_range),
            ("port_range", &self.port_range),
            ("process_name", &self.process_name),
            ("process_path", &self.process_path),
            ("process_path_regex", &self.process_path_regex),
            ("rule_set", &self.rule_set),
        ]
    }

    /// A rule without any predicate matches nothing useful and is never emitted.
    pub fn is_empty(&self) -> bool {
        self.ip_version.is_empty()
            && self.network.is_empty()
            && self.protocol.is_empty()
            && !self.source_ip_is_private
            && !self.ip_is_private
            && self.source_port.is_empty()
            && self.port.is_empty()
            && self.string_lists().iter().all(|(_, v)| v.is_empty())
    }

    /// Render as a sing-box route rule targeting `outbound_tag`.
    pub fn to_json(&self, outbound_tag: &str) -> Value {
        let mut obj = Map::new();
        if let Ok(v) = self.ip_version.trim().parse::<u8>() {
            obj.insert("ip_version".into(), json!(v));
        }
        if !self.network.is_empty() {
            obj.insert("network".into(), json!(self.network));
        }
        if !self.protocol.is_empty() {
            obj.insert("protocol".into(), json!(self.protocol));
        }
        for (key, list) in self.string_lists() {
            if !list.is_empty() {
                obj.insert(key.into(), json!(list));
            }
        }
        for (key, list) in [("source_port", &self.source_port), ("port", &self.port)] {
            let ports = parse_ports(list);
            if !ports.is_empty() {
                obj.insert(key.into(), json!(ports));
            }
        }
        if self.source_ip_is_private {
            obj.insert("source_ip_is_private".into(), json!(true));
        }
        if self.ip_is_private {
            obj.insert("ip_is_private".into(), json!(true));
        }
        if self.invert {
            obj.insert("invert".into(), json!(true));
        }
        obj.insert("outbound".into(), json!(outbound_tag));
        Value::Object(obj)
    }
}

fn parse_ports(list: &[String]) -> Vec<u16> {
    list.iter()
        .filter_map(|p| p.trim().parse::<u16>().ok())
        .collect()
}

/// Id of the built-in Iran bypass chain.
pub const IRAN_CHAIN_ID: i64 = -100;
/// Id of the built-in China bypass chain.
pub const CHINA_CHAIN_ID: i64 = -101;

/// Ordered list of routing rules; the first match wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RoutingChain {
    pub id: i64,
    pub name: String,
    pub rules: Vec<RouteRule>,
}

impl RoutingChain {
    /// Outbound ids referenced by the rules, deduplicated in rule order.
    pub fn used_outbounds(&self) -> Vec<i64> {
        let mut out = Vec::new();
        for r in &self.rules {
            if !out.contains(&r.outbound_id) {
                out.push(r.outbound_id);
            }
        }
        out
    }

    /// Rule-set names referenced by the rules, deduplicated.
    pub fn used_rule_sets(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for name in self.rules.iter().flat_map(|r| r.rule_set.iter()) {
            if !out.contains(name) {
                out.push(name.clone());
            }
        }
        out
    }

    /// Domains that must resolve through the direct resolver.
    ///
    /// Entries are prefixed with their kind (`domain:`, `suffix:`, `keyword:`,
    /// `regex:`, `ruleset:`). IP rule sets carry no domains and are left out.
    pub fn direct_sites(&self) -> Vec<String> {
        let mut out = Vec::new();
        for r in self
            .rules
            .iter()
            .filter(|r| r.outbound_id == SENTINEL_DIRECT && !r.invert)
        {
            out.extend(r.domain.iter().map(|d| format!("domain:{d}")));
            out.extend(r.domain_suffix.iter().map(|d| format!("suffix:{d}")));
            out.extend(r.domain_keyword.iter().map(|d| format!("keyword:{d}")));
            out.extend(r.domain_regex.iter().map(|d| format!("regex:{d}")));
            out.extend(
                r.rule_set
                    .iter()
                    .filter(|s| RuleSetKind::of(s) == RuleSetKind::Site)
                    .map(|s| format!("ruleset:{s}")),
            );
        }
        out
    }

    /// Chain used when the database has none: DNS traffic goes to `dns-out`.
    pub fn preset_default() -> Self {
        Self {
            id: 0,
            name: "Default".into(),
            rules: vec![dns_rule()],
        }
    }

    /// Built-in chain sending Iranian domains and addresses direct.
    pub fn preset_iran() -> Self {
        Self::bypass_preset(IRAN_CHAIN_ID, "Bypass Iran", "ir")
    }

    /// Built-in chain sending Chinese domains and addresses direct.
    pub fn preset_china() -> Self {
        Self::bypass_preset(CHINA_CHAIN_ID, "Bypass China", "cn")
    }

    fn bypass_preset(id: i64, name: &str, region: &str) -> Self {
        let direct = |name: String| RouteRule {
            name,
            outbound_id: SENTINEL_DIRECT,
            ..Default::default()
        };
        Self {
            id,
            name: name.into(),
            rules: vec![
                dns_rule(),
                RouteRule {
                    ip_is_private: true,
                    ..direct("Private addresses".into())
                },
                RouteRule {
                    rule_set: vec![format!("geosite-{region}")],
                    ..direct(format!("Domains of {region}"))
                },
                RouteRule {
                    rule_set: vec![format!("geoip-{region}_IP")],
                    ..direct(format!("Addresses of {region}"))
                },
            ],
        }
    }

    /// Look up a built-in chain by id.
    pub fn preset(id: i64) -> Option<Self> {
        match id {
            IRAN_CHAIN_ID => Some(Self::preset_iran()),
            CHINA_CHAIN_ID => Some(Self::preset_china()),
            _ => None,
        }
    }

    /// Built-in chains are shipped with the compiler and cannot be edited.
    pub fn is_view_only(&self) -> bool {
        self.id == IRAN_CHAIN_ID || self.id == CHINA_CHAIN_ID
    }

    /// Compile the rules against an id → tag map.
    ///
    /// Empty rules and rules whose target has no tag are dropped.
    pub fn route_rules(&self, outbound_map: &HashMap<i64, String>) -> Vec<Value> {
        let mut out = Vec::with_capacity(self.rules.len());
        for r in &self.rules {
            if r.is_empty() {
                continue;
            }
            match outbound_map.get(&r.outbound_id) {
                Some(tag) => out.push(r.to_json(tag)),
                None => {
                    tracing::debug!(
                        chain = %self.name,
                        rule = %r.name,
                        outbound_id = r.outbound_id,
                        "routing rule target not compiled, rule dropped"
                    );
                }
            }
        }
        out
    }
}

fn dns_rule() -> RouteRule {
    RouteRule {
        name: "Route DNS".into(),
        protocol: "dns".into(),
        outbound_id: SENTINEL_DNS_OUT,
        ..Default::default()
    }
}

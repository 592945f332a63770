//! DNS section builder.

use crate::merge::override_tree;
use crate::settings::BuildSettings;
use crate::tag::DIRECT;
use serde_json::{json, Map, Value};

pub const DNS_REMOTE: &str = "dns-remote";
pub const DNS_DIRECT: &str = "dns-direct";
pub const DNS_BLOCK: &str = "dns-block";
pub const DNS_FAKE: &str = "dns-fake";
pub const DNS_LOCAL: &str = "dns-local";

/// Domains resolved by the direct resolver, split by match kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectSites {
    pub rule_set: Vec<String>,
    pub domain: Vec<String>,
    pub domain_suffix: Vec<String>,
    pub domain_keyword: Vec<String>,
    pub domain_regex: Vec<String>,
}

impl DirectSites {
    /// Classify server names plus prefixed routing-chain sites.
    ///
    /// Server names are plain domains; sites carry a `domain:`, `suffix:`,
    /// `keyword:`, `regex:` or `ruleset:` prefix. Unknown prefixes are ignored.
    pub fn classify(server_domains: &[String], sites: &[String]) -> Self {
        let mut out = DirectSites {
            domain: server_domains.to_vec(),
            ..Default::default()
        };
        for site in sites {
            if let Some(v) = site.strip_prefix("ruleset:") {
                out.rule_set.push(v.to_string());
            } else if let Some(v) = site.strip_prefix("domain:") {
                out.domain.push(v.to_string());
            } else if let Some(v) = site.strip_prefix("suffix:") {
                out.domain_suffix.push(v.to_string());
            } else if let Some(v) = site.strip_prefix("keyword:") {
                out.domain_keyword.push(v.to_string());
            } else if let Some(v) = site.strip_prefix("regex:") {
                out.domain_regex.push(v.to_string());
            } else {
                tracing::debug!(site = %site, "unclassified direct site ignored");
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.rule_set.is_empty()
            && self.domain.is_empty()
            && self.domain_suffix.is_empty()
            && self.domain_keyword.is_empty()
            && self.domain_regex.is_empty()
    }

    /// DNS rule sending these sites to the direct resolver.
    pub fn to_rule(&self) -> Value {
        let mut rule = Map::new();
        for (key, list) in [
            ("rule_set", &self.rule_set),
            ("domain", &self.domain),
            ("domain_suffix", &self.domain_suffix),
            ("domain_keyword", &self.domain_keyword),
            ("domain_regex", &self.domain_regex),
        ] {
            if !list.is_empty() {
                rule.insert(key.into(), json!(list));
            }
        }
        rule.insert("server".into(), json!(DNS_DIRECT));
        Value::Object(rule)
    }
}

fn server(tag: &str, address: &str, strategy: &str, detour: &str) -> Value {
    let mut s = Map::new();
    s.insert("tag".into(), json!(tag));
    s.insert("address".into(), json!(address));
    s.insert("address_resolver".into(), json!(DNS_LOCAL));
    if !strategy.is_empty() {
        s.insert("strategy".into(), json!(strategy));
    }
    s.insert("detour".into(), json!(detour));
    Value::Object(s)
}

/// Build the `dns` section.
///
/// `entry_tag` is the outbound the remote resolver is reached through. A
/// user DNS object, when enabled, replaces the generated section entirely.
pub fn build_dns(settings: &BuildSettings, entry_tag: &str, direct: &DirectSites) -> Value {
    let routing = &settings.routing;
    if routing.use_dns_object {
        return override_tree(&routing.dns_object);
    }

    let mut servers = Vec::new();
    let mut rules = Vec::new();
    let mut dns = Map::new();

    servers.push(server(
        DNS_REMOTE,
        &routing.remote_dns,
        &routing.remote_dns_strategy,
        entry_tag,
    ));

    let direct_address = if routing.direct_dns == "localhost" {
        "local"
    } else {
        routing.direct_dns.as_str()
    };
    let direct_server = server(
        DNS_DIRECT,
        direct_address,
        &routing.direct_dns_strategy,
        DIRECT,
    );
    if routing.dns_final_out == DIRECT {
        servers.insert(0, direct_server);
    } else {
        servers.push(direct_server);
    }

    servers.push(json!({ "tag": DNS_BLOCK, "address": "rcode://success" }));

    if settings.vpn.fake_dns {
        servers.push(json!({ "tag": DNS_FAKE, "address": "fakeip" }));
        dns.insert(
            "fakeip".into(),
            json!({
                "enabled": true,
                "inet4_range": "198.18.0.0/15",
                "inet6_range": "fc00::/18",
            }),
        );
        rules.push(json!({ "outbound": "any", "server": DNS_LOCAL }));
        rules.push(json!({ "query_type": ["A", "AAAA"], "server": DNS_FAKE }));
        dns.insert("independent_cache".into(), json!(true));
    }

    if !direct.is_empty() {
        rules.push(direct.to_rule());
    }

    servers.push(json!({ "tag": DNS_LOCAL, "address": "local", "detour": DIRECT }));

    dns.insert("servers".into(), Value::Array(servers));
    dns.insert("rules".into(), Value::Array(rules));
    Value::Object(dns)
}

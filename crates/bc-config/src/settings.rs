//! Immutable build settings.
//!
//! Everything the compiler needs to know about the user's global preferences
//! (inbound listener, DNS, multiplexing, VPN, clash API) lives here and is
//! passed into every compile call. Defaults mirror a fresh installation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BuildSettings {
    /// sing-box log level.
    pub log_level: String,
    /// Listen address of the local mixed (HTTP+SOCKS) inbound.
    pub inbound_address: String,
    /// Port of the mixed inbound; invalid ports disable it.
    pub inbound_socks_port: i64,
    /// Extra inbounds appended verbatim (`{"inbounds": [...]}` document).
    pub custom_inbound: serde_json::Value,
    /// Outbound launcher paths keyed by custom core name.
    pub extra_cores: BTreeMap<String, String>,
    /// Whether the process may use privileged features (system WireGuard interface).
    pub elevated: bool,
    /// Skip certificate verification for every TLS outbound.
    pub skip_cert: bool,
    /// uTLS fingerprint used when a profile does not name one.
    pub utls_fingerprint: String,
    pub routing: RoutingSettings,
    pub mux: MuxSettings,
    pub vpn: VpnSettings,
    pub ntp: NtpSettings,
    pub clash_api: ClashApiSettings,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            log_level: "warning".to_string(),
            inbound_address: "127.0.0.1".to_string(),
            inbound_socks_port: 2080,
            custom_inbound: serde_json::json!({"inbounds": []}),
            extra_cores: BTreeMap::new(),
            elevated: false,
            skip_cert: false,
            utls_fingerprint: String::new(),
            routing: RoutingSettings::default(),
            mux: MuxSettings::default(),
            vpn: VpnSettings::default(),
            ntp: NtpSettings::default(),
            clash_api: ClashApiSettings::default(),
        }
    }
}

/// Sniffing behaviour of local inbounds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SniffingMode {
    Disable,
    /// Sniff for routing decisions only.
    #[default]
    ForRouting,
    /// Sniff and override the destination.
    ForDestination,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RoutingSettings {
    /// Id of the active routing chain.
    pub current_route_id: i64,
    /// `route.final` outbound tag.
    pub def_outbound: String,
    pub remote_dns: String,
    pub remote_dns_strategy: String,
    pub direct_dns: String,
    pub direct_dns_strategy: String,
    /// Replace the generated DNS section with `dns_object`.
    pub use_dns_object: bool,
    pub dns_object: serde_json::Value,
    /// Which resolver goes first: `direct` puts the direct resolver in front.
    pub dns_final_out: String,
    pub domain_strategy: String,
    pub outbound_domain_strategy: String,
    pub sniffing_mode: SniffingMode,
    /// Directory holding compiled `.srs` rule sets.
    pub rule_sets_dir: String,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            current_route_id: 0,
            def_outbound: "proxy".to_string(),
            remote_dns: "8.8.8.8".to_string(),
            remote_dns_strategy: String::new(),
            direct_dns: "localhost".to_string(),
            direct_dns_strategy: String::new(),
            use_dns_object: false,
            dns_object: serde_json::Value::Null,
            dns_final_out: "proxy".to_string(),
            domain_strategy: "AsIs".to_string(),
            outbound_domain_strategy: "AsIs".to_string(),
            sniffing_mode: SniffingMode::ForRouting,
            rule_sets_dir: "rule_sets".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MuxSettings {
    pub protocol: String,
    pub padding: bool,
    /// Max streams per connection; zero or less disables multiplexing globally.
    pub concurrency: i64,
    /// Multiplex hops that do not say otherwise.
    pub default_on: bool,
}

impl Default for MuxSettings {
    fn default() -> Self {
        Self {
            protocol: String::new(),
            padding: false,
            concurrency: 8,
            default_on: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VpnSettings {
    /// Route everything through a TUN inbound.
    pub enabled: bool,
    pub fake_dns: bool,
    pub gso: bool,
    pub auto_redirect: bool,
    /// TUN stack implementation (`system`, `gvisor`, `mixed`).
    pub stack: String,
    pub mtu: u32,
    pub ipv6: bool,
    pub strict_route: bool,
    /// Interface name; empty picks a platform default.
    pub interface_name: String,
}

impl Default for VpnSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            fake_dns: false,
            gso: false,
            auto_redirect: false,
            stack: "mixed".to_string(),
            mtu: 9000,
            ipv6: false,
            strict_route: false,
            interface_name: String::new(),
        }
    }
}

impl VpnSettings {
    pub fn tun_name(&self) -> &str {
        if !self.interface_name.is_empty() {
            return &self.interface_name;
        }
        if cfg!(target_os = "macos") {
            "utun9"
        } else {
            "boxchain-tun"
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NtpSettings {
    pub enabled: bool,
    pub server: String,
    pub server_port: u16,
    pub interval: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClashApiSettings {
    /// Controller port; zero or negative disables the API.
    pub port: i64,
    pub listen: String,
    pub secret: String,
}

impl Default for ClashApiSettings {
    fn default() -> Self {
        Self {
            port: -9090,
            listen: "127.0.0.1".to_string(),
            secret: String::new(),
        }
    }
}

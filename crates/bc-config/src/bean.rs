//! Protocol parameter bundles ("beans").
//!
//! A bean is the protocol-specific part of a profile. The set of protocols is
//! closed; each variant answers the same capability questions:
//!
//! - [`Bean::is_valid`]: enough parameters to build anything at all;
//! - [`Bean::build_native_outbound`]: the sing-box outbound object;
//! - [`Bean::needs_bridging`]: whether the hop needs an external helper;
//! - [`Bean::build_bridge_descriptor`]: how to launch that helper.
//!
//! Field naming follows sing-box where a field maps 1:1 onto the output.

use crate::settings::BuildSettings;
use bc_types::BuildError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::net::IpAddr;

/// Custom core whose config is a single outbound object.
pub const CORE_INTERNAL: &str = "internal";
/// Custom core whose config is a complete document.
pub const CORE_INTERNAL_FULL: &str = "internal-full";

const SHADOWSOCKS_METHODS: &[&str] = &[
    "none",
    "2022-blake3-aes-128-gcm",
    "2022-blake3-aes-256-gcm",
    "2022-blake3-chacha20-poly1305",
    "aes-128-gcm",
    "aes-192-gcm",
    "aes-256-gcm",
    "chacha20-ietf-poly1305",
    "xchacha20-ietf-poly1305",
    "aes-128-ctr",
    "aes-192-ctr",
    "aes-256-ctr",
    "aes-128-cfb",
    "aes-192-cfb",
    "aes-256-cfb",
    "rc4-md5",
    "chacha20-ietf",
    "xchacha20",
];

const VLESS_FLOWS: &[&str] = &["", "xtls-rprx-vision"];
const TUIC_CONGESTION: &[&str] = &["cubic", "new_reno", "bbr"];
const TUIC_UDP_RELAY: &[&str] = &["native", "quic"];

/// How a hop is realized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bridging {
    /// Built directly into the core's outbound list.
    Native,
    /// External helper reached through a local redirect inbound plus a SOCKS pickup.
    Mapping,
    /// External helper that dials the real server itself.
    Full,
    /// Cannot be realized in this position.
    Unsupported,
}

impl Bridging {
    /// Numeric bridging code: 0 native, 1 mapping, 2 full, negative unsupported.
    pub fn code(self) -> i32 {
        match self {
            Self::Native => 0,
            Self::Mapping => 1,
            Self::Full => 2,
            Self::Unsupported => -1,
        }
    }

    pub fn is_bridged(self) -> bool {
        matches!(self, Self::Mapping | Self::Full)
    }
}

/// Launch contract for an external helper process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalDescriptor {
    /// Display type of the bridged protocol.
    pub tag: String,
    /// Tag of the outbound this process serves; set when the hop is compiled.
    #[serde(default)]
    pub outbound: String,
    pub program: String,
    pub arguments: Vec<String>,
    /// `KEY=VALUE` entries.
    pub env: Vec<String>,
    /// Config text the launcher writes to disk and substitutes for `%config%`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
}

/// V2Ray-style transport and security settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StreamSettings {
    /// `tcp`, `ws`, `http`, `grpc`, `quic` or `httpupgrade`.
    pub network: String,
    /// empty/`none`, `tls` or `reality`.
    pub security: String,
    pub sni: String,
    /// Comma separated ALPN list.
    pub alpn: String,
    /// ws/http/httpupgrade path, grpc service name.
    pub path: String,
    pub host: String,
    pub allow_insecure: bool,
    pub utls_fingerprint: String,
    pub reality_public_key: String,
    pub reality_short_id: String,
    pub packet_encoding: String,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            network: "tcp".to_string(),
            security: String::new(),
            sni: String::new(),
            alpn: String::new(),
            path: String::new(),
            host: String::new(),
            allow_insecure: false,
            utls_fingerprint: String::new(),
            reality_public_key: String::new(),
            reality_short_id: String::new(),
            packet_encoding: String::new(),
        }
    }
}

impl StreamSettings {
    pub fn is_tls(&self) -> bool {
        matches!(self.security.as_str(), "tls" | "reality")
    }

    fn transport(&self) -> Option<Value> {
        let mut t = Map::new();
        match self.network.as_str() {
            "ws" => {
                t.insert("type".into(), json!("ws"));
                if !self.path.is_empty() {
                    t.insert("path".into(), json!(self.path));
                }
                if !self.host.is_empty() {
                    t.insert("headers".into(), json!({ "Host": self.host }));
                }
            }
            "http" => {
                t.insert("type".into(), json!("http"));
                if !self.path.is_empty() {
                    t.insert("path".into(), json!(self.path));
                }
                if !self.host.is_empty() {
                    t.insert("host".into(), json!(split_list(&self.host)));
                }
            }
            "httpupgrade" => {
                t.insert("type".into(), json!("httpupgrade"));
                if !self.path.is_empty() {
                    t.insert("path".into(), json!(self.path));
                }
                if !self.host.is_empty() {
                    t.insert("host".into(), json!(self.host));
                }
            }
            "grpc" => {
                t.insert("type".into(), json!("grpc"));
                t.insert("service_name".into(), json!(self.path));
            }
            "quic" => {
                t.insert("type".into(), json!("quic"));
            }
            _ => return None,
        }
        Some(Value::Object(t))
    }

    fn tls(&self, settings: &BuildSettings) -> Option<Value> {
        if !self.is_tls() {
            return None;
        }
        let mut tls = Map::new();
        tls.insert("enabled".into(), json!(true));
        if !self.sni.is_empty() {
            tls.insert("server_name".into(), json!(self.sni));
        }
        if self.allow_insecure || settings.skip_cert {
            tls.insert("insecure".into(), json!(true));
        }
        if !self.alpn.is_empty() {
            tls.insert("alpn".into(), json!(split_list(&self.alpn)));
        }
        let mut fingerprint = if self.utls_fingerprint.is_empty() {
            settings.utls_fingerprint.clone()
        } else {
            self.utls_fingerprint.clone()
        };
        if self.security == "reality" {
            // reality handshakes need a uTLS client hello
            if fingerprint.is_empty() {
                fingerprint = "chrome".to_string();
            }
            tls.insert(
                "reality".into(),
                json!({
                    "enabled": true,
                    "public_key": self.reality_public_key,
                    "short_id": self.reality_short_id,
                }),
            );
        }
        if !fingerprint.is_empty() {
            tls.insert(
                "utls".into(),
                json!({ "enabled": true, "fingerprint": fingerprint }),
            );
        }
        Some(Value::Object(tls))
    }

    fn apply(&self, outbound: &mut Map<String, Value>, settings: &BuildSettings) {
        if let Some(t) = self.transport() {
            outbound.insert("transport".into(), t);
        }
        if let Some(tls) = self.tls(settings) {
            outbound.insert("tls".into(), tls);
        }
        if !self.packet_encoding.is_empty() {
            outbound.insert("packet_encoding".into(), json!(self.packet_encoding));
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SocksBean {
    pub server: String,
    pub server_port: u16,
    /// 4, 4a (as 40) or 5.
    pub version: u8,
    pub username: String,
    pub password: String,
}

impl Default for SocksBean {
    fn default() -> Self {
        Self {
            server: String::new(),
            server_port: 0,
            version: 5,
            username: String::new(),
            password: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HttpBean {
    pub server: String,
    pub server_port: u16,
    pub username: String,
    pub password: String,
    pub stream: StreamSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ShadowsocksBean {
    pub server: String,
    pub server_port: u16,
    pub method: String,
    pub password: String,
    /// SIP003 plugin, `name;opts`.
    pub plugin: String,
    pub udp_over_tcp: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VmessBean {
    pub server: String,
    pub server_port: u16,
    pub uuid: String,
    pub alter_id: u32,
    pub security: String,
    pub stream: StreamSettings,
}

impl Default for VmessBean {
    fn default() -> Self {
        Self {
            server: String::new(),
            server_port: 0,
            uuid: String::new(),
            alter_id: 0,
            security: "auto".to_string(),
            stream: StreamSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VlessBean {
    pub server: String,
    pub server_port: u16,
    pub uuid: String,
    pub flow: String,
    pub stream: StreamSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TrojanBean {
    pub server: String,
    pub server_port: u16,
    pub password: String,
    pub stream: StreamSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Hysteria2Bean {
    pub server: String,
    pub server_port: u16,
    pub password: String,
    pub up_mbps: u32,
    pub down_mbps: u32,
    pub obfs_password: String,
    pub sni: String,
    pub alpn: String,
    pub allow_insecure: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TuicBean {
    pub server: String,
    pub server_port: u16,
    pub uuid: String,
    pub password: String,
    pub congestion_control: String,
    pub udp_relay_mode: String,
    pub zero_rtt: bool,
    pub heartbeat: String,
    pub sni: String,
    pub alpn: String,
    pub allow_insecure: bool,
}

impl Default for TuicBean {
    fn default() -> Self {
        Self {
            server: String::new(),
            server_port: 0,
            uuid: String::new(),
            password: String::new(),
            congestion_control: "bbr".to_string(),
            udp_relay_mode: "native".to_string(),
            zero_rtt: false,
            heartbeat: "10s".to_string(),
            sni: String::new(),
            alpn: String::new(),
            allow_insecure: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WireguardBean {
    pub server: String,
    pub server_port: u16,
    pub private_key: String,
    pub peer_public_key: String,
    pub pre_shared_key: String,
    pub local_address: Vec<String>,
    pub reserved: Vec<u8>,
    pub mtu: u32,
    /// Use a kernel interface instead of the userspace stack; needs privileges.
    pub system_interface: bool,
}

impl Default for WireguardBean {
    fn default() -> Self {
        Self {
            server: String::new(),
            server_port: 0,
            private_key: String::new(),
            peer_public_key: String::new(),
            pre_shared_key: String::new(),
            local_address: Vec::new(),
            reserved: Vec::new(),
            mtu: 1420,
            system_interface: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SshBean {
    pub server: String,
    pub server_port: u16,
    pub user: String,
    pub password: String,
    pub private_key: String,
    pub host_key: Vec<String>,
}

/// Profile backed by a user-supplied config or an external core.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CustomBean {
    /// [`CORE_INTERNAL`], [`CORE_INTERNAL_FULL`] or the name of an external core.
    pub core: String,
    pub server: String,
    pub server_port: u16,
    /// Object or text; an outbound for `internal`, a document for `internal-full`,
    /// a config file for external cores.
    pub config: Value,
    /// External command line template.
    pub command: Vec<String>,
    pub env: Vec<String>,
    /// Fixed bridge ports; invalid values request fresh ones.
    pub mapping_port: i64,
    pub socks_port: i64,
}

impl CustomBean {
    pub fn is_internal(&self) -> bool {
        self.core == CORE_INTERNAL || self.core == CORE_INTERNAL_FULL
    }

    pub fn is_internal_full(&self) -> bool {
        self.core == CORE_INTERNAL_FULL
    }

    /// The config as a JSON object, parsing text when needed.
    pub fn config_object(&self) -> Option<Map<String, Value>> {
        match &self.config {
            Value::Object(m) => Some(m.clone()),
            Value::String(text) => match serde_json::from_str::<Value>(text) {
                Ok(Value::Object(m)) => Some(m),
                _ => None,
            },
            _ => None,
        }
    }

    fn config_text(&self) -> String {
        match &self.config {
            Value::Null => String::new(),
            Value::String(text) => text.clone(),
            other => serde_json::to_string_pretty(other).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChainBean {
    /// Member ids, innermost (closest to the local client) first.
    pub list: Vec<i64>,
}

/// Protocol bundle of a profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Bean {
    Socks(SocksBean),
    Http(HttpBean),
    Shadowsocks(ShadowsocksBean),
    Vmess(VmessBean),
    Vless(VlessBean),
    Trojan(TrojanBean),
    Hysteria2(Hysteria2Bean),
    Tuic(TuicBean),
    Wireguard(WireguardBean),
    Ssh(SshBean),
    Custom(CustomBean),
    Chain(ChainBean),
}

impl Bean {
    /// Lowercase protocol name.
    pub fn type_name(&self) -> &'static str {
        match self {
            Bean::Socks(_) => "socks",
            Bean::Http(_) => "http",
            Bean::Shadowsocks(_) => "shadowsocks",
            Bean::Vmess(_) => "vmess",
            Bean::Vless(_) => "vless",
            Bean::Trojan(_) => "trojan",
            Bean::Hysteria2(_) => "hysteria2",
            Bean::Tuic(_) => "tuic",
            Bean::Wireguard(_) => "wireguard",
            Bean::Ssh(_) => "ssh",
            Bean::Custom(_) => "custom",
            Bean::Chain(_) => "chain",
        }
    }

    pub fn display_type(&self) -> String {
        match self {
            Bean::Socks(_) => "Socks".into(),
            Bean::Http(_) => "HTTP".into(),
            Bean::Shadowsocks(_) => "Shadowsocks".into(),
            Bean::Vmess(_) => "VMess".into(),
            Bean::Vless(_) => "VLESS".into(),
            Bean::Trojan(_) => "Trojan".into(),
            Bean::Hysteria2(_) => "Hysteria2".into(),
            Bean::Tuic(_) => "TUIC".into(),
            Bean::Wireguard(_) => "WireGuard".into(),
            Bean::Ssh(_) => "SSH".into(),
            Bean::Custom(c) => c.core.clone(),
            Bean::Chain(_) => "Chain".into(),
        }
    }

    pub fn server_address(&self) -> &str {
        match self {
            Bean::Socks(b) => &b.server,
            Bean::Http(b) => &b.server,
            Bean::Shadowsocks(b) => &b.server,
            Bean::Vmess(b) => &b.server,
            Bean::Vless(b) => &b.server,
            Bean::Trojan(b) => &b.server,
            Bean::Hysteria2(b) => &b.server,
            Bean::Tuic(b) => &b.server,
            Bean::Wireguard(b) => &b.server,
            Bean::Ssh(b) => &b.server,
            Bean::Custom(b) => &b.server,
            Bean::Chain(_) => "",
        }
    }

    pub fn server_port(&self) -> u16 {
        match self {
            Bean::Socks(b) => b.server_port,
            Bean::Http(b) => b.server_port,
            Bean::Shadowsocks(b) => b.server_port,
            Bean::Vmess(b) => b.server_port,
            Bean::Vless(b) => b.server_port,
            Bean::Trojan(b) => b.server_port,
            Bean::Hysteria2(b) => b.server_port,
            Bean::Tuic(b) => b.server_port,
            Bean::Wireguard(b) => b.server_port,
            Bean::Ssh(b) => b.server_port,
            Bean::Custom(b) => b.server_port,
            Bean::Chain(_) => 0,
        }
    }

    /// Address the core will resolve before dialing this hop.
    ///
    /// `internal` custom outbounds name their server inside the config.
    pub fn dial_address(&self) -> String {
        if let Bean::Custom(c) = self {
            if c.core == CORE_INTERNAL {
                if let Some(server) = c
                    .config_object()
                    .and_then(|m| m.get("server").and_then(Value::as_str).map(str::to_owned))
                    .filter(|s| !s.is_empty())
                {
                    return server;
                }
            }
        }
        self.server_address().to_string()
    }

    /// V2Ray-style stream settings, when the protocol has them.
    pub fn stream(&self) -> Option<&StreamSettings> {
        match self {
            Bean::Http(b) => Some(&b.stream),
            Bean::Vmess(b) => Some(&b.stream),
            Bean::Vless(b) => Some(&b.stream),
            Bean::Trojan(b) => Some(&b.stream),
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        let endpoint = |server: &str, port: u16| !server.trim().is_empty() && port > 0;
        match self {
            Bean::Socks(b) => endpoint(&b.server, b.server_port),
            Bean::Http(b) => endpoint(&b.server, b.server_port),
            Bean::Shadowsocks(b) => {
                endpoint(&b.server, b.server_port) && !b.method.is_empty()
            }
            Bean::Vmess(b) => endpoint(&b.server, b.server_port) && !b.uuid.is_empty(),
            Bean::Vless(b) => endpoint(&b.server, b.server_port) && !b.uuid.is_empty(),
            Bean::Trojan(b) => endpoint(&b.server, b.server_port) && !b.password.is_empty(),
            Bean::Hysteria2(b) => endpoint(&b.server, b.server_port),
            Bean::Tuic(b) => endpoint(&b.server, b.server_port) && !b.uuid.is_empty(),
            Bean::Wireguard(b) => {
                endpoint(&b.server, b.server_port)
                    && !b.private_key.is_empty()
                    && !b.peer_public_key.is_empty()
            }
            Bean::Ssh(b) => endpoint(&b.server, b.server_port) && !b.user.is_empty(),
            Bean::Custom(b) => {
                if b.is_internal() {
                    b.config_object().is_some()
                } else {
                    !b.core.is_empty()
                }
            }
            Bean::Chain(b) => !b.list.is_empty(),
        }
    }

    /// Build the sing-box outbound object.
    ///
    /// An empty map means the protocol has no native outbound; a
    /// [`BuildError::Rejected`] carries the bundle's own complaint.
    pub fn build_native_outbound(
        &self,
        settings: &BuildSettings,
    ) -> Result<Map<String, Value>, BuildError> {
        let mut ob = Map::new();
        let mut head = |ty: &str, server: &str, port: u16| {
            ob.insert("type".into(), json!(ty));
            ob.insert("server".into(), json!(server));
            ob.insert("server_port".into(), json!(port));
        };
        match self {
            Bean::Socks(b) => {
                head("socks", &b.server, b.server_port);
                let version = match b.version {
                    4 => "4",
                    40 => "4a",
                    _ => "5",
                };
                ob.insert("version".into(), json!(version));
                insert_nonempty(&mut ob, "username", &b.username);
                insert_nonempty(&mut ob, "password", &b.password);
            }
            Bean::Http(b) => {
                head("http", &b.server, b.server_port);
                insert_nonempty(&mut ob, "username", &b.username);
                insert_nonempty(&mut ob, "password", &b.password);
                if let Some(tls) = b.stream.tls(settings) {
                    ob.insert("tls".into(), tls);
                }
            }
            Bean::Shadowsocks(b) => {
                if !SHADOWSOCKS_METHODS.contains(&b.method.as_str()) {
                    return Err(BuildError::rejected(format!(
                        "unsupported shadowsocks method: {}",
                        b.method
                    )));
                }
                head("shadowsocks", &b.server, b.server_port);
                ob.insert("method".into(), json!(b.method));
                ob.insert("password".into(), json!(b.password));
                if !b.plugin.trim().is_empty() {
                    let (plugin, opts) = b.plugin.split_once(';').unwrap_or((&b.plugin, ""));
                    ob.insert("plugin".into(), json!(plugin.trim()));
                    insert_nonempty(&mut ob, "plugin_opts", opts.trim());
                }
                if b.udp_over_tcp {
                    ob.insert("udp_over_tcp".into(), json!(true));
                }
            }
            Bean::Vmess(b) => {
                head("vmess", &b.server, b.server_port);
                ob.insert("uuid".into(), json!(b.uuid));
                ob.insert("alter_id".into(), json!(b.alter_id));
                let security = if b.security.is_empty() { "auto" } else { &b.security };
                ob.insert("security".into(), json!(security));
                b.stream.apply(&mut ob, settings);
            }
            Bean::Vless(b) => {
                if !VLESS_FLOWS.contains(&b.flow.as_str()) {
                    return Err(BuildError::rejected(format!(
                        "unsupported vless flow: {}",
                        b.flow
                    )));
                }
                head("vless", &b.server, b.server_port);
                ob.insert("uuid".into(), json!(b.uuid));
                ob.insert("flow".into(), json!(b.flow));
                b.stream.apply(&mut ob, settings);
            }
            Bean::Trojan(b) => {
                head("trojan", &b.server, b.server_port);
                ob.insert("password".into(), json!(b.password));
                b.stream.apply(&mut ob, settings);
            }
            Bean::Hysteria2(b) => {
                head("hysteria2", &b.server, b.server_port);
                ob.insert("password".into(), json!(b.password));
                if b.up_mbps > 0 {
                    ob.insert("up_mbps".into(), json!(b.up_mbps));
                }
                if b.down_mbps > 0 {
                    ob.insert("down_mbps".into(), json!(b.down_mbps));
                }
                if !b.obfs_password.is_empty() {
                    ob.insert(
                        "obfs".into(),
                        json!({ "type": "salamander", "password": b.obfs_password }),
                    );
                }
                ob.insert(
                    "tls".into(),
                    quic_tls(&b.sni, &b.alpn, b.allow_insecure || settings.skip_cert),
                );
            }
            Bean::Tuic(b) => {
                if !TUIC_CONGESTION.contains(&b.congestion_control.as_str()) {
                    return Err(BuildError::rejected(format!(
                        "unsupported tuic congestion control: {}",
                        b.congestion_control
                    )));
                }
                if !TUIC_UDP_RELAY.contains(&b.udp_relay_mode.as_str()) {
                    return Err(BuildError::rejected(format!(
                        "unsupported tuic udp relay mode: {}",
                        b.udp_relay_mode
                    )));
                }
                head("tuic", &b.server, b.server_port);
                ob.insert("uuid".into(), json!(b.uuid));
                insert_nonempty(&mut ob, "password", &b.password);
                ob.insert("congestion_control".into(), json!(b.congestion_control));
                ob.insert("udp_relay_mode".into(), json!(b.udp_relay_mode));
                if b.zero_rtt {
                    ob.insert("zero_rtt_handshake".into(), json!(true));
                }
                insert_nonempty(&mut ob, "heartbeat", &b.heartbeat);
                ob.insert(
                    "tls".into(),
                    quic_tls(&b.sni, &b.alpn, b.allow_insecure || settings.skip_cert),
                );
            }
            Bean::Wireguard(b) => {
                head("wireguard", &b.server, b.server_port);
                ob.insert("local_address".into(), json!(b.local_address));
                ob.insert("private_key".into(), json!(b.private_key));
                ob.insert("peer_public_key".into(), json!(b.peer_public_key));
                insert_nonempty(&mut ob, "pre_shared_key", &b.pre_shared_key);
                if !b.reserved.is_empty() {
                    ob.insert("reserved".into(), json!(b.reserved));
                }
                ob.insert("mtu".into(), json!(b.mtu));
                if b.system_interface {
                    ob.insert("system_interface".into(), json!(true));
                }
            }
            Bean::Ssh(b) => {
                head("ssh", &b.server, b.server_port);
                ob.insert("user".into(), json!(b.user));
                insert_nonempty(&mut ob, "password", &b.password);
                insert_nonempty(&mut ob, "private_key", &b.private_key);
                if !b.host_key.is_empty() {
                    ob.insert("host_key".into(), json!(b.host_key));
                }
            }
            Bean::Custom(b) => {
                if b.core == CORE_INTERNAL {
                    if let Some(m) = b.config_object() {
                        ob = m;
                    }
                }
            }
            Bean::Chain(_) => {}
        }
        Ok(ob)
    }

    /// Decide how this hop must be realized.
    ///
    /// `is_entry` marks the client-facing hop of its chain.
    pub fn needs_bridging(&self, is_entry: bool, settings: &BuildSettings) -> Bridging {
        match self {
            Bean::Custom(c) if !c.is_internal() => {
                if is_entry && !settings.vpn.enabled {
                    Bridging::Full
                } else if c.server.trim().is_empty() {
                    // nothing to point the redirect inbound at
                    Bridging::Unsupported
                } else {
                    Bridging::Mapping
                }
            }
            Bean::Chain(_) => Bridging::Unsupported,
            _ => Bridging::Native,
        }
    }

    /// Describe the external helper for a bridged hop.
    ///
    /// In [`Bridging::Mapping`] mode the helper dials the local redirect
    /// inbound instead of the real server.
    pub fn build_bridge_descriptor(
        &self,
        mapping_port: u16,
        socks_port: u16,
        mode: Bridging,
        settings: &BuildSettings,
    ) -> Result<ExternalDescriptor, BuildError> {
        let Bean::Custom(c) = self else {
            return Err(BuildError::capability(format!(
                "{} cannot be bridged",
                self.display_type()
            )));
        };
        let program = settings
            .extra_cores
            .get(&c.core)
            .map(|p| p.trim().to_string())
            .unwrap_or_default();
        if program.is_empty() {
            return Err(BuildError::resource(format!("Core not found: {}", c.core)));
        }
        if c.command.is_empty() {
            return Err(BuildError::rejected(format!(
                "custom core {} has an empty command line",
                c.core
            )));
        }
        let (addr, port) = match mode {
            Bridging::Mapping => ("127.0.0.1".to_string(), mapping_port),
            _ => (c.server.clone(), c.server_port),
        };
        let vars = [
            ("%mapping_port%", mapping_port.to_string()),
            ("%socks_port%", socks_port.to_string()),
            ("%server_addr%", addr),
            ("%server_port%", port.to_string()),
        ];
        let config = c.config_text();
        Ok(ExternalDescriptor {
            tag: self.display_type(),
            outbound: String::new(),
            program,
            arguments: c.command.iter().map(|a| substitute(a, &vars)).collect(),
            env: c.env.clone(),
            config: (!config.is_empty()).then(|| substitute(&config, &vars)),
        })
    }
}

pub fn is_ip_address(s: &str) -> bool {
    s.trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .is_ok()
}

fn quic_tls(sni: &str, alpn: &str, insecure: bool) -> Value {
    let mut tls = Map::new();
    tls.insert("enabled".into(), json!(true));
    if !sni.is_empty() {
        tls.insert("server_name".into(), json!(sni));
    }
    if insecure {
        tls.insert("insecure".into(), json!(true));
    }
    if !alpn.is_empty() {
        tls.insert("alpn".into(), json!(split_list(alpn)));
    }
    Value::Object(tls)
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|x| !x.is_empty())
        .map(str::to_owned)
        .collect()
}

fn insert_nonempty(ob: &mut Map<String, Value>, key: &str, value: &str) {
    if !value.is_empty() {
        ob.insert(key.into(), json!(value));
    }
}

fn substitute(template: &str, vars: &[(&str, String)]) -> String {
    vars.iter()
        .fold(template.to_string(), |acc, (k, v)| acc.replace(k, v))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vmess(network: &str, security: &str) -> Bean {
        Bean::Vmess(VmessBean {
            server: "v.example".into(),
            server_port: 443,
            uuid: "b831381d-6324-4d53-ad4f-8cda48b30811".into(),
            stream: StreamSettings {
                network: network.into(),
                security: security.into(),
                sni: "v.example".into(),
                path: "/ray".into(),
                host: "cdn.example".into(),
                ..Default::default()
            },
            ..Default::default()
        })
    }

    #[test]
    fn vmess_ws_tls_outbound() {
        let ob = vmess("ws", "tls")
            .build_native_outbound(&BuildSettings::default())
            .unwrap();
        assert_eq!(ob["type"], "vmess");
        assert_eq!(ob["server_port"], 443);
        assert_eq!(ob["security"], "auto");
        assert_eq!(ob["transport"]["type"], "ws");
        assert_eq!(ob["transport"]["headers"]["Host"], "cdn.example");
        assert_eq!(ob["tls"]["server_name"], "v.example");
        assert!(ob["tls"].get("utls").is_none());
    }

    #[test]
    fn reality_forces_a_fingerprint() {
        let bean = Bean::Vless(VlessBean {
            server: "r.example".into(),
            server_port: 443,
            uuid: "u".into(),
            flow: "xtls-rprx-vision".into(),
            stream: StreamSettings {
                security: "reality".into(),
                reality_public_key: "pbk".into(),
                reality_short_id: "ab".into(),
                ..Default::default()
            },
        });
        let ob = bean.build_native_outbound(&BuildSettings::default()).unwrap();
        assert_eq!(ob["tls"]["reality"]["public_key"], "pbk");
        assert_eq!(ob["tls"]["utls"]["fingerprint"], "chrome");
        assert!(ob.get("transport").is_none());
    }

    #[test]
    fn bundles_reject_their_own_parameters() {
        let ss = Bean::Shadowsocks(ShadowsocksBean {
            server: "s".into(),
            server_port: 8388,
            method: "rot13".into(),
            password: "p".into(),
            ..Default::default()
        });
        let err = ss.build_native_outbound(&BuildSettings::default()).unwrap_err();
        assert_eq!(err.to_string(), "unsupported shadowsocks method: rot13");
        assert_eq!(err.class(), bc_types::ErrorClass::Policy);
    }

    #[test]
    fn shadowsocks_plugin_is_split() {
        let ss = Bean::Shadowsocks(ShadowsocksBean {
            server: "s".into(),
            server_port: 8388,
            method: "aes-128-gcm".into(),
            password: "p".into(),
            plugin: "obfs-local;obfs=http;obfs-host=a.example".into(),
            ..Default::default()
        });
        let ob = ss.build_native_outbound(&BuildSettings::default()).unwrap();
        assert_eq!(ob["plugin"], "obfs-local");
        assert_eq!(ob["plugin_opts"], "obfs=http;obfs-host=a.example");
    }

    #[test]
    fn chain_and_external_have_no_native_outbound() {
        let chain = Bean::Chain(ChainBean { list: vec![1, 2] });
        assert!(chain
            .build_native_outbound(&BuildSettings::default())
            .unwrap()
            .is_empty());
        let ext = Bean::Custom(CustomBean {
            core: "naive".into(),
            ..Default::default()
        });
        assert!(ext
            .build_native_outbound(&BuildSettings::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn external_bridging_depends_on_position_and_vpn() {
        let ext = Bean::Custom(CustomBean {
            core: "naive".into(),
            server: "n.example".into(),
            server_port: 443,
            ..Default::default()
        });
        let mut settings = BuildSettings::default();
        assert_eq!(ext.needs_bridging(true, &settings), Bridging::Full);
        assert_eq!(ext.needs_bridging(false, &settings), Bridging::Mapping);
        settings.vpn.enabled = true;
        assert_eq!(ext.needs_bridging(true, &settings), Bridging::Mapping);

        let blind = Bean::Custom(CustomBean {
            core: "naive".into(),
            ..Default::default()
        });
        assert_eq!(blind.needs_bridging(false, &settings), Bridging::Unsupported);
        assert!(Bridging::Unsupported.code() < 0);
    }

    #[test]
    fn descriptor_substitutes_placeholders() {
        let ext = Bean::Custom(CustomBean {
            core: "naive".into(),
            server: "n.example".into(),
            server_port: 443,
            command: vec!["--listen=socks://127.0.0.1:%socks_port%".into(), "%config%".into()],
            config: json!("proxy: https://%server_addr%:%server_port%"),
            ..Default::default()
        });
        let mut settings = BuildSettings::default();
        settings
            .extra_cores
            .insert("naive".into(), "/usr/bin/naive".into());

        let full = ext
            .build_bridge_descriptor(30001, 30002, Bridging::Full, &settings)
            .unwrap();
        assert_eq!(full.program, "/usr/bin/naive");
        assert_eq!(full.arguments[0], "--listen=socks://127.0.0.1:30002");
        assert_eq!(full.arguments[1], "%config%");
        assert_eq!(full.config.as_deref(), Some("proxy: https://n.example:443"));

        let mapped = ext
            .build_bridge_descriptor(30001, 30002, Bridging::Mapping, &settings)
            .unwrap();
        assert_eq!(mapped.config.as_deref(), Some("proxy: https://127.0.0.1:30001"));
    }

    #[test]
    fn descriptor_without_launcher_is_core_not_found() {
        let ext = Bean::Custom(CustomBean {
            core: "naive".into(),
            command: vec!["x".into()],
            ..Default::default()
        });
        let err = ext
            .build_bridge_descriptor(1, 2, Bridging::Full, &BuildSettings::default())
            .unwrap_err();
        assert_eq!(err.to_string(), "Core not found: naive");
    }

    #[test]
    fn internal_custom_reads_server_from_config() {
        let c = Bean::Custom(CustomBean {
            core: CORE_INTERNAL.into(),
            server: "ignored.example".into(),
            config: json!("{\"type\": \"socks\", \"server\": \"inner.example\"}"),
            ..Default::default()
        });
        assert_eq!(c.dial_address(), "inner.example");
        assert!(c.is_valid());
    }

    #[test]
    fn bean_deserializes_by_type_tag() {
        let b: Bean = serde_json::from_value(json!({
            "type": "trojan",
            "server": "t.example",
            "server_port": 443,
            "password": "pw",
            "stream": {"security": "tls", "network": "grpc", "path": "svc"}
        }))
        .unwrap();
        assert_eq!(b.type_name(), "trojan");
        assert_eq!(b.stream().map(|s| s.network.as_str()), Some("grpc"));
        assert!(b.is_valid());
    }

    #[test]
    fn ip_literals() {
        assert!(is_ip_address("1.2.3.4"));
        assert!(is_ip_address("[2001:db8::1]"));
        assert!(!is_ip_address("example.com"));
    }
}

//! Per-hop outbound compilation.
//!
//! A hop is either compiled natively by its bean, or bridged: an external
//! helper process takes over the protocol and the core talks to it through a
//! local SOCKS pickup port (plus a redirect inbound in mapping mode).

use crate::bean::{Bean, Bridging};
use crate::build::BuildContext;
use crate::merge::{merge_map, override_tree};
use crate::model::{MuxState, ProxyEntity};
use crate::settings::MuxSettings;
use crate::tag::mapping_tag;
use bc_types::{is_valid_port, BuildError};
use serde_json::{json, Map, Value};
use std::sync::Arc;

pub const UNSUPPORTED_OUTBOUND: &str = "unsupported outbound";
pub const CANNOT_BRIDGE: &str =
    "This configuration cannot be set automatically, please try another.";
pub const WIREGUARD_NEEDS_ELEVATION: &str =
    "using wireguard system interface requires elevated permissions";

/// Result of compiling one hop.
#[derive(Debug)]
pub(crate) struct CompiledHop {
    pub outbound: Value,
    pub bridging: Bridging,
}

/// Whether a natively compiled hop gets a `multiplex` object.
pub fn multiplex_enabled(ent: &ProxyEntity, mux: &MuxSettings) -> bool {
    let mut enabled = matches!(
        ent.bean,
        Bean::Vmess(_) | Bean::Trojan(_) | Bean::Vless(_) | Bean::Shadowsocks(_)
    ) && mux.concurrency > 0;

    if let Some(stream) = ent.bean.stream() {
        let network = stream.network.as_str();
        if network == "grpc" || network == "quic" || (network == "http" && stream.is_tls()) {
            enabled = false;
        }
    }

    match ent.mux_state {
        MuxState::Unset => {
            if !mux.default_on && !ent.enable_brutal {
                enabled = false;
            }
        }
        MuxState::ForceOn => enabled = true,
        MuxState::ForceOff => enabled = false,
    }

    // vision flows cannot be multiplexed
    if let Bean::Vless(v) = &ent.bean {
        if !v.flow.is_empty() {
            enabled = false;
        }
    }
    enabled
}

fn multiplex_object(ent: &ProxyEntity, mux: &MuxSettings) -> Value {
    let mut obj = Map::new();
    obj.insert("enabled".into(), json!(true));
    obj.insert("protocol".into(), json!(mux.protocol));
    obj.insert("padding".into(), json!(mux.padding));
    obj.insert("max_streams".into(), json!(mux.concurrency));
    if ent.enable_brutal {
        obj.insert("max_connections".into(), json!(1));
        obj.insert(
            "brutal".into(),
            json!({
                "enabled": true,
                "up_mbps": ent.brutal_speed,
                "down_mbps": ent.brutal_speed,
            }),
        );
    }
    Value::Object(obj)
}

/// Register the traffic handle of `ent` against `tag` for this build.
pub(crate) fn bind_traffic(ctx: &mut BuildContext<'_>, ent: &ProxyEntity, tag: &str) {
    ent.traffic.bind(ent.id, tag);
    ctx.result.traffic.push(Arc::clone(&ent.traffic));
}

/// Whether `ent`'s traffic handle was already registered in this build.
pub(crate) fn traffic_bound(ctx: &BuildContext<'_>, ent: &ProxyEntity) -> bool {
    ctx.result.traffic.iter().any(|t| Arc::ptr_eq(t, &ent.traffic))
}

/// Compile `ent` natively under `tag`. Traffic binding is left to the caller.
pub(crate) fn compile_native(
    ctx: &mut BuildContext<'_>,
    ent: &Arc<ProxyEntity>,
    tag: &str,
) -> Result<Map<String, Value>, BuildError> {
    if let Bean::Wireguard(wg) = &ent.bean {
        if wg.system_interface && !ctx.settings.elevated {
            return Err(BuildError::permission(WIREGUARD_NEEDS_ELEVATION));
        }
    }

    let mut outbound = ent.bean.build_native_outbound(ctx.settings)?;
    if outbound.is_empty() {
        return Err(BuildError::capability(UNSUPPORTED_OUTBOUND));
    }

    outbound.insert("tag".into(), json!(tag));
    outbound.insert(
        "domain_strategy".into(),
        json!(ctx.settings.routing.outbound_domain_strategy),
    );
    if multiplex_enabled(ent, &ctx.settings.mux) {
        outbound.insert("multiplex".into(), multiplex_object(ent, &ctx.settings.mux));
    }
    tracing::debug!(id = ent.id, tag, kind = ent.bean.type_name(), "native outbound");
    Ok(outbound)
}

fn pick_port(ctx: &BuildContext<'_>, fixed: Option<i64>) -> Result<u16, BuildError> {
    match fixed.filter(|p| is_valid_port(*p)).map(u16::try_from) {
        Some(Ok(port)) => Ok(port),
        _ => ctx.ports.allocate_free_port(),
    }
}

/// Compile one chain hop, bridged or native.
///
/// `is_entry` marks the client-facing hop. The hop's `custom_outbound`
/// override is merged into the result.
pub(crate) fn compile_hop(
    ctx: &mut BuildContext<'_>,
    ent: &Arc<ProxyEntity>,
    tag: &str,
    is_entry: bool,
) -> Result<CompiledHop, BuildError> {
    let bridging = ent.bean.needs_bridging(is_entry, ctx.settings);
    let mut outbound = match bridging {
        Bridging::Unsupported => return Err(BuildError::capability(CANNOT_BRIDGE)),
        Bridging::Native => {
            let ob = compile_native(ctx, ent, tag)?;
            bind_traffic(ctx, ent, tag);
            ob
        }
        Bridging::Mapping | Bridging::Full => {
            let (fixed_mapping, fixed_socks) = match &ent.bean {
                Bean::Custom(c) => (Some(c.mapping_port), Some(c.socks_port)),
                _ => (None, None),
            };
            let mapping_port = pick_port(ctx, fixed_mapping)?;
            let socks_port = pick_port(ctx, fixed_socks)?;

            if bridging == Bridging::Full {
                ctx.result.keep_vpn_off = true;
            } else {
                ctx.inbounds.push(json!({
                    "type": "direct",
                    "tag": mapping_tag(tag),
                    "listen": "127.0.0.1",
                    "listen_port": mapping_port,
                    "override_address": ent.bean.server_address(),
                    "override_port": ent.bean.server_port(),
                }));
            }

            let mut descriptor =
                ent.bean
                    .build_bridge_descriptor(mapping_port, socks_port, bridging, ctx.settings)?;
            descriptor.outbound = tag.to_string();
            tracing::debug!(
                id = ent.id,
                tag,
                mode = bridging.code(),
                program = %descriptor.program,
                mapping_port,
                socks_port,
                "bridged outbound"
            );
            ctx.result.externals.push(descriptor);

            let mut ob = Map::new();
            ob.insert("type".into(), json!("socks"));
            ob.insert("server".into(), json!("127.0.0.1"));
            ob.insert("server_port".into(), json!(socks_port));
            ob.insert("tag".into(), json!(tag));
            bind_traffic(ctx, ent, tag);
            ob
        }
    };

    if let Value::Object(overlay) = override_tree(&ent.custom_outbound) {
        merge_map(&mut outbound, &overlay);
    }

    Ok(CompiledHop {
        outbound: Value::Object(outbound),
        bridging,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bean::{StreamSettings, TrojanBean, VlessBean, VmessBean};

    fn vmess(network: &str, security: &str) -> ProxyEntity {
        ProxyEntity::new(
            1,
            0,
            "v",
            Bean::Vmess(VmessBean {
                server: "v.example".into(),
                server_port: 443,
                uuid: "u".into(),
                stream: StreamSettings {
                    network: network.into(),
                    security: security.into(),
                    ..Default::default()
                },
                ..Default::default()
            }),
        )
    }

    fn mux_on() -> MuxSettings {
        MuxSettings {
            default_on: true,
            ..Default::default()
        }
    }

    #[test]
    fn mux_follows_global_default() {
        let ent = vmess("tcp", "");
        assert!(!multiplex_enabled(&ent, &MuxSettings::default()));
        assert!(multiplex_enabled(&ent, &mux_on()));
    }

    #[test]
    fn mux_is_off_for_multiplexed_transports() {
        for (net, sec) in [("grpc", ""), ("quic", "tls"), ("http", "tls")] {
            assert!(!multiplex_enabled(&vmess(net, sec), &mux_on()), "{net}+{sec}");
        }
        assert!(multiplex_enabled(&vmess("http", ""), &mux_on()));
    }

    #[test]
    fn per_hop_state_overrides_the_heuristic() {
        let mut ent = vmess("grpc", "");
        ent.mux_state = MuxState::ForceOn;
        assert!(multiplex_enabled(&ent, &MuxSettings::default()));
        let mut ent = vmess("tcp", "");
        ent.mux_state = MuxState::ForceOff;
        assert!(!multiplex_enabled(&ent, &mux_on()));
    }

    #[test]
    fn brutal_keeps_mux_on_without_global_default() {
        let mut ent = vmess("tcp", "");
        ent.enable_brutal = true;
        ent.brutal_speed = 100;
        assert!(multiplex_enabled(&ent, &MuxSettings::default()));
        let obj = multiplex_object(&ent, &MuxSettings::default());
        assert_eq!(obj["max_connections"], 1);
        assert_eq!(obj["brutal"]["up_mbps"], 100);
        assert_eq!(obj["max_streams"], 8);
    }

    #[test]
    fn zero_concurrency_disables_mux_unless_forced() {
        let mux = MuxSettings {
            concurrency: 0,
            default_on: true,
            ..Default::default()
        };
        let mut ent = vmess("tcp", "");
        assert!(!multiplex_enabled(&ent, &mux));
        ent.mux_state = MuxState::ForceOn;
        assert!(multiplex_enabled(&ent, &mux));
    }

    #[test]
    fn vless_flow_and_other_protocols_never_mux() {
        let mut ent = ProxyEntity::new(
            2,
            0,
            "",
            Bean::Vless(VlessBean {
                flow: "xtls-rprx-vision".into(),
                ..Default::default()
            }),
        );
        ent.mux_state = MuxState::ForceOn;
        assert!(!multiplex_enabled(&ent, &mux_on()));

        let trojan = ProxyEntity::new(3, 0, "", Bean::Trojan(TrojanBean::default()));
        assert!(multiplex_enabled(&trojan, &mux_on()));
        let socks = ProxyEntity::new(4, 0, "", Bean::Socks(Default::default()));
        assert!(!multiplex_enabled(&socks, &mux_on()));
    }
}

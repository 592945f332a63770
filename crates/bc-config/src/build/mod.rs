//! Document assembly.
//!
//! [`Builder`] is the entry point: it holds the immutable settings and the
//! collaborator ports, and every `build_*` call works on a fresh
//! [`BuildContext`].

mod batch;
mod context;
mod route;

pub use batch::BatchOutput;
pub(crate) use context::BuildContext;
pub use route::{ROUTING_PROFILE_MISSING, ROUTING_TARGET_MISSING};

use crate::bean::{Bean, ExternalDescriptor};
use crate::chain;
use crate::dns::{build_dns, DirectSites};
use crate::merge::{merge_json, override_tree};
use crate::model::{ProxyEntity, TrafficData};
use crate::settings::{BuildSettings, SniffingMode};
use crate::store::ProfileStore;
use crate::tag::{BLOCK, DIRECT, DNS_OUT};
use bc_types::{is_valid_port, BuildError, PortAllocator, RuleSetAssets};
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Result of a single-profile build.
#[derive(Debug, Default)]
pub struct BuildOutput {
    pub document: Value,
    /// Helper processes the caller must launch before the core.
    pub externals: Vec<ExternalDescriptor>,
    /// Traffic handles bound to outbound tags of this document.
    pub traffic: Vec<Arc<TrafficData>>,
    /// Tag of the destination-facing hop of the primary chain.
    pub entry_tag: String,
    pub primary_traffic: Option<Arc<TrafficData>>,
    /// Inner hop tags that connection logging should not report.
    pub ignore_conn_tags: Vec<String>,
    /// Rules synthesized for bridged hops.
    pub chain_rules: Vec<Value>,
    /// A hop dials its server from an external process; TUN mode would loop.
    pub keep_vpn_off: bool,
}

impl BuildOutput {
    /// Helper programs that TUN mode must let through, with `/` separators.
    pub fn auto_bypass_paths(&self) -> Vec<String> {
        self.externals
            .iter()
            .filter(|d| !d.program.trim().is_empty())
            .map(|d| d.program.replace('\\', "/"))
            .collect()
    }
}

/// The three outbounds every document carries.
pub fn reserved_outbounds() -> Vec<Value> {
    vec![
        json!({ "type": "direct", "tag": DIRECT }),
        json!({ "type": "block", "tag": BLOCK }),
        json!({ "type": "dns", "tag": DNS_OUT }),
    ]
}

#[derive(Clone)]
pub struct Builder {
    settings: Arc<BuildSettings>,
    store: Arc<dyn ProfileStore>,
    ports: Arc<dyn PortAllocator>,
    assets: Arc<dyn RuleSetAssets>,
}

impl Builder {
    pub fn new(
        settings: Arc<BuildSettings>,
        store: Arc<dyn ProfileStore>,
        ports: Arc<dyn PortAllocator>,
        assets: Arc<dyn RuleSetAssets>,
    ) -> Self {
        Self {
            settings,
            store,
            ports,
            assets,
        }
    }

    pub fn settings(&self) -> &BuildSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn ProfileStore> {
        &self.store
    }

    /// Compile the document for `ent`.
    ///
    /// `for_test` drops local listeners, group wrappers and the route
    /// `final`; `for_export` leaves out the `experimental` section.
    /// `chain_seq` namespaces inner tags; only sequence 0 names its
    /// destination hop `proxy`.
    pub fn build_config(
        &self,
        ent: &Arc<ProxyEntity>,
        for_test: bool,
        for_export: bool,
        chain_seq: u32,
    ) -> Result<BuildOutput, BuildError> {
        let mut out = match &ent.bean {
            Bean::Custom(c) if c.is_internal_full() => {
                let doc = c.config_object().ok_or_else(|| {
                    BuildError::rejected("internal-full profile does not hold a JSON object")
                })?;
                BuildOutput {
                    document: Value::Object(doc),
                    ..Default::default()
                }
            }
            _ => self.generate(ent, for_test, for_export, chain_seq)?,
        };
        merge_json(&mut out.document, &override_tree(&ent.custom_config));
        tracing::debug!(
            id = ent.id,
            for_test,
            chain_seq,
            entry = %out.entry_tag,
            externals = out.externals.len(),
            "document built"
        );
        Ok(out)
    }

    fn generate(
        &self,
        ent: &Arc<ProxyEntity>,
        for_test: bool,
        for_export: bool,
        chain_seq: u32,
    ) -> Result<BuildOutput, BuildError> {
        let settings = self.settings.as_ref();
        let mut ctx = BuildContext::new(
            settings,
            self.ports.as_ref(),
            for_test,
            for_export,
            chain_seq,
        );
        let mut doc = Map::new();

        if !for_test {
            if is_valid_port(settings.inbound_socks_port) {
                ctx.inbounds.push(mixed_inbound(settings));
            }
            if settings.vpn.enabled {
                ctx.inbounds.push(tun_inbound(settings));
            }
        }

        if settings.ntp.enabled {
            doc.insert(
                "ntp".into(),
                json!({
                    "enabled": true,
                    "server": settings.ntp.server,
                    "server_port": settings.ntp.server_port,
                    "interval": settings.ntp.interval,
                }),
            );
        }

        let hops = chain::resolve(self.store.as_ref(), ent, !for_test)?;
        let entry_tag = chain::link(&mut ctx, ent, &hops)?;
        ctx.outbounds.extend(reserved_outbounds());

        if !for_test {
            if let Some(extra) = settings.custom_inbound.get("inbounds").and_then(Value::as_array) {
                ctx.inbounds.extend(extra.iter().cloned());
            }
        }

        let (route, routing_chain) = self.compile_routing(&mut ctx, &entry_tag)?;
        let direct = DirectSites::classify(&ctx.direct_domains, &routing_chain.direct_sites());
        let dns = build_dns(settings, &entry_tag, &direct);

        doc.insert("log".into(), json!({ "level": settings.log_level }));
        doc.insert("dns".into(), dns);
        doc.insert("inbounds".into(), Value::Array(std::mem::take(&mut ctx.inbounds)));
        doc.insert("outbounds".into(), Value::Array(std::mem::take(&mut ctx.outbounds)));
        doc.insert("route".into(), route);
        if let Some(experimental) = experimental(settings, ctx.for_test || ctx.for_export) {
            doc.insert("experimental".into(), experimental);
        }

        let mut out = ctx.result;
        out.document = Value::Object(doc);
        out.entry_tag = entry_tag;
        out.chain_rules = ctx.routing_rules;
        Ok(out)
    }
}

fn apply_sniffing(inbound: &mut Map<String, Value>, settings: &BuildSettings) {
    let mode = settings.routing.sniffing_mode;
    if mode != SniffingMode::Disable {
        inbound.insert("sniff".into(), json!(true));
        inbound.insert(
            "sniff_override_destination".into(),
            json!(mode == SniffingMode::ForDestination),
        );
    }
    inbound.insert(
        "domain_strategy".into(),
        json!(settings.routing.domain_strategy),
    );
}

fn mixed_inbound(settings: &BuildSettings) -> Value {
    let mut inbound = Map::new();
    inbound.insert("tag".into(), json!("mixed-in"));
    inbound.insert("type".into(), json!("mixed"));
    inbound.insert("listen".into(), json!(settings.inbound_address));
    inbound.insert("listen_port".into(), json!(settings.inbound_socks_port));
    apply_sniffing(&mut inbound, settings);
    Value::Object(inbound)
}

fn tun_inbound(settings: &BuildSettings) -> Value {
    let vpn = &settings.vpn;
    let mut address = vec!["172.19.0.1/24"];
    if vpn.ipv6 {
        address.push("fdfe:dcba:9876::1/96");
    }
    let mut inbound = Map::new();
    inbound.insert("tag".into(), json!("tun-in"));
    inbound.insert("type".into(), json!("tun"));
    inbound.insert("interface_name".into(), json!(vpn.tun_name()));
    inbound.insert("auto_route".into(), json!(true));
    inbound.insert("endpoint_independent_nat".into(), json!(true));
    inbound.insert("mtu".into(), json!(vpn.mtu));
    inbound.insert("stack".into(), json!(vpn.stack));
    inbound.insert("strict_route".into(), json!(vpn.strict_route));
    inbound.insert("gso".into(), json!(vpn.gso));
    inbound.insert("auto_redirect".into(), json!(vpn.auto_redirect));
    inbound.insert("address".into(), json!(address));
    apply_sniffing(&mut inbound, settings);
    Value::Object(inbound)
}

fn experimental(settings: &BuildSettings, skip: bool) -> Option<Value> {
    let api = &settings.clash_api;
    if skip || api.port <= 0 {
        return None;
    }
    Some(json!({
        "clash_api": {
            "external_controller": format!("{}:{}", api.listen, api.port),
            "secret": api.secret,
            "external_ui": "dashboard",
        }
    }))
}

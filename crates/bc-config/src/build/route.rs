use super::{BuildContext, Builder};
use crate::outbound::{bind_traffic, compile_native, traffic_bound};
use crate::route::RoutingChain;
use crate::tag::{route_target_tag, sentinel_map, PROXY, SENTINEL_PROXY};
use bc_types::{BuildError, RuleSetKind};
use serde_json::{json, Map, Value};
use std::sync::Arc;

pub const ROUTING_PROFILE_MISSING: &str =
    "Routing profile does not exist, try resetting the route profile in Routing Settings";
pub const ROUTING_TARGET_MISSING: &str = "The routing profile is referencing outbounds that no longer exists, consider revising your settings";

impl Builder {
    /// Build the `route` section from the active routing chain.
    ///
    /// The geo databases are checked first. Profiles targeted by rules are
    /// compiled as extra outbounds.
    /// The proxy sentinel and a `proxy` final resolve to `entry_tag`, which
    /// is only literally `proxy` in sequence 0.
    pub(super) fn compile_routing(
        &self,
        ctx: &mut BuildContext<'_>,
        entry_tag: &str,
    ) -> Result<(Value, Arc<RoutingChain>), BuildError> {
        let settings = ctx.settings;
        self.assets.check_sources().map_err(|err| {
            tracing::warn!(error = %err, "geo databases unavailable");
            BuildError::resource(err)
        })?;
        let chain = self
            .store
            .routing_chain(settings.routing.current_route_id)
            .ok_or_else(|| BuildError::structural(ROUTING_PROFILE_MISSING))?;

        let mut outbound_map = sentinel_map();
        outbound_map.insert(SENTINEL_PROXY, entry_tag.to_string());
        let mut n = 0;
        for id in chain.used_outbounds() {
            if id < 0 || outbound_map.contains_key(&id) {
                continue;
            }
            let ent = self
                .store
                .profile(id)
                .ok_or_else(|| BuildError::structural(ROUTING_TARGET_MISSING))?;
            let tag = route_target_tag(ctx.chain_seq, n);
            n += 1;
            let outbound = compile_native(ctx, &ent, &tag)?;
            // a target that is also a hop of this build keeps its hop tag
            if !traffic_bound(ctx, &ent) {
                bind_traffic(ctx, &ent, &tag);
            }
            ctx.outbounds.push(Value::Object(outbound));
            ctx.bypass_lookup(&ent.bean.dial_address());
            outbound_map.insert(id, tag);
        }

        let mut route = Map::new();
        if settings.vpn.enabled {
            route.insert("auto_detect_interface".into(), json!(true));
        }
        if !ctx.for_test {
            let fin = match settings.routing.def_outbound.as_str() {
                PROXY => entry_tag,
                other => other,
            };
            route.insert("final".into(), json!(fin));
        }
        let mut rules = ctx.routing_rules.clone();
        rules.extend(chain.route_rules(&outbound_map));
        route.insert("rules".into(), Value::Array(rules));
        route.insert(
            "rule_set".into(),
            Value::Array(self.rule_set_entries(&chain.used_rule_sets())?),
        );
        Ok((Value::Object(route), chain))
    }

    /// Local rule-set entries, compiling missing assets on the way.
    pub(super) fn rule_set_entries(&self, names: &[String]) -> Result<Vec<Value>, BuildError> {
        let mut entries = Vec::with_capacity(names.len());
        for name in names {
            if !self.assets.exists(name) {
                let kind = RuleSetKind::of(name);
                tracing::debug!(rule_set = %name, %kind, "compiling rule set asset");
                self.assets.compile(name, kind).map_err(|err| {
                    tracing::warn!(rule_set = %name, error = %err, "failed to generate rule set asset");
                    BuildError::resource(err)
                })?;
            }
            entries.push(json!({
                "type": "local",
                "tag": name,
                "format": "binary",
                "path": self.assets.path_of(name).to_string_lossy(),
            }));
        }
        Ok(entries)
    }
}

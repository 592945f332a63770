use super::{reserved_outbounds, Builder};
use crate::bean::ExternalDescriptor;
use crate::dns::DNS_DIRECT;
use crate::model::{ProxyEntity, LATENCY_UNAVAILABLE};
use crate::tag::{is_reserved, mapped_hop, sentinel_map};
use bc_types::BuildError;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Result of a batch build.
#[derive(Debug, Default)]
pub struct BatchOutput {
    /// One document carrying every compiled profile's outbounds.
    pub document: Value,
    /// Standalone documents of `internal-full` profiles, keyed by profile id.
    pub full_configs: BTreeMap<i64, Value>,
    /// Entry tag of every profile in the shared document, in input order.
    pub outbound_tags: Vec<String>,
    pub tag_to_profile: HashMap<String, i64>,
    /// Helper processes needed by bridged hops of the shared document.
    pub externals: Vec<ExternalDescriptor>,
    /// Ids of invalid profiles that were left out.
    pub skipped: Vec<i64>,
}

impl Builder {
    /// Compile many profiles into one probing document.
    ///
    /// Invalid profiles are skipped and marked unavailable. Any other failure
    /// aborts the whole batch.
    pub fn build_batch_config(
        &self,
        profiles: &[Arc<ProxyEntity>],
    ) -> Result<BatchOutput, BuildError> {
        let mut out = BatchOutput::default();
        let mut shared: Option<Map<String, Value>> = None;
        let mut outbounds = reserved_outbounds();
        let mut seen: HashSet<String> = HashSet::new();
        let mut seen_inbounds: HashSet<String> = HashSet::new();
        let mut direct_domains: Vec<Value> = Vec::new();
        let mut inbounds: Vec<Value> = Vec::new();
        let mut chain_rules: Vec<Value> = Vec::new();
        let mut seq: u32 = 1;

        for ent in profiles {
            if !ent.bean.is_valid() {
                tracing::warn!(id = ent.id, name = %ent.display_name(), "skipping invalid profile");
                ent.set_latency(LATENCY_UNAVAILABLE);
                out.skipped.push(ent.id);
                continue;
            }
            let res = self.build_config(ent, true, false, seq)?;
            seq += 1;

            if ent.is_full_document() {
                let mut doc = res.document;
                if let Some(obj) = doc.as_object_mut() {
                    obj.insert("inbounds".into(), json!([]));
                }
                out.full_configs.insert(ent.id, doc);
                continue;
            }

            let Value::Object(doc) = res.document else {
                return Err(BuildError::structural(format!(
                    "outbounds is empty for {}",
                    ent.display_name()
                )));
            };

            if let Some(rules) = doc
                .get("dns")
                .and_then(|d| d.get("rules"))
                .and_then(Value::as_array)
            {
                for domain in rules
                    .iter()
                    .filter_map(|r| r.get("domain")?.as_array())
                    .flatten()
                {
                    if !direct_domains.contains(domain) {
                        direct_domains.push(domain.clone());
                    }
                }
            }

            let profile_outbounds = doc
                .get("outbounds")
                .and_then(Value::as_array)
                .filter(|a| !a.is_empty())
                .ok_or_else(|| {
                    BuildError::structural(format!(
                        "outbounds is empty for {}",
                        ent.display_name()
                    ))
                })?;
            let tag = tag_of(&profile_outbounds[0]).to_string();
            out.outbound_tags.push(tag.clone());
            out.tag_to_profile.insert(tag, ent.id);

            // hop tags first contributed by this profile
            let mut kept: HashSet<&str> = HashSet::new();
            for ob in profile_outbounds {
                let tag = tag_of(ob);
                if is_reserved(tag) {
                    continue;
                }
                if seen.insert(tag.to_string()) {
                    outbounds.push(ob.clone());
                    kept.insert(tag);
                } else {
                    tracing::debug!(tag, id = ent.id, "duplicate outbound tag, first kept");
                }
            }

            if let Some(ib) = doc.get("inbounds").and_then(Value::as_array) {
                for inbound in ib {
                    if seen_inbounds.insert(tag_of(inbound).to_string()) {
                        inbounds.push(inbound.clone());
                    }
                }
            }
            chain_rules.extend(res.chain_rules.into_iter().filter(|rule| {
                rule.get("inbound")
                    .and_then(|i| i.get(0))
                    .and_then(Value::as_str)
                    .and_then(mapped_hop)
                    .map_or(true, |hop| kept.contains(hop))
            }));
            out.externals.extend(
                res.externals
                    .into_iter()
                    .filter(|d| kept.contains(d.outbound.as_str())),
            );

            if shared.is_none() {
                shared = Some(doc);
            }
        }

        let mut doc = shared.unwrap_or_default();
        doc.insert("inbounds".into(), Value::Array(inbounds));
        doc.insert("outbounds".into(), Value::Array(outbounds));

        let mut dns = match doc.remove("dns") {
            Some(Value::Object(m)) => m,
            _ => Map::new(),
        };
        let dns_rules = if direct_domains.is_empty() {
            Vec::new()
        } else {
            vec![json!({ "domain": direct_domains, "server": DNS_DIRECT })]
        };
        dns.insert("rules".into(), Value::Array(dns_rules));
        doc.insert("dns".into(), Value::Object(dns));

        let default_chain = self.store.default_chain();
        let mut rules = chain_rules;
        rules.extend(default_chain.route_rules(&sentinel_map()));
        let rule_sets = self.rule_set_entries(&default_chain.used_rule_sets())?;
        doc.insert(
            "route".into(),
            json!({
                "rules": rules,
                "rule_set": rule_sets,
                "auto_detect_interface": true,
            }),
        );

        tracing::info!(
            profiles = profiles.len(),
            compiled = out.outbound_tags.len(),
            full = out.full_configs.len(),
            skipped = out.skipped.len(),
            "batch document built"
        );
        out.document = Value::Object(doc);
        Ok(out)
    }
}

fn tag_of(outbound: &Value) -> &str {
    outbound.get("tag").and_then(Value::as_str).unwrap_or_default()
}

//! Chain resolution and linking.
//!
//! Resolution turns a root profile into an ordered hop list: index 0 is the
//! hop nearest the remote destination, the last index the one nearest the
//! local client. Linking compiles every hop and wires them together, either
//! natively (`detour`) or through routing rules on bridge mapping inbounds.

use crate::bean::{Bean, Bridging};
use crate::build::BuildContext;
use crate::model::ProxyEntity;
use crate::outbound::compile_hop;
use crate::store::ProfileStore;
use crate::tag::{hop_tag, mapping_tag, DIRECT};
use bc_types::BuildError;
use serde_json::{json, Value};
use std::sync::Arc;

pub const NO_GROUP: &str = "This profile is not in any group, your data may be corrupted.";
pub const ARCHIVED_GROUP: &str = "This profile belongs to an archived group and cannot be started.";
pub const LANDING_NOT_FOUND: &str = "landing proxy ent not found.";
pub const FRONT_NOT_FOUND: &str = "front proxy ent not found.";

/// Expand a single profile: chains become their reversed member list.
fn expand(
    store: &dyn ProfileStore,
    ent: &Arc<ProxyEntity>,
) -> Result<Vec<Arc<ProxyEntity>>, BuildError> {
    let Bean::Chain(chain) = &ent.bean else {
        return Ok(vec![Arc::clone(ent)]);
    };
    let mut resolved = Vec::with_capacity(chain.list.len());
    for &id in chain.list.iter().rev() {
        let member = store
            .profile(id)
            .ok_or_else(|| BuildError::structural(format!("chain missing ent: {id}")))?;
        if member.is_chain() {
            return Err(BuildError::structural(format!(
                "chain in chain is not allowed: {id}"
            )));
        }
        resolved.push(member);
    }
    Ok(resolved)
}

/// Resolve the hop list of `root`.
///
/// With `wrappers` set, the owning group's landing proxy is prepended and its
/// front proxy appended, and archived groups are refused.
pub fn resolve(
    store: &dyn ProfileStore,
    root: &Arc<ProxyEntity>,
    wrappers: bool,
) -> Result<Vec<Arc<ProxyEntity>>, BuildError> {
    let group = store
        .group(root.gid)
        .ok_or_else(|| BuildError::structural(NO_GROUP))?;

    let mut hops = expand(store, root)?;
    if !wrappers {
        return Ok(hops);
    }
    if group.archived {
        return Err(BuildError::structural(ARCHIVED_GROUP));
    }

    if let Some(id) = group.front_proxy() {
        let front = store
            .profile(id)
            .ok_or_else(|| BuildError::structural(FRONT_NOT_FOUND))?;
        hops.extend(expand(store, &front)?);
    }
    if let Some(id) = group.landing_proxy() {
        let landing = store
            .profile(id)
            .ok_or_else(|| BuildError::structural(LANDING_NOT_FOUND))?;
        let mut with_landing = expand(store, &landing)?;
        with_landing.append(&mut hops);
        hops = with_landing;
    }
    tracing::debug!(
        root = root.id,
        hops = ?hops.iter().map(|h| h.id).collect::<Vec<_>>(),
        "chain resolved"
    );
    Ok(hops)
}

/// Compile and wire `hops`, returning the entry tag (the tag of hop 0).
pub(crate) fn link(
    ctx: &mut BuildContext<'_>,
    root: &Arc<ProxyEntity>,
    hops: &[Arc<ProxyEntity>],
) -> Result<String, BuildError> {
    let len = hops.len();
    let mut entry_tag = String::new();
    let mut past: Option<(String, Bridging)> = None;

    for (index, ent) in hops.iter().enumerate() {
        let tag = hop_tag(ctx.chain_seq, ent.id, index, len);
        let is_entry = index + 1 == len;

        match &past {
            None => {
                entry_tag = tag.clone();
                ctx.result.primary_traffic = Some(Arc::clone(&ent.traffic));
            }
            Some((_, Bridging::Native)) => {
                ctx.result.ignore_conn_tags.push(tag.clone());
                if let Some(Value::Object(prev)) = ctx.outbounds.last_mut() {
                    prev.insert("detour".into(), json!(tag));
                }
            }
            Some((past_tag, _)) => {
                ctx.result.ignore_conn_tags.push(tag.clone());
                ctx.routing_rules.push(json!({
                    "inbound": [mapping_tag(past_tag)],
                    "outbound": tag,
                }));
            }
        }

        let hop = compile_hop(ctx, ent, &tag, is_entry)?;
        if is_entry && hop.bridging == Bridging::Mapping {
            // nothing dials this mapping inbound from inside the chain
            ctx.routing_rules.push(json!({
                "inbound": [mapping_tag(&tag)],
                "outbound": DIRECT,
            }));
        }

        ctx.bypass_lookup(&ent.bean.dial_address());
        ctx.outbounds.push(hop.outbound);
        past = Some((tag, hop.bridging));
    }

    if len > 1 {
        root.traffic.bind(root.id, &entry_tag);
        ctx.result.traffic.push(Arc::clone(&root.traffic));
    }
    Ok(entry_tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bean::{ChainBean, SocksBean};
    use crate::model::Group;
    use crate::store::{MemoryStore, ProfileDb};

    fn socks(id: i64, gid: i64) -> ProxyEntity {
        ProxyEntity::new(
            id,
            gid,
            format!("s{id}"),
            Bean::Socks(SocksBean {
                server: format!("s{id}.example"),
                server_port: 1080,
                ..Default::default()
            }),
        )
    }

    fn chain(id: i64, list: Vec<i64>) -> ProxyEntity {
        ProxyEntity::new(id, 0, "chain", Bean::Chain(ChainBean { list }))
    }

    fn store(profiles: Vec<ProxyEntity>, groups: Vec<Group>) -> MemoryStore {
        MemoryStore::new(ProfileDb {
            profiles,
            groups,
            ..Default::default()
        })
    }

    fn ids(hops: &[Arc<ProxyEntity>]) -> Vec<i64> {
        hops.iter().map(|h| h.id).collect()
    }

    #[test]
    fn chain_members_are_reversed() {
        let s = store(
            vec![socks(1, 0), socks(2, 0), socks(3, 0), chain(10, vec![1, 2, 3])],
            vec![Group::default()],
        );
        let root = s.profile(10).unwrap();
        assert_eq!(ids(&resolve(&s, &root, true).unwrap()), vec![3, 2, 1]);
    }

    #[test]
    fn missing_member_and_nested_chain_fail() {
        let s = store(
            vec![socks(1, 0), chain(10, vec![1, 9]), chain(11, vec![1, 10])],
            vec![Group::default()],
        );
        let err = resolve(&s, &s.profile(10).unwrap(), false).unwrap_err();
        assert_eq!(err.to_string(), "chain missing ent: 9");
        let err = resolve(&s, &s.profile(11).unwrap(), false).unwrap_err();
        assert_eq!(err.to_string(), "chain in chain is not allowed: 10");
    }

    #[test]
    fn group_is_required() {
        let s = store(vec![socks(1, 5)], vec![Group::default()]);
        let err = resolve(&s, &s.profile(1).unwrap(), false).unwrap_err();
        assert_eq!(err.to_string(), NO_GROUP);
    }

    #[test]
    fn wrappers_only_apply_outside_tests() {
        let g = Group {
            id: 0,
            front_proxy_id: Some(2),
            landing_proxy_id: Some(3),
            ..Default::default()
        };
        let s = store(vec![socks(1, 0), socks(2, 0), socks(3, 0)], vec![g]);
        let root = s.profile(1).unwrap();
        assert_eq!(ids(&resolve(&s, &root, true).unwrap()), vec![3, 1, 2]);
        assert_eq!(ids(&resolve(&s, &root, false).unwrap()), vec![1]);
    }

    #[test]
    fn missing_wrappers_fail() {
        let g = Group {
            id: 0,
            landing_proxy_id: Some(42),
            ..Default::default()
        };
        let s = store(vec![socks(1, 0)], vec![g]);
        let err = resolve(&s, &s.profile(1).unwrap(), true).unwrap_err();
        assert_eq!(err.to_string(), LANDING_NOT_FOUND);
    }

    #[test]
    fn archived_groups_cannot_start() {
        let g = Group {
            id: 0,
            archived: true,
            ..Default::default()
        };
        let s = store(vec![socks(1, 0)], vec![g]);
        let root = s.profile(1).unwrap();
        assert_eq!(
            resolve(&s, &root, true).unwrap_err().class(),
            bc_types::ErrorClass::Structural
        );
        assert!(resolve(&s, &root, false).is_ok());
    }
}

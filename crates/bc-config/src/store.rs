//! Profile repository port and its in-memory implementation.

use crate::de::parse_document;
use crate::model::{Group, ProxyEntity};
use crate::route::RoutingChain;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// Read-only access to stored profiles, groups and routing chains.
pub trait ProfileStore: Send + Sync + 'static {
    fn profile(&self, id: i64) -> Option<Arc<ProxyEntity>>;

    fn group(&self, id: i64) -> Option<Arc<Group>>;

    fn routing_chain(&self, id: i64) -> Option<Arc<RoutingChain>>;

    /// Chain used by batch documents.
    fn default_chain(&self) -> Arc<RoutingChain>;
}

/// Serialized profile database.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileDb {
    pub profiles: Vec<ProxyEntity>,
    pub groups: Vec<Group>,
    pub routing_chains: Vec<RoutingChain>,
    /// Id of the chain used for batch documents; the first chain when unset.
    pub default_chain_id: Option<i64>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    profiles: HashMap<i64, Arc<ProxyEntity>>,
    groups: HashMap<i64, Arc<Group>>,
    chains: HashMap<i64, Arc<RoutingChain>>,
    default_chain: Arc<RoutingChain>,
}

impl MemoryStore {
    pub fn new(db: ProfileDb) -> Self {
        let default_chain = db
            .default_chain_id
            .and_then(|id| db.routing_chains.iter().find(|c| c.id == id))
            .or_else(|| db.routing_chains.first())
            .cloned()
            .unwrap_or_else(RoutingChain::preset_default);
        Self {
            profiles: db
                .profiles
                .into_iter()
                .map(|p| (p.id, Arc::new(p)))
                .collect(),
            groups: db.groups.into_iter().map(|g| (g.id, Arc::new(g))).collect(),
            chains: db
                .routing_chains
                .into_iter()
                .map(|c| (c.id, Arc::new(c)))
                .collect(),
            default_chain: Arc::new(default_chain),
        }
    }

    /// Load a JSON or YAML database file.
    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read profile database {}", path.display()))?;
        text.parse()
            .with_context(|| format!("parse profile database {}", path.display()))
    }

    /// All profile ids, ascending.
    pub fn profile_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.profiles.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn insert_profile(&mut self, profile: ProxyEntity) -> Arc<ProxyEntity> {
        let p = Arc::new(profile);
        self.profiles.insert(p.id, Arc::clone(&p));
        p
    }
}

impl FromStr for MemoryStore {
    type Err = anyhow::Error;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        parse_document::<ProfileDb>(text).map(Self::new)
    }
}

impl ProfileStore for MemoryStore {
    fn profile(&self, id: i64) -> Option<Arc<ProxyEntity>> {
        self.profiles.get(&id).cloned()
    }

    fn group(&self, id: i64) -> Option<Arc<Group>> {
        self.groups.get(&id).cloned()
    }

    fn routing_chain(&self, id: i64) -> Option<Arc<RoutingChain>> {
        self.chains
            .get(&id)
            .cloned()
            .or_else(|| RoutingChain::preset(id).map(Arc::new))
    }

    fn default_chain(&self) -> Arc<RoutingChain> {
        Arc::clone(&self.default_chain)
    }
}

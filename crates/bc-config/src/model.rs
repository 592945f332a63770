//! Stored entities: profiles, groups and their traffic accounting.

use crate::bean::{Bean, CORE_INTERNAL_FULL};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicI32, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// Latency value of a profile that cannot be tested.
pub const LATENCY_UNAVAILABLE: i32 = -1;

/// Shared traffic counters of one profile.
///
/// The compiler only binds the handle to an outbound tag; whoever polls the
/// core's statistics updates the counters.
#[derive(Debug, Default)]
pub struct TrafficData {
    id: AtomicI64,
    tag: RwLock<String>,
    uplink: AtomicU64,
    downlink: AtomicU64,
}

impl TrafficData {
    pub fn bind(&self, id: i64, tag: &str) {
        self.id.store(id, Ordering::Relaxed);
        *self.tag.write() = tag.to_string();
    }

    pub fn id(&self) -> i64 {
        self.id.load(Ordering::Relaxed)
    }

    pub fn tag(&self) -> String {
        self.tag.read().clone()
    }

    pub fn add(&self, up: u64, down: u64) {
        self.uplink.fetch_add(up, Ordering::Relaxed);
        self.downlink.fetch_add(down, Ordering::Relaxed);
    }

    pub fn uplink(&self) -> u64 {
        self.uplink.load(Ordering::Relaxed)
    }

    pub fn downlink(&self) -> u64 {
        self.downlink.load(Ordering::Relaxed)
    }
}

/// Per-profile multiplex override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum MuxState {
    #[default]
    Unset,
    ForceOn,
    ForceOff,
}

impl TryFrom<u8> for MuxState {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::Unset),
            1 => Ok(Self::ForceOn),
            2 => Ok(Self::ForceOff),
            other => Err(format!("invalid mux_state {other}, expected 0, 1 or 2")),
        }
    }
}

impl From<MuxState> for u8 {
    fn from(s: MuxState) -> u8 {
        match s {
            MuxState::Unset => 0,
            MuxState::ForceOn => 1,
            MuxState::ForceOff => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Simple,
    Chain,
    Custom,
}

/// A stored proxy profile.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProxyEntity {
    pub id: i64,
    pub gid: i64,
    #[serde(default)]
    pub name: String,
    pub bean: Bean,
    #[serde(default)]
    pub mux_state: MuxState,
    #[serde(default)]
    pub enable_brutal: bool,
    /// Brutal congestion-control bandwidth in Mbps.
    #[serde(default)]
    pub brutal_speed: i64,
    /// Override tree merged into this profile's outbound.
    #[serde(default)]
    pub custom_outbound: Value,
    /// Override tree merged into the whole document.
    #[serde(default)]
    pub custom_config: Value,
    #[serde(skip)]
    latency: AtomicI32,
    #[serde(skip)]
    pub traffic: Arc<TrafficData>,
}

impl ProxyEntity {
    pub fn new(id: i64, gid: i64, name: impl Into<String>, bean: Bean) -> Self {
        Self {
            id,
            gid,
            name: name.into(),
            bean,
            mux_state: MuxState::Unset,
            enable_brutal: false,
            brutal_speed: 0,
            custom_outbound: Value::Null,
            custom_config: Value::Null,
            latency: AtomicI32::new(0),
            traffic: Arc::new(TrafficData::default()),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match &self.bean {
            Bean::Chain(_) => EntityKind::Chain,
            Bean::Custom(_) => EntityKind::Custom,
            _ => EntityKind::Simple,
        }
    }

    pub fn is_chain(&self) -> bool {
        self.kind() == EntityKind::Chain
    }

    /// Whether the profile is a complete user-supplied document.
    pub fn is_full_document(&self) -> bool {
        matches!(&self.bean, Bean::Custom(c) if c.core == CORE_INTERNAL_FULL)
    }

    /// Last measured latency in ms; `0` untested, `-1` unavailable.
    pub fn latency(&self) -> i32 {
        self.latency.load(Ordering::Relaxed)
    }

    pub fn set_latency(&self, ms: i32) {
        self.latency.store(ms, Ordering::Relaxed);
    }

    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            format!("{}#{}", self.bean.type_name(), self.id)
        } else {
            self.name.clone()
        }
    }
}

/// A profile group.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Group {
    pub id: i64,
    pub name: String,
    /// Profile placed in front of every member (client side).
    pub front_proxy_id: Option<i64>,
    /// Profile placed behind every member (destination side).
    pub landing_proxy_id: Option<i64>,
    pub archived: bool,
}

impl Group {
    // negative ids are how older databases spell "none"
    pub fn front_proxy(&self) -> Option<i64> {
        self.front_proxy_id.filter(|id| *id >= 0)
    }

    pub fn landing_proxy(&self) -> Option<i64> {
        self.landing_proxy_id.filter(|id| *id >= 0)
    }
}

#![allow(dead_code)]

use bc_config::{BuildSettings, Builder, MemoryStore, ProfileDb, ProfileStore, ProxyEntity};
use bc_types::{RuleSetAssets, RuleSetKind, SequentialPorts};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

/// Rule-set service that records compile requests.
#[derive(Default)]
pub struct FakeAssets {
    pub present: Mutex<HashSet<String>>,
    pub compiled: Mutex<Vec<(String, RuleSetKind)>>,
    pub fail_with: Option<String>,
    pub sources_error: Option<String>,
}

impl FakeAssets {
    pub fn with_present(names: &[&str]) -> Self {
        Self {
            present: Mutex::new(names.iter().map(|n| n.to_string()).collect()),
            ..Default::default()
        }
    }

    pub fn failing(msg: &str) -> Self {
        Self {
            fail_with: Some(msg.to_string()),
            ..Default::default()
        }
    }

    pub fn without_sources(msg: &str) -> Self {
        Self {
            sources_error: Some(msg.to_string()),
            ..Default::default()
        }
    }
}

impl RuleSetAssets for FakeAssets {
    fn path_of(&self, name: &str) -> PathBuf {
        PathBuf::from("rule_sets").join(format!("{name}.srs"))
    }

    fn exists(&self, name: &str) -> bool {
        self.present.lock().contains(name)
    }

    fn compile(&self, name: &str, kind: RuleSetKind) -> Result<(), String> {
        if let Some(msg) = &self.fail_with {
            return Err(msg.clone());
        }
        self.compiled.lock().push((name.to_string(), kind));
        self.present.lock().insert(name.to_string());
        Ok(())
    }

    fn check_sources(&self) -> Result<(), String> {
        match &self.sources_error {
            Some(msg) => Err(msg.clone()),
            None => Ok(()),
        }
    }
}

pub struct Fixture {
    pub builder: Builder,
    pub store: Arc<MemoryStore>,
    pub assets: Arc<FakeAssets>,
}

impl Fixture {
    pub fn profile(&self, id: i64) -> Arc<ProxyEntity> {
        self.store.profile(id).expect("profile in fixture")
    }
}

pub fn fixture(db: Value, settings: BuildSettings) -> Fixture {
    fixture_with_assets(db, settings, FakeAssets::default())
}

pub fn fixture_with_assets(db: Value, settings: BuildSettings, assets: FakeAssets) -> Fixture {
    let db: ProfileDb = serde_json::from_value(db).expect("valid profile db");
    let store = Arc::new(MemoryStore::new(db));
    let assets = Arc::new(assets);
    let builder = Builder::new(
        Arc::new(settings),
        store.clone(),
        Arc::new(SequentialPorts::new(30000)),
        assets.clone(),
    );
    Fixture {
        builder,
        store,
        assets,
    }
}

pub fn socks(id: i64, gid: i64) -> Value {
    json!({
        "id": id,
        "gid": gid,
        "name": format!("s{id}"),
        "bean": {"type": "socks", "server": format!("s{id}.example"), "server_port": 1080}
    })
}

pub fn chain(id: i64, list: &[i64]) -> Value {
    json!({"id": id, "gid": 0, "name": format!("chain{id}"), "bean": {"type": "chain", "list": list}})
}

pub fn naive(id: i64, server: &str) -> Value {
    json!({
        "id": id,
        "gid": 0,
        "name": "naive",
        "bean": {
            "type": "custom",
            "core": "naive",
            "server": server,
            "server_port": 443,
            "command": ["--listen=socks://127.0.0.1:%socks_port%", "%config%"],
            "config": "{\"proxy\": \"https://%server_addr%:%server_port%\"}"
        }
    })
}

/// Database with one default group and an empty routing chain 0.
pub fn db(profiles: Vec<Value>) -> Value {
    json!({
        "profiles": profiles,
        "groups": [{"id": 0, "name": "Default"}],
        "routing_chains": [{"id": 0, "name": "Default"}]
    })
}

pub fn settings_with_core() -> BuildSettings {
    let mut s = BuildSettings::default();
    s.extra_cores.insert("naive".into(), "/opt/naive".into());
    s
}

pub fn tags(doc: &Value, section: &str) -> Vec<String> {
    doc[section]
        .as_array()
        .expect("section array")
        .iter()
        .map(|v| v["tag"].as_str().unwrap_or_default().to_string())
        .collect()
}

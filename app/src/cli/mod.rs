pub mod batch;
pub mod build;
pub mod merge;
pub mod probe;

use crate::assets::DirRuleSetAssets;
use crate::loader::{load_settings, load_store};
use crate::ports::OsPorts;
use anyhow::{Context, Result};
use bc_config::{Builder, MemoryStore};
use bc_types::{PortAllocator, SequentialPorts};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "boxchain")]
#[command(about = "Compile proxy profiles and chains into sing-box configurations", long_about = None)]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile the document of one profile
    Build(build::BuildArgs),
    /// Compile many profiles into one probing document
    Batch(batch::BatchArgs),
    /// Compile test documents for many profiles in parallel and report
    Probe(probe::ProbeArgs),
    /// Deep-merge an override file into a base JSON file
    Merge(merge::MergeArgs),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Human,
    Json,
}

/// Inputs shared by every compiling subcommand.
#[derive(ClapArgs, Debug, Clone)]
pub struct SourceArgs {
    /// Profile database (JSON or YAML)
    #[arg(short = 'd', long = "db")]
    pub db: PathBuf,

    /// Build settings (JSON or YAML); defaults when omitted
    #[arg(short = 's', long = "settings")]
    pub settings: Option<PathBuf>,

    /// Directory holding compiled rule sets; overrides the settings value
    #[arg(long = "rule-sets-dir")]
    pub rule_sets_dir: Option<PathBuf>,

    /// Program compiling a missing rule set
    #[arg(long = "ruleset-compiler")]
    pub ruleset_compiler: Option<String>,

    /// Argument of the rule-set compiler, repeatable; `%name%`, `%kind%` and `%output%` are substituted
    #[arg(long = "ruleset-compiler-arg", allow_hyphen_values = true)]
    pub ruleset_compiler_args: Vec<String>,

    /// Directory that must hold geoip.db and geosite.db; unchecked when omitted
    #[arg(long = "geo-dir")]
    pub geo_dir: Option<PathBuf>,

    /// Hand out bridge ports sequentially from this base instead of asking the OS
    #[arg(long = "port-base")]
    pub port_base: Option<u16>,
}

impl SourceArgs {
    pub fn open(&self) -> Result<(Builder, Arc<MemoryStore>)> {
        let mut settings = load_settings(self.settings.as_deref())?;
        if let Some(dir) = &self.rule_sets_dir {
            settings.routing.rule_sets_dir = dir.to_string_lossy().into_owned();
        }
        let store = Arc::new(load_store(&self.db)?);
        let ports: Arc<dyn PortAllocator> = match self.port_base {
            Some(base) => Arc::new(SequentialPorts::new(base)),
            None => Arc::new(OsPorts),
        };
        let compiler: Vec<String> = self
            .ruleset_compiler
            .iter()
            .chain(self.ruleset_compiler_args.iter())
            .cloned()
            .collect();
        let mut assets = DirRuleSetAssets::new(settings.routing.rule_sets_dir.clone(), compiler);
        if let Some(dir) = &self.geo_dir {
            assets = assets.with_geo_dir(dir);
        }
        let assets = Arc::new(assets);
        let builder = Builder::new(Arc::new(settings), store.clone(), ports, assets);
        Ok((builder, store))
    }
}

/// Write pretty JSON to `out`, or stdout when absent.
pub fn write_json<T: Serialize>(value: &T, out: Option<&Path>) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("encode JSON")?;
    match out {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("create {}", parent.display()))?;
                }
            }
            std::fs::write(path, text.as_bytes())
                .with_context(|| format!("write {}", path.display()))?;
        }
        None => println!("{text}"),
    }
    Ok(())
}

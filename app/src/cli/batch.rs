//! `batch`: compile many profiles into one probing document.

use super::{write_json, SourceArgs};
use anyhow::{Context, Result};
use bc_config::{ExternalDescriptor, MemoryStore, ProfileStore, ProxyEntity};
use clap::Args as ClapArgs;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(ClapArgs, Debug)]
pub struct BatchArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Profile ids; every profile of the database when omitted
    #[arg(short = 'p', long = "profile", num_args = 1..)]
    pub profiles: Vec<i64>,

    /// Output file; stdout when omitted
    #[arg(short = 'o', long = "out")]
    pub out: Option<PathBuf>,

    /// Emit tags, standalone documents and skipped ids next to the document
    #[arg(long = "with-extras")]
    pub with_extras: bool,
}

#[derive(Serialize)]
struct BatchReport<'a> {
    document: &'a Value,
    full_configs: &'a BTreeMap<i64, Value>,
    outbound_tags: &'a [String],
    tag_to_profile: &'a HashMap<String, i64>,
    externals: &'a [ExternalDescriptor],
    skipped: &'a [i64],
}

/// Look up `ids`, or every stored profile when empty.
pub fn select_profiles(store: &MemoryStore, ids: &[i64]) -> Result<Vec<Arc<ProxyEntity>>> {
    let ids = if ids.is_empty() {
        store.profile_ids()
    } else {
        ids.to_vec()
    };
    ids.into_iter()
        .map(|id| {
            store
                .profile(id)
                .with_context(|| format!("profile {id} not found"))
        })
        .collect()
}

pub fn run(args: BatchArgs) -> Result<()> {
    let (builder, store) = args.source.open()?;
    let profiles = select_profiles(&store, &args.profiles)?;
    let out = builder
        .build_batch_config(&profiles)
        .context("build batch document")?;

    if args.with_extras {
        let report = BatchReport {
            document: &out.document,
            full_configs: &out.full_configs,
            outbound_tags: &out.outbound_tags,
            tag_to_profile: &out.tag_to_profile,
            externals: &out.externals,
            skipped: &out.skipped,
        };
        write_json(&report, args.out.as_deref())
    } else {
        write_json(&out.document, args.out.as_deref())
    }
}

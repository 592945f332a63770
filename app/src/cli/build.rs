//! `build`: compile the document of one profile.

use super::{write_json, SourceArgs};
use anyhow::{Context, Result};
use bc_config::{ExternalDescriptor, ProfileStore};
use clap::Args as ClapArgs;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;

#[derive(ClapArgs, Debug)]
pub struct BuildArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Profile id
    #[arg(short = 'p', long = "profile")]
    pub profile: i64,

    /// Compile a test document (no local listeners, no group wrappers)
    #[arg(long)]
    pub test: bool,

    /// Compile for export (no experimental section)
    #[arg(long)]
    pub export: bool,

    /// Chain sequence id used to namespace tags
    #[arg(long, default_value_t = 0)]
    pub seq: u32,

    /// Output file; stdout when omitted
    #[arg(short = 'o', long = "out")]
    pub out: Option<PathBuf>,

    /// Emit helper-process descriptors and chain metadata next to the document
    #[arg(long = "with-extras")]
    pub with_extras: bool,
}

#[derive(Serialize)]
struct BuildReport<'a> {
    document: &'a Value,
    externals: &'a [ExternalDescriptor],
    auto_bypass_paths: Vec<String>,
    entry_tag: &'a str,
    ignore_conn_tags: &'a [String],
    chain_rules: &'a [Value],
    keep_vpn_off: bool,
}

pub fn run(args: BuildArgs) -> Result<()> {
    let (builder, store) = args.source.open()?;
    let ent = store
        .profile(args.profile)
        .with_context(|| format!("profile {} not found", args.profile))?;

    let out = builder
        .build_config(&ent, args.test, args.export, args.seq)
        .with_context(|| format!("build profile {}", ent.display_name()))?;

    if args.with_extras {
        let report = BuildReport {
            document: &out.document,
            externals: &out.externals,
            auto_bypass_paths: out.auto_bypass_paths(),
            entry_tag: &out.entry_tag,
            ignore_conn_tags: &out.ignore_conn_tags,
            chain_rules: &out.chain_rules,
            keep_vpn_off: out.keep_vpn_off,
        };
        write_json(&report, args.out.as_deref())
    } else {
        write_json(&out.document, args.out.as_deref())
    }
}

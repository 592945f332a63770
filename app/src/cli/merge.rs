//! `merge`: deep-merge an override file into a base file.

use super::write_json;
use crate::loader::parse_document;
use anyhow::{Context, Result};
use bc_config::merge::merge_json;
use clap::Args as ClapArgs;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(ClapArgs, Debug)]
pub struct MergeArgs {
    /// Base document (JSON or YAML)
    #[arg(value_name = "BASE")]
    pub base: PathBuf,

    /// Override document; objects merge recursively, everything else replaces
    #[arg(value_name = "OVERRIDE")]
    pub overlay: PathBuf,

    /// Output file; stdout when omitted
    #[arg(short = 'o', long = "out")]
    pub out: Option<PathBuf>,
}

fn read(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    parse_document(&text).with_context(|| format!("parse {}", path.display()))
}

pub fn run(args: MergeArgs) -> Result<()> {
    let mut base = read(&args.base)?;
    let overlay = read(&args.overlay)?;
    merge_json(&mut base, &overlay);
    write_json(&base, args.out.as_deref())
}

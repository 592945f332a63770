//! Directory-backed rule-set assets.
//!
//! Compiled sets live at `<dir>/<name>.srs`. Missing sets are produced by an
//! optional external compiler command whose arguments may use `%name%`,
//! `%kind%` (`ip`/`site`) and `%output%`. When a geo directory is set, it
//! must hold `geoip.db` and `geosite.db`.

use bc_types::{RuleSetAssets, RuleSetKind};
use std::path::PathBuf;
use std::process::Command;

#[derive(Debug, Clone)]
pub struct DirRuleSetAssets {
    dir: PathBuf,
    compiler: Vec<String>,
    geo_dir: Option<PathBuf>,
}

impl DirRuleSetAssets {
    pub fn new(dir: impl Into<PathBuf>, compiler: Vec<String>) -> Self {
        Self {
            dir: dir.into(),
            compiler,
            geo_dir: None,
        }
    }

    /// Require the geo databases in `dir` before any build.
    pub fn with_geo_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.geo_dir = Some(dir.into());
        self
    }
}

impl RuleSetAssets for DirRuleSetAssets {
    fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.srs"))
    }

    fn exists(&self, name: &str) -> bool {
        self.path_of(name).is_file()
    }

    fn compile(&self, name: &str, kind: RuleSetKind) -> Result<(), String> {
        let Some((program, args)) = self.compiler.split_first() else {
            return Err(format!(
                "rule set {name} is missing from {} and no compiler is configured",
                self.dir.display()
            ));
        };
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| format!("create {}: {e}", self.dir.display()))?;

        let output = self.path_of(name);
        let output_str = output.to_string_lossy();
        let kind_str = kind.to_string();
        let args: Vec<String> = args
            .iter()
            .map(|a| {
                a.replace("%name%", name)
                    .replace("%kind%", &kind_str)
                    .replace("%output%", &output_str)
            })
            .collect();

        tracing::info!(rule_set = name, %kind, program = %program, "compiling rule set");
        let result = Command::new(program)
            .args(&args)
            .output()
            .map_err(|e| format!("run {program}: {e}"))?;
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(format!(
                "rule set compiler failed for {name}: {}",
                stderr.trim()
            ));
        }
        if !self.exists(name) {
            return Err(format!("rule set compiler did not produce {}", output.display()));
        }
        Ok(())
    }

    fn check_sources(&self) -> Result<(), String> {
        let Some(dir) = &self.geo_dir else {
            return Ok(());
        };
        // geosite is reported when both are missing
        let missing = ["geosite.db", "geoip.db"]
            .into_iter()
            .find(|db| !dir.join(db).is_file());
        match missing {
            Some(db) => Err(format!("{db} not found, it is needed for generating rule sets")),
            None => Ok(()),
        }
    }
}

//! `probe`: compile a test document per profile on a bounded worker pool.
//!
//! Every profile is an independent compile call; failures are reported per
//! profile instead of aborting the run.

use super::batch::select_profiles;
use super::{Format, SourceArgs};
use anyhow::{Context, Result};
use bc_config::model::LATENCY_UNAVAILABLE;
use bc_config::{Builder, ProxyEntity};
use clap::Args as ClapArgs;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(ClapArgs, Debug)]
pub struct ProbeArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Profile ids; every profile of the database when omitted
    #[arg(short = 'p', long = "profile", num_args = 1..)]
    pub profiles: Vec<i64>,

    /// Maximum number of concurrent compile calls
    #[arg(short = 'j', long = "concurrency", default_value_t = 4)]
    pub concurrency: usize,

    /// Output format
    #[arg(long, value_enum, default_value = "human")]
    pub format: Format,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub id: i64,
    pub name: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_tag: Option<String>,
    pub outbounds: usize,
    pub externals: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
}

fn probe_one(builder: &Builder, ent: &Arc<ProxyEntity>, seq: u32) -> ProbeReport {
    let mut report = ProbeReport {
        id: ent.id,
        name: ent.display_name(),
        ok: false,
        entry_tag: None,
        outbounds: 0,
        externals: 0,
        error: None,
        class: None,
    };
    if !ent.bean.is_valid() {
        ent.set_latency(LATENCY_UNAVAILABLE);
        report.error = Some("invalid profile".to_string());
        return report;
    }
    match builder.build_config(ent, true, false, seq) {
        Ok(out) => {
            report.ok = true;
            report.entry_tag = Some(out.entry_tag);
            report.outbounds = out.document["outbounds"]
                .as_array()
                .map_or(0, Vec::len);
            report.externals = out.externals.len();
        }
        Err(e) => {
            tracing::warn!(id = ent.id, class = %e.class(), error = %e, "probe build failed");
            report.class = Some(e.class().to_string());
            report.error = Some(e.to_string());
        }
    }
    report
}

/// Compile test documents for `profiles` with at most `concurrency` in flight.
///
/// Reports come back in input order.
pub async fn probe_all(
    builder: &Builder,
    profiles: Vec<Arc<ProxyEntity>>,
    concurrency: usize,
) -> Result<Vec<ProbeReport>> {
    let sem = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut handles = Vec::with_capacity(profiles.len());

    for (i, ent) in profiles.into_iter().enumerate() {
        let permit = sem.clone().acquire_owned().await?;
        let builder = builder.clone();
        let seq = u32::try_from(i + 1).unwrap_or(u32::MAX);
        handles.push(tokio::task::spawn_blocking(move || {
            let _permit = permit;
            probe_one(&builder, &ent, seq)
        }));
    }

    let mut reports = Vec::with_capacity(handles.len());
    for h in handles {
        reports.push(h.await.context("probe worker panicked")?);
    }
    Ok(reports)
}

pub async fn run(args: ProbeArgs) -> Result<()> {
    let (builder, store) = args.source.open()?;
    let profiles = select_profiles(&store, &args.profiles)?;
    let reports = probe_all(&builder, profiles, args.concurrency).await?;

    let failed = reports.iter().filter(|r| !r.ok).count();
    tracing::info!(total = reports.len(), failed, "probe finished");

    match args.format {
        Format::Json => println!(
            "{}",
            serde_json::to_string_pretty(&reports).context("encode probe report")?
        ),
        Format::Human => {
            for r in &reports {
                match (&r.entry_tag, &r.error) {
                    (Some(tag), _) => println!("{}\t{}\tok\t{}", r.id, r.name, tag),
                    (None, Some(err)) => println!("{}\t{}\tfail\t{}", r.id, r.name, err),
                    (None, None) => println!("{}\t{}\tfail", r.id, r.name),
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bc_config::{BuildSettings, MemoryStore, ProfileStore};
    use bc_types::{RuleSetAssets, RuleSetKind, SequentialPorts};
    use std::path::PathBuf;

    struct NoAssets;

    impl RuleSetAssets for NoAssets {
        fn path_of(&self, name: &str) -> PathBuf {
            PathBuf::from(format!("{name}.srs"))
        }
        fn exists(&self, _: &str) -> bool {
            true
        }
        fn compile(&self, _: &str, _: RuleSetKind) -> Result<(), String> {
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn reports_keep_input_order() {
        let store: MemoryStore = r#"{
            "profiles": [
                {"id": 1, "gid": 0, "bean": {"type": "socks", "server": "a.example", "server_port": 1080}},
                {"id": 2, "gid": 0, "bean": {"type": "socks", "server": "", "server_port": 1080}},
                {"id": 3, "gid": 9, "bean": {"type": "socks", "server": "c.example", "server_port": 1080}}
            ],
            "groups": [{"id": 0}],
            "routing_chains": [{"id": 0}]
        }"#
        .parse()
        .unwrap();
        let store = Arc::new(store);
        let builder = Builder::new(
            Arc::new(BuildSettings::default()),
            store.clone(),
            Arc::new(SequentialPorts::new(30000)),
            Arc::new(NoAssets),
        );
        let profiles = vec![
            store.profile(1).unwrap(),
            store.profile(2).unwrap(),
            store.profile(3).unwrap(),
        ];
        let reports = probe_all(&builder, profiles, 2).await.unwrap();

        assert_eq!(reports.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(reports[0].ok);
        assert_eq!(reports[0].entry_tag.as_deref(), Some("g-1-0"));
        assert_eq!(reports[1].error.as_deref(), Some("invalid profile"));
        assert_eq!(store.profile(2).unwrap().latency(), -1);
        assert_eq!(reports[2].class.as_deref(), Some("structural"));
    }
}

//! Push rows from a JSON file into a live list.
//!
//! ```text
//! LISTSYNC_SITE_ID=contoso.sharepoint.com,<guid>,<guid> \
//! LISTSYNC_TOKEN=<bearer token> \
//! LISTSYNC_KEY=Area,Period,Year \
//! cargo run -p core-sync --example sync_rows -- rows.json KPIs upsert
//! ```
//!
//! `rows.json` holds an array of flat objects. Columns are declared from the
//! first row: numeric values become number columns, everything else text.

use anyhow::{bail, Context, Result};
use bridge_desktop::ReqwestHttpClient;
use core_auth::StaticTokenProvider;
use core_runtime::config::EngineConfig;
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use core_sync::{ColumnDef, FieldValue, ListDefinition, Row, SyncMode, SyncOptions, SyncPipeline, UniqueKey};
use provider_graph_lists::GraphListsConnector;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging(LoggingConfig::default().with_format(LogFormat::Compact))?;

    let mut args = std::env::args().skip(1);
    let (Some(path), Some(list)) = (args.next(), args.next()) else {
        bail!("usage: sync_rows <rows.json> <list name> [upsert|full-replace]");
    };
    let mode: SyncMode = args.next().as_deref().unwrap_or("upsert").parse()?;

    let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path))?;
    let objects: Vec<serde_json::Map<String, serde_json::Value>> =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path))?;
    let rows = objects
        .iter()
        .map(Row::from_json_object)
        .collect::<core_sync::Result<Vec<_>>>()?;

    let mut definition = ListDefinition::new(list);
    if let Some(first) = rows.first() {
        for (name, value) in first.fields() {
            definition = definition.with_column(match value {
                FieldValue::Number(_) => ColumnDef::number(name),
                FieldValue::Text(_) => ColumnDef::text(name),
            });
        }
    }
    if let Ok(key) = std::env::var("LISTSYNC_KEY") {
        definition = definition.with_unique_key(UniqueKey::new(key.split(',').map(str::trim)));
    }

    let config = EngineConfig::builder()
        .site_id(std::env::var("LISTSYNC_SITE_ID").context("LISTSYNC_SITE_ID is not set")?)
        .http_client(Arc::new(ReqwestHttpClient::new()?))
        .build()?;

    let connector = GraphListsConnector::from_config(&config);
    let pipeline = SyncPipeline::new(
        config,
        Arc::new(connector),
        Arc::new(StaticTokenProvider::from_env("LISTSYNC_TOKEN")),
    );

    let options = match mode {
        SyncMode::Upsert => SyncOptions::upsert(),
        SyncMode::FullReplace => SyncOptions::full_replace(),
    };
    let print = |message: &str| println!("{message}");
    let outcome = pipeline.sync_rows(&definition, rows, options, &print).await?;

    println!(
        "job {} finished as {}: {} submitted, {} succeeded, {} failed",
        outcome.job.id,
        outcome.job.phase,
        outcome.result.submitted,
        outcome.result.succeeded,
        outcome.result.failed
    );
    for error in &outcome.result.errors {
        println!("  {error}");
    }
    Ok(())
}

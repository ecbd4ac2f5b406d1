//! Print the fields the API exposes on Account, Contact, Lead and Opportunity,
//! to help decide what goes into the fixed field lists.

use anyhow::{Context, Result};
use crmscraper::{
    config::{Config, DEFAULT_CONFIG_FILE},
    fetch, Table,
};
use std::collections::BTreeMap;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    let config = Config::load_or_default(DEFAULT_CONFIG_FILE)
        .with_context(|| format!("loading {}", DEFAULT_CONFIG_FILE))?;
    let extractor = fetch::connect(&config)
        .await
        .context("connecting to Salesforce")?;

    let result = fetch::fetch_field_catalog(&extractor).await;
    extractor.into_session().close().await;
    let catalog = result.context("fetching field catalog")?;

    for (table, fields) in group_by_table(&catalog)? {
        println!("{} ({} fields)", table, fields.len());
        for (name, ty) in fields {
            println!("  {:<40} {}", name, ty);
        }
    }
    info!(fields = catalog.len(), "done");
    Ok(())
}

/// TableName → [(QualifiedApiName, DataType)], tables and fields sorted.
fn group_by_table(catalog: &Table) -> Result<BTreeMap<String, Vec<(String, String)>>> {
    let t = catalog.require_column("TableName")?;
    let n = catalog.require_column("QualifiedApiName")?;
    let d = catalog.require_column("DataType")?;

    let mut out: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();
    for row in &catalog.rows {
        out.entry(row[t].to_string())
            .or_default()
            .push((row[n].to_string(), row[d].to_string()));
    }
    for fields in out.values_mut() {
        fields.sort();
    }
    Ok(out)
}

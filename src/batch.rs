use chrono::NaiveDate;
use std::path::PathBuf;
use tracing::{info, instrument, warn};

use crate::{
    config::Config,
    fetch::{self, Extractor},
    process::{self, JoinIntegrityGap},
    write, Result,
};

pub const LEADS_SUFFIX: &str = "leads";
pub const OPPS_SUFFIX: &str = "opps";

/// What one run produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub leads: usize,
    pub opportunities: usize,
    pub contacts: usize,
    pub enriched: usize,
    pub join_gap: JoinIntegrityGap,
    pub files: Vec<PathBuf>,
}

/// Extract, transform and export leads, then enriched opportunities.
///
/// Stops at the first error. A table's file is written only once all of its
/// transforms succeeded, so a failure on opportunities leaves the leads file
/// in place and writes nothing for opportunities.
#[instrument(level = "info", skip(extractor, config), fields(run_date = %run_date))]
pub async fn run_batch<E: Extractor>(
    extractor: &E,
    config: &Config,
    run_date: NaiveDate,
) -> Result<RunSummary> {
    let mut summary = RunSummary::default();

    // ─── 1) leads ────────────────────────────────────────────────────
    let raw_leads = extractor.fetch(&fetch::leads_query()).await?;
    summary.leads = raw_leads.len();
    let leads = process::prepare_leads(raw_leads)?;
    let name = write::output_file_name(run_date, &config.file_prefix, LEADS_SUFFIX);
    summary
        .files
        .push(write::write_table(&leads, &config.output_dir, &name)?);

    // ─── 2) opportunities + contacts ─────────────────────────────────
    let opps = extractor.fetch(&fetch::opportunities_query()).await?;
    let contacts = extractor.fetch(&fetch::contacts_query()).await?;
    summary.opportunities = opps.len();
    summary.contacts = contacts.len();

    let (enriched, gap) = process::prepare_opportunities(opps, contacts)?;
    if !gap.is_empty() {
        warn!(
            dropped = gap.dropped,
            sample = ?gap.unmatched_keys.iter().take(10).collect::<Vec<_>>(),
            "opportunities without a matching contact were dropped"
        );
    }
    summary.enriched = enriched.len();
    summary.join_gap = gap;
    let name = write::output_file_name(run_date, &config.file_prefix, OPPS_SUFFIX);
    summary
        .files
        .push(write::write_table(&enriched, &config.output_dir, &name)?);

    info!(
        leads = summary.leads,
        opportunities = summary.opportunities,
        contacts = summary.contacts,
        enriched = summary.enriched,
        "batch complete"
    );
    Ok(summary)
}

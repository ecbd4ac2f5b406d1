// src/process/mod.rs
use chrono_tz::Tz;
use tracing::{info, instrument};

use crate::{Result, Table};

pub mod backfill;
pub mod date_parser;
pub mod fiscal;
pub mod join;
pub mod trimming;

pub use backfill::backfill;
pub use date_parser::normalize_timestamps;
pub use fiscal::{derive_fiscal_year, FiscalPeriod};
pub use join::{enrich_with_contacts, JoinIntegrityGap};
pub use trimming::normalize_emails;

/// Zone every exported timestamp is expressed in.
pub const TARGET_TZ: Tz = chrono_tz::Australia::Sydney;

pub const ID: &str = "Id";
pub const CONTACT_ID: &str = "ContactId";
pub const EMAIL: &str = "Email";
pub const LEAD_SOURCE: &str = "LeadSource";
pub const LEAD_SOURCE_DETAIL: &str = "LeadSourceDetail__c";
pub const CREATED_DATE: &str = "CreatedDate";
pub const CLOSE_DATE: &str = "CloseDate";

/// Column the fiscal calendar is derived from, for both exports.
pub const FISCAL_DATE: &str = CREATED_DATE;

/// Raw leads → export-ready leads.
#[instrument(level = "info", skip_all, fields(rows = leads.len()))]
pub fn prepare_leads(leads: Table) -> Result<Table> {
    let leads = normalize_timestamps(leads, &[CREATED_DATE])?;
    let leads = normalize_emails(leads, EMAIL)?;
    let leads = backfill(leads, LEAD_SOURCE_DETAIL, LEAD_SOURCE)?;
    let leads = derive_fiscal_year(leads, FISCAL_DATE)?;
    info!(rows = leads.len(), columns = leads.columns.len(), "leads ready");
    Ok(leads)
}

/// Raw opportunities + contacts → export-ready enriched opportunities.
/// Opportunities whose contact is missing are dropped and reported.
#[instrument(level = "info", skip_all, fields(opps = opps.len(), contacts = contacts.len()))]
pub fn prepare_opportunities(opps: Table, contacts: Table) -> Result<(Table, JoinIntegrityGap)> {
    let opps = normalize_timestamps(opps, &[CREATED_DATE, CLOSE_DATE])?;
    let opps = backfill(opps, LEAD_SOURCE_DETAIL, LEAD_SOURCE)?;
    let contacts = normalize_emails(contacts, EMAIL)?;

    let (enriched, gap) = enrich_with_contacts(opps, contacts)?;
    let enriched = derive_fiscal_year(enriched, FISCAL_DATE)?;
    info!(rows = enriched.len(), dropped = gap.dropped, "opportunities ready");
    Ok((enriched, gap))
}

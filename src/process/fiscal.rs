use chrono::{Datelike, NaiveDate};
use tracing::instrument;

use super::date_parser;
use crate::{Result, Table, Value};

pub const MONTH: &str = "month";
pub const YEAR: &str = "year";
pub const FISCAL_QUARTER: &str = "fiscalQuarter";
pub const FISCAL_YEAR: &str = "fiscalYear";
pub const YEAR_MONTH: &str = "yearMonth";

/// Calendar attributes of one date under a July→June fiscal year.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiscalPeriod {
    /// English month name, e.g. `November`.
    pub month: String,
    pub year: i32,
    /// Year in which the fiscal year ends.
    pub fiscal_year: i32,
    /// 1 = Jul–Sep, 2 = Oct–Dec, 3 = Jan–Mar, 4 = Apr–Jun.
    pub quarter: u32,
}

impl FiscalPeriod {
    pub fn from_date(date: NaiveDate) -> Self {
        let m = date.month();
        Self {
            month: date.format("%B").to_string(),
            year: date.year(),
            fiscal_year: if m >= 7 { date.year() + 1 } else { date.year() },
            quarter: (m + 5) % 12 / 3 + 1,
        }
    }

    /// e.g. `2023Q2`
    pub fn quarter_label(&self) -> String {
        format!("{}Q{}", self.fiscal_year, self.quarter)
    }

    /// Fiscal year and month name with no separator, e.g. `2023November`.
    pub fn year_month(&self) -> String {
        format!("{}{}", self.fiscal_year, self.month)
    }
}

/// Append `month`, `year`, `fiscalQuarter`, `fiscalYear` and `yearMonth`
/// computed from `field`, read in the target zone. Null dates give null
/// attributes.
#[instrument(level = "debug", skip(table), fields(rows = table.len()))]
pub fn derive_fiscal_year(mut table: Table, field: &str) -> Result<Table> {
    let idx = table.require_column(field)?;

    let n = table.len();
    let (mut months, mut years, mut quarters, mut fiscal_years, mut year_months) = (
        Vec::with_capacity(n),
        Vec::with_capacity(n),
        Vec::with_capacity(n),
        Vec::with_capacity(n),
        Vec::with_capacity(n),
    );
    for row in &table.rows {
        match date_parser::to_target(&row[idx], field)? {
            Some(ts) => {
                let p = FiscalPeriod::from_date(ts.date_naive());
                quarters.push(Value::Text(p.quarter_label()));
                year_months.push(Value::Text(p.year_month()));
                years.push(Value::Int(p.year.into()));
                fiscal_years.push(Value::Int(p.fiscal_year.into()));
                months.push(Value::Text(p.month));
            }
            None => {
                for col in [
                    &mut months,
                    &mut years,
                    &mut quarters,
                    &mut fiscal_years,
                    &mut year_months,
                ] {
                    col.push(Value::Null);
                }
            }
        }
    }

    table.set_column(MONTH, months);
    table.set_column(YEAR, years);
    table.set_column(FISCAL_QUARTER, quarters);
    table.set_column(FISCAL_YEAR, fiscal_years);
    table.set_column(YEAR_MONTH, year_months);
    Ok(table)
}

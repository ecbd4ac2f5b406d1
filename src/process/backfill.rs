use tracing::{debug, instrument};

use crate::{Result, Table};

/// Fill null `target` cells from `fallback` on the same row. A single pass;
/// running it again changes nothing.
#[instrument(level = "debug", skip(table), fields(rows = table.len()))]
pub fn backfill(mut table: Table, target: &str, fallback: &str) -> Result<Table> {
    let t = table.require_column(target)?;
    let f = table.require_column(fallback)?;

    let mut filled = 0usize;
    for row in table.rows.iter_mut() {
        if row[t].is_null() && !row[f].is_null() {
            row[t] = row[f].clone();
            filled += 1;
        }
    }
    debug!(filled, "{} backfilled from {}", target, fallback);
    Ok(table)
}

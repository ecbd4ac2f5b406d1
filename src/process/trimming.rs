use tracing::instrument;

use crate::{Result, Table, Value};

/// Trim surrounding whitespace and lowercase.
pub fn clean_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Apply [`clean_email`] to every text cell of `field`; other cells are left alone.
#[instrument(level = "debug", skip(table), fields(rows = table.len()))]
pub fn normalize_emails(mut table: Table, field: &str) -> Result<Table> {
    let idx = table.require_column(field)?;
    for row in table.rows.iter_mut() {
        if let Value::Text(s) = &row[idx] {
            row[idx] = Value::Text(clean_email(s));
        }
    }
    Ok(table)
}

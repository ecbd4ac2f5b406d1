use std::collections::HashMap;

use tracing::{info, instrument};

use super::{CONTACT_ID, ID};
use crate::{Result, Table, Value};

/// Left rows that found no partner during an inner join. Informational:
/// the rows are dropped from the output, the run continues.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoinIntegrityGap {
    pub dropped: usize,
    /// Keys that had no match. Null keys are counted but not listed.
    pub unmatched_keys: Vec<String>,
}

impl JoinIntegrityGap {
    pub fn is_empty(&self) -> bool {
        self.dropped == 0
    }
}

/// Rename the contacts' `Id` to `ContactId` and inner-join them onto the
/// opportunities.
pub fn enrich_with_contacts(opps: Table, mut contacts: Table) -> Result<(Table, JoinIntegrityGap)> {
    contacts.rename_column(ID, CONTACT_ID)?;
    inner_join(opps, &contacts, CONTACT_ID)
}

/// Inner join on `key`, keeping `left` row order. Each left row matches at
/// most one right row (the first with that key). Non-key columns present on
/// both sides are suffixed `_x` (left) and `_y` (right).
#[instrument(level = "info", skip(left, right), fields(left_rows = left.len(), right_rows = right.len()))]
pub fn inner_join(left: Table, right: &Table, key: &str) -> Result<(Table, JoinIntegrityGap)> {
    let lk = left.require_column(key)?;
    let rk = right.require_column(key)?;

    let mut index: HashMap<String, usize> = HashMap::with_capacity(right.len());
    for (i, row) in right.rows.iter().enumerate() {
        if let Some(k) = join_key(&row[rk]) {
            index.entry(k).or_insert(i);
        }
    }

    let right_cols: Vec<usize> = (0..right.columns.len()).filter(|&i| i != rk).collect();
    let shared = |name: &str| {
        name != key
            && left.columns.iter().any(|c| c == name)
            && right.columns.iter().any(|c| c == name)
    };
    let columns: Vec<String> = left
        .columns
        .iter()
        .map(|c| if shared(c) { format!("{}_x", c) } else { c.clone() })
        .chain(right_cols.iter().map(|&i| {
            let c = &right.columns[i];
            if shared(c) {
                format!("{}_y", c)
            } else {
                c.clone()
            }
        }))
        .collect();

    let mut out = Table::new(columns);
    let mut gap = JoinIntegrityGap::default();
    for row in left.rows {
        let key_value = join_key(&row[lk]);
        match key_value.as_ref().and_then(|k| index.get(k)) {
            Some(&ri) => {
                let mut joined = row;
                joined.extend(right_cols.iter().map(|&i| right.rows[ri][i].clone()));
                out.push_row(joined);
            }
            None => {
                gap.dropped += 1;
                gap.unmatched_keys.extend(key_value);
            }
        }
    }

    info!(joined = out.len(), dropped = gap.dropped, "inner join on {}", key);
    Ok((out, gap))
}

fn join_key(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

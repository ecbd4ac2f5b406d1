use chrono::NaiveDate;
use csv::WriterBuilder;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{info, instrument};

use crate::{Result, Table};

pub const EXTENSION: &str = "csv";

/// `<YYYYMMDD>-<prefix>-<suffix>.csv`, or `<YYYYMMDD>-<suffix>.csv` when the
/// prefix is empty.
pub fn output_file_name(run_date: NaiveDate, prefix: &str, suffix: &str) -> String {
    let date = run_date.format("%Y%m%d");
    if prefix.is_empty() {
        format!("{}-{}.{}", date, suffix, EXTENSION)
    } else {
        format!("{}-{}-{}.{}", date, prefix, suffix, EXTENSION)
    }
}

/// Write `table` as CSV to `dir/file_name`: a header row of column names,
/// then one line per row, no index column.
///
/// The data goes to a hidden temp file first and is renamed into place, so
/// `dir/file_name` either holds a complete table or does not exist.
#[instrument(level = "info", skip(table, dir), fields(rows = table.len()))]
pub fn write_table<P: AsRef<Path>>(table: &Table, dir: P, file_name: &str) -> Result<PathBuf> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    let path = dir.join(file_name);
    let tmp_path = dir.join(format!(".{}.tmp", file_name));

    let written = write_csv(table, &tmp_path)
        .and_then(|()| fs::rename(&tmp_path, &path).map_err(Into::into));
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    info!(path = %path.display(), "wrote table");
    Ok(path)
}

fn write_csv(table: &Table, path: &Path) -> Result<()> {
    let mut wtr = WriterBuilder::new().from_path(path)?;
    wtr.write_record(&table.columns)?;
    for row in &table.rows {
        wtr.write_record(row.iter().map(|v| v.to_string()))?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;
    use tempfile::tempdir;

    #[test]
    fn file_name_has_date_prefix_and_suffix() {
        let d = NaiveDate::from_ymd_opt(2022, 10, 6).unwrap();
        assert_eq!(output_file_name(d, "salesforce", "leads"), "20221006-salesforce-leads.csv");
        assert_eq!(output_file_name(d, "", "opps"), "20221006-opps.csv");
    }

    #[test]
    fn writes_header_and_rows_without_index() {
        let dir = tempdir().unwrap();
        let mut t = Table::new(["Id", "Email", "IsConverted", "year"]);
        t.push_row(vec!["1".into(), "a@b.com".into(), Value::Bool(true), Value::Int(2022)]);
        t.push_row(vec!["2".into(), Value::Null, Value::Bool(false), Value::Int(2023)]);
        t.push_row(vec!["3".into(), "has, comma".into(), Value::Null, Value::Null]);

        let path = write_table(&t, dir.path().join("nested"), "out.csv").unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "Id,Email,IsConverted,year\n1,a@b.com,True,2022\n2,,False,2023\n3,\"has, comma\",,\n"
        );

        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn failed_rename_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        // A non-empty directory in the way makes the final rename fail.
        fs::create_dir_all(dir.path().join("out.csv").join("blocker")).unwrap();

        let t = Table::new(["Id"]);
        assert!(write_table(&t, dir.path(), "out.csv").is_err());
        assert!(!dir.path().join(".out.csv.tmp").exists());
    }

    #[test]
    fn empty_table_still_gets_a_header() {
        let dir = tempdir().unwrap();
        let t = Table::new(["Id", "Name"]);
        let path = write_table(&t, dir.path(), "empty.csv").unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "Id,Name\n");
    }
}

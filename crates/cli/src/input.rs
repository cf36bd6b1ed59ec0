//! Bulk input files
//!
//! CSV with a `row_key,old_value,new_value` header. Any column may be left
//! empty; validation happens in the engine and produces per-row warnings.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use relabel_engine::BulkRow;
use serde::Deserialize;

pub const TEMPLATE_HEADER: [&str; 3] = ["row_key", "old_value", "new_value"];

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(default)]
    row_key: Option<String>,
    #[serde(default)]
    old_value: Option<String>,
    #[serde(default)]
    new_value: Option<String>,
}

/// Read bulk rows from a CSV file
pub fn read_bulk_rows(path: &Path) -> Result<Vec<BulkRow>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    parse_bulk_rows(file).with_context(|| format!("Failed to read {}", path.display()))
}

/// Parse CSV bulk input; line numbers count the header as line 1.
///
/// Header names are trimmed, field values are kept verbatim.
pub fn parse_bulk_rows<R: Read>(reader: R) -> Result<Vec<BulkRow>> {
    let mut csv = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .flexible(true)
        .from_reader(reader);

    let mut rows = Vec::new();
    for (index, record) in csv.deserialize::<CsvRow>().enumerate() {
        let line = index + 2;
        let record = record.with_context(|| format!("Malformed row at line {}", line))?;
        rows.push(BulkRow {
            line,
            row_key: record.row_key,
            old_value: record.old_value,
            new_value: record.new_value,
        });
    }
    Ok(rows)
}

/// Write an empty template with just the header row
pub fn write_template<W: Write>(writer: W) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(TEMPLATE_HEADER)?;
    csv.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rows_with_blanks() {
        let input = "row_key,old_value,new_value\n1,,X\n,Acme,Acme Corp\n,,\n";
        let rows = parse_bulk_rows(input.as_bytes()).unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].line, 2);
        assert_eq!(rows[0].row_key.as_deref(), Some("1"));
        assert_eq!(rows[1].old_value.as_deref(), Some("Acme"));
        assert!(rows[2].validate().is_err());
    }

    #[test]
    fn test_field_padding_is_kept() {
        let input = "row_key, old_value ,new_value\n,Acme ,Acme Corp\n";
        let rows = parse_bulk_rows(input.as_bytes()).unwrap();

        assert_eq!(rows[0].old_value.as_deref(), Some("Acme "));
        assert_eq!(rows[0].validate().unwrap().predicate.to_string(), "value = \"Acme \"");
    }

    #[test]
    fn test_missing_column_is_tolerated() {
        let input = "row_key,new_value\n7,Hooli\n";
        let rows = parse_bulk_rows(input.as_bytes()).unwrap();
        assert_eq!(rows[0].old_value, None);
        assert!(rows[0].validate().is_ok());
    }

    #[test]
    fn test_template_round_trips_to_no_rows() {
        let mut buffer = Vec::new();
        write_template(&mut buffer).unwrap();

        assert_eq!(String::from_utf8(buffer.clone()).unwrap(), "row_key,old_value,new_value\n");
        assert!(parse_bulk_rows(buffer.as_slice()).unwrap().is_empty());
    }
}

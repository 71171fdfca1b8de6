//! I/O utilities for CSV reading, writing, encoding, and delimiter resolution.
//!
//! Every table the pipeline ingests or emits goes through this module:
//!
//! - **Delimiter resolution**: extension-based detection (`.csv` → comma,
//!   `.tsv` → tab) with manual override support.
//! - **Encoding**: input decoding via `encoding_rs`, defaulting to UTF-8.
//!   Output is always UTF-8.
//! - **Whole-table reads**: [`read_csv_table`] loads a file into a [`Table`]
//!   with every cell kept as text, which is what the schema resolver and the
//!   normalizers expect.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};

use crate::data::{FieldValue, Table};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(reader)
}

pub fn open_csv_reader_from_path(path: &Path, delimiter: u8) -> Result<csv::Reader<Box<dyn Read>>> {
    let reader: Box<dyn Read> = Box::new(BufReader::new(
        File::open(path).with_context(|| format!("Opening input file {path:?}"))?,
    ));
    Ok(open_csv_reader(reader, delimiter))
}

pub fn open_csv_writer(path: &Path) -> Result<csv::Writer<Box<dyn Write>>> {
    let base: Box<dyn Write> = Box::new(BufWriter::new(
        File::create(path).with_context(|| format!("Creating output file {path:?}"))?,
    ));
    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(DEFAULT_CSV_DELIMITER)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true);
    Ok(builder.from_writer(base))
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

/// Reads a whole delimited file into memory. Short rows are padded with
/// empty cells so every row has one cell per header.
pub fn read_csv_table(path: &Path, delimiter: u8, encoding: &'static Encoding) -> Result<Table> {
    let mut reader = open_csv_reader_from_path(path, delimiter)?;
    let headers = reader.byte_headers()?.clone();
    let headers = decode_record(&headers, encoding)
        .with_context(|| format!("Decoding headers of {path:?}"))?;
    let width = headers.len();
    let mut rows = Vec::new();
    for (row_idx, record) in reader.byte_records().enumerate() {
        let record = record.with_context(|| format!("Reading row {}", row_idx + 2))?;
        let mut decoded = decode_record(&record, encoding)
            .with_context(|| format!("Decoding row {} of {path:?}", row_idx + 2))?;
        decoded.resize(width, String::new());
        rows.push(decoded.into_iter().map(FieldValue::from_csv_cell).collect());
    }
    Ok(Table::new(headers, rows))
}

/// Writes a table with a header row. Cells are rendered via
/// [`FieldValue::as_display`].
pub fn write_csv_table(path: &Path, table: &Table) -> Result<()> {
    let mut writer = open_csv_writer(path)?;
    writer
        .write_record(table.headers())
        .with_context(|| format!("Writing headers to {path:?}"))?;
    for row in table.rows() {
        writer
            .write_record(row.iter().map(FieldValue::as_display))
            .with_context(|| format!("Writing row to {path:?}"))?;
    }
    writer
        .flush()
        .with_context(|| format!("Flushing {path:?}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn delimiter_follows_extension_unless_provided() {
        assert_eq!(resolve_input_delimiter(&PathBuf::from("users.tsv"), None), b'\t');
        assert_eq!(resolve_input_delimiter(&PathBuf::from("users.csv"), None), b',');
        assert_eq!(
            resolve_input_delimiter(&PathBuf::from("users.tsv"), Some(b';')),
            b';'
        );
    }

    #[test]
    fn resolve_encoding_rejects_unknown_labels() {
        assert_eq!(resolve_encoding(None).unwrap(), UTF_8);
        assert_eq!(
            resolve_encoding(Some(" windows-1252 ")).unwrap().name(),
            "windows-1252"
        );
        assert!(resolve_encoding(Some("klingon")).is_err());
    }

    #[test]
    fn read_csv_table_pads_short_rows() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("users.csv");
        std::fs::write(&path, "id,name,email\n1,Ann\n2,Bob,bob@x.com\n").expect("write");

        let table = read_csv_table(&path, b',', UTF_8).expect("read table");

        assert_eq!(table.headers(), ["id", "name", "email"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[0][2], FieldValue::Null);
        assert_eq!(table.rows()[1][2], FieldValue::Text("bob@x.com".into()));
    }
}

#![allow(dead_code)]

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow_array::{ArrayRef, RecordBatch, StringArray};
use book_ledger::data::{FieldValue, Table};
use parquet::arrow::ArrowWriter;
use tempfile::{TempDir, tempdir};

/// Returns the absolute path to a fixture under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// Data root holding the `DATA1` (csv orders) and `DATA2` (json orders)
/// bookstore datasets.
pub fn bookstore_root() -> PathBuf {
    fixture_path("bookstore")
}

/// Scratch directory that disappears on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` to `name` (which may contain sub-folders) and
    /// returns the full path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent folders");
        }
        fs::write(&path, contents).expect("write temp file contents");
        path
    }

    /// Copies one bookstore fixture dataset into the workspace under `as_name`.
    pub fn copy_dataset(&self, fixture: &str, as_name: &str) -> PathBuf {
        let source = bookstore_root().join(fixture);
        let target = self.path().join(as_name);
        fs::create_dir_all(&target).expect("create dataset folder");
        for entry in fs::read_dir(&source).expect("list fixture dataset") {
            let entry = entry.expect("fixture entry");
            fs::copy(entry.path(), target.join(entry.file_name())).expect("copy fixture file");
        }
        target
    }

    pub fn read(&self, name: &str) -> String {
        fs::read_to_string(self.path().join(name)).expect("read workspace file")
    }
}

/// Writes `table` as a parquet file with one nullable text column per header.
pub fn write_parquet_table(path: &Path, table: &Table) {
    let columns: Vec<(String, ArrayRef)> = table
        .headers()
        .iter()
        .enumerate()
        .map(|(idx, header)| {
            let values: Vec<Option<String>> = table
                .rows()
                .iter()
                .map(|row| match &row[idx] {
                    FieldValue::Null => None,
                    other => Some(other.as_display()),
                })
                .collect();
            (header.clone(), Arc::new(StringArray::from(values)) as ArrayRef)
        })
        .collect();
    let batch = RecordBatch::try_from_iter(columns).expect("record batch");
    let file = File::create(path).expect("create parquet file");
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None).expect("parquet writer");
    writer.write(&batch).expect("write record batch");
    writer.close().expect("close parquet writer");
}

use std::{collections::HashSet, fmt};

use serde::{Deserialize, Serialize};

/// A single cell from one of the loosely typed inputs. CSV cells always
/// arrive as `Text` (or `Null` when blank); JSON orders and YAML catalog
/// entries keep whatever shape the source used.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    List(Vec<FieldValue>),
    Null,
}

impl FieldValue {
    pub fn from_csv_cell(raw: String) -> Self {
        if raw.is_empty() {
            FieldValue::Null
        } else {
            FieldValue::Text(raw)
        }
    }

    pub fn from_json(value: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match value {
            Json::Null => FieldValue::Null,
            Json::Bool(b) => FieldValue::Boolean(b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                None => n.as_f64().map(FieldValue::Float).unwrap_or(FieldValue::Null),
            },
            Json::String(s) => FieldValue::Text(s),
            Json::Array(items) => {
                FieldValue::List(items.into_iter().map(FieldValue::from_json).collect())
            }
            Json::Object(_) => FieldValue::Text(value.to_string()),
        }
    }

    pub fn from_yaml(value: serde_yaml::Value) -> Self {
        use serde_yaml::Value as Yaml;
        match value {
            Yaml::Null => FieldValue::Null,
            Yaml::Bool(b) => FieldValue::Boolean(b),
            Yaml::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                None => n.as_f64().map(FieldValue::Float).unwrap_or(FieldValue::Null),
            },
            Yaml::String(s) => FieldValue::Text(s),
            Yaml::Sequence(items) => {
                FieldValue::List(items.into_iter().map(FieldValue::from_yaml).collect())
            }
            Yaml::Tagged(tagged) => FieldValue::from_yaml(tagged.value),
            other @ Yaml::Mapping(_) => FieldValue::Text(
                serde_yaml::to_string(&other)
                    .map(|s| s.trim_end().to_string())
                    .unwrap_or_default(),
            ),
        }
    }

    /// Text rendering used for identifiers and CSV output. `Null` renders as
    /// an empty string.
    pub fn as_display(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Integer(i) => i.to_string(),
            FieldValue::Float(f) => {
                if f.is_finite() && f.fract() == 0.0 {
                    format!("{f:.0}")
                } else {
                    f.to_string()
                }
            }
            FieldValue::Boolean(b) => b.to_string(),
            FieldValue::List(items) => items
                .iter()
                .map(FieldValue::as_display)
                .collect::<Vec<_>>()
                .join("; "),
            FieldValue::Null => String::new(),
        }
    }

    /// Identifier form of the cell: trimmed display text, `None` when blank.
    pub fn as_key(&self) -> Option<String> {
        let display = self.as_display();
        let trimmed = display.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

/// Column-major names over row-major cells. Every row holds exactly one
/// cell per header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<FieldValue>>,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<FieldValue>>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, FieldValue::Null);
                row
            })
            .collect();
        Self { headers, rows }
    }

    /// Builds a table from keyed records. Headers are the union of all keys
    /// in first-seen order; keys a record lacks become `Null`.
    pub fn from_records(records: Vec<Vec<(String, FieldValue)>>) -> Self {
        let mut headers: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for record in &records {
            for (key, _) in record {
                if seen.insert(key.clone()) {
                    headers.push(key.clone());
                }
            }
        }
        let rows = records
            .into_iter()
            .map(|record| {
                let mut row = vec![FieldValue::Null; headers.len()];
                for (key, value) in record {
                    if let Some(idx) = headers.iter().position(|h| *h == key) {
                        row[idx] = value;
                    }
                }
                row
            })
            .collect();
        Self { headers, rows }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<FieldValue>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.headers.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&FieldValue> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Renames the column at `index`. A different column that already carries
    /// `name` is moved aside to `<name>_orig` so lookups stay unambiguous.
    pub fn rename_column(&mut self, index: usize, name: &str) {
        if self.headers[index] == name {
            return;
        }
        if let Some(existing) = self.column_index(name) {
            let mut aside = format!("{name}_orig");
            while self.column_index(&aside).is_some() {
                aside.push_str("_orig");
            }
            self.headers[existing] = aside;
        }
        self.headers[index] = name.to_string();
    }

    /// Appends (or replaces) a column. `values` must hold one cell per row.
    pub fn set_column(&mut self, name: &str, values: Vec<FieldValue>) {
        debug_assert_eq!(values.len(), self.rows.len());
        match self.column_index(name) {
            Some(idx) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
            }
            None => {
                self.headers.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_records_unions_keys_in_first_seen_order() {
        let table = Table::from_records(vec![
            vec![
                ("id".into(), FieldValue::Integer(1)),
                ("price".into(), FieldValue::Text("$3".into())),
            ],
            vec![
                ("qty".into(), FieldValue::Integer(2)),
                ("id".into(), FieldValue::Integer(2)),
            ],
        ]);
        assert_eq!(table.headers(), ["id", "price", "qty"]);
        assert_eq!(table.rows()[0][2], FieldValue::Null);
        assert_eq!(table.rows()[1][0], FieldValue::Integer(2));
    }

    #[test]
    fn rename_column_moves_existing_name_aside() {
        let mut table = Table::new(
            vec!["timestamp_raw".into(), "order_ts".into()],
            vec![vec![FieldValue::Null, FieldValue::Text("x".into())]],
        );
        table.rename_column(1, "timestamp_raw");
        assert_eq!(table.headers(), ["timestamp_raw_orig", "timestamp_raw"]);
        assert_eq!(
            table.cell(0, "timestamp_raw"),
            Some(&FieldValue::Text("x".into()))
        );
    }

    #[test]
    fn display_and_key_forms() {
        assert_eq!(FieldValue::Float(3.0).as_display(), "3");
        assert_eq!(FieldValue::Float(2.5).as_display(), "2.5");
        assert_eq!(
            FieldValue::List(vec![
                FieldValue::Text("A".into()),
                FieldValue::Text("B".into())
            ])
            .as_display(),
            "A; B"
        );
        assert_eq!(FieldValue::Text("  ".into()).as_key(), None);
        assert_eq!(FieldValue::Integer(7).as_key(), Some("7".into()));
    }

    #[test]
    fn yaml_sequences_become_lists() {
        let yaml: serde_yaml::Value = serde_yaml::from_str("[Ann, 3, null]").unwrap();
        assert_eq!(
            FieldValue::from_yaml(yaml),
            FieldValue::List(vec![
                FieldValue::Text("Ann".into()),
                FieldValue::Integer(3),
                FieldValue::Null,
            ])
        );
    }
}

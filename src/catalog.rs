//! Catalog loading, contributor extraction and the transaction → catalog join.

use std::{collections::HashMap, fmt, path::Path};

use anyhow::Result;
use log::{debug, warn};

use crate::{
    data::{FieldValue, Table},
    schema::{self, CATALOG_ID},
    yaml::{self, YamlValue},
};

pub const CONTRIBUTOR_FIELDS: &[&str] = &[":author", "author", "authors", "writer", "writers"];
pub const UNKNOWN_CONTRIBUTOR: &str = "Unknown Author";
const CONTRIBUTOR_DELIMITERS: [char; 3] = [',', '&', ';'];

/// One catalog item with its fields in source order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogEntry {
    fields: Vec<(String, FieldValue)>,
}

impl CatalogEntry {
    pub fn new(fields: Vec<(String, FieldValue)>) -> Self {
        Self { fields }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn fields(&self) -> &[(String, FieldValue)] {
        &self.fields
    }

    fn from_yaml_mapping(mapping: serde_yaml::Mapping) -> Self {
        let fields = mapping
            .into_iter()
            .map(|(key, value)| {
                let key = match key {
                    YamlValue::String(s) => s,
                    other => FieldValue::from_yaml(other).as_display(),
                };
                (key, FieldValue::from_yaml(value))
            })
            .collect();
        Self { fields }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Contributors {
    Named(Vec<String>),
    /// No contributor field could be found at all.
    Unknown,
}

impl Contributors {
    /// Names as displayed; the placeholder reads as [`UNKNOWN_CONTRIBUTOR`].
    pub fn names(&self) -> Vec<&str> {
        match self {
            Contributors::Named(names) => names.iter().map(String::as_str).collect(),
            Contributors::Unknown => vec![UNKNOWN_CONTRIBUTOR],
        }
    }

    pub fn attribution_key(&self) -> AttributionKey {
        match self {
            Contributors::Named(names) => AttributionKey::from_names(names),
            Contributors::Unknown => AttributionKey::default(),
        }
    }
}

/// Sorted, deduplicated contributor names. Only ever used as a grouping key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttributionKey(Vec<String>);

impl AttributionKey {
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        let mut names: Vec<String> = names.iter().map(|n| n.as_ref().to_string()).collect();
        names.sort();
        names.dedup();
        Self(names)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn into_names(self) -> Vec<String> {
        self.0
    }
}

impl fmt::Display for AttributionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(" & "))
    }
}

fn split_contributors(raw: &str) -> Vec<String> {
    match CONTRIBUTOR_DELIMITERS.iter().find(|d| raw.contains(**d)) {
        Some(delimiter) => raw
            .split(*delimiter)
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect(),
        None => vec![raw.trim().to_string()],
    }
}

/// Finds the contributors of a catalog entry.
///
/// Candidate fields are checked in [`CONTRIBUTOR_FIELDS`] order. A string is
/// split on the first delimiter present among `,`, `&`, `;`; a list is
/// stringified element by element. Null and blank values fall through to the
/// next candidate. Failing all candidates, the first string field whose key
/// mentions "author" is used as a single name, and failing that the entry is
/// [`Contributors::Unknown`].
pub fn extract_contributors(entry: &CatalogEntry) -> Contributors {
    for field in CONTRIBUTOR_FIELDS {
        let Some(value) = entry.get(field) else {
            continue;
        };
        match value {
            FieldValue::Text(raw) if !raw.trim().is_empty() => {
                return Contributors::Named(split_contributors(raw));
            }
            FieldValue::List(items) => {
                return Contributors::Named(
                    items
                        .iter()
                        .map(|item| item.as_display().trim().to_string())
                        .filter(|name| !name.is_empty())
                        .collect(),
                );
            }
            FieldValue::Integer(_) | FieldValue::Float(_) | FieldValue::Boolean(true) => {
                return Contributors::Named(vec![value.as_display()]);
            }
            _ => continue,
        }
    }
    for (key, value) in &entry.fields {
        if key.to_lowercase().contains("author")
            && let FieldValue::Text(raw) = value
        {
            return Contributors::Named(vec![raw.trim().to_string()]);
        }
    }
    Contributors::Unknown
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogItem {
    pub book_id: Option<String>,
    pub contributors: Contributors,
    pub attribution_key: AttributionKey,
    pub entry: CatalogEntry,
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    items: Vec<CatalogItem>,
    by_id: HashMap<String, usize>,
}

impl Catalog {
    /// Resolves the item-id column across all entries (the union of their
    /// keys), extracts contributors and indexes items by id. When several
    /// entries share an id the first one wins the join.
    pub fn from_entries(entries: Vec<CatalogEntry>) -> Self {
        let mut keys: Vec<String> = Vec::new();
        for entry in &entries {
            for (key, _) in entry.fields() {
                if !keys.contains(key) {
                    keys.push(key.clone());
                }
            }
        }
        let id_column = schema::pick_column(&keys, CATALOG_ID.candidates).map(str::to_string);
        debug!("Catalog id column: {:?}", id_column);

        let mut by_id = HashMap::new();
        let mut items = Vec::with_capacity(entries.len());
        for entry in entries {
            let book_id = id_column
                .as_deref()
                .and_then(|col| entry.get(col))
                .and_then(FieldValue::as_key);
            let contributors = extract_contributors(&entry);
            let attribution_key = contributors.attribution_key();
            if let Some(id) = &book_id {
                if by_id.contains_key(id) {
                    warn!("Duplicate catalog id '{id}'; keeping the first entry");
                } else {
                    by_id.insert(id.clone(), items.len());
                }
            }
            items.push(CatalogItem {
                book_id,
                contributors,
                attribution_key,
                entry,
            });
        }
        Self { items, by_id }
    }

    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn lookup(&self, book_id: &str) -> Option<&CatalogItem> {
        self.by_id.get(book_id).map(|idx| &self.items[*idx])
    }

    /// Contributors and attribution key for one transaction. Unknown or
    /// unmatched items yield an empty list and an empty key.
    pub fn attribution_for(&self, book_id: Option<&str>) -> (Vec<String>, AttributionKey) {
        match book_id.and_then(|id| self.lookup(id)) {
            Some(item) => match &item.contributors {
                Contributors::Named(names) => (names.clone(), item.attribution_key.clone()),
                Contributors::Unknown => (
                    vec![UNKNOWN_CONTRIBUTOR.to_string()],
                    AttributionKey::default(),
                ),
            },
            None => (Vec::new(), AttributionKey::default()),
        }
    }

    /// Flat view written as `<dataset>_books_processed.csv`.
    pub fn processed_table(&self) -> Table {
        let rows = self
            .items
            .iter()
            .map(|item| {
                vec![
                    item.book_id
                        .clone()
                        .map(FieldValue::Text)
                        .unwrap_or(FieldValue::Null),
                    FieldValue::Text(item.contributors.names().join("; ")),
                    FieldValue::Text(item.attribution_key.to_string()),
                ]
            })
            .collect();
        Table::new(
            vec!["book_id".into(), "authors".into(), "author_set".into()],
            rows,
        )
    }
}

/// Accepts a list of mappings, a mapping holding a `books` list, or a
/// mapping whose values are all mappings. Anything else is an empty catalog.
pub fn entries_from_yaml(value: YamlValue) -> Vec<CatalogEntry> {
    fn mappings(items: Vec<YamlValue>) -> Vec<CatalogEntry> {
        items
            .into_iter()
            .filter_map(|item| match item {
                YamlValue::Mapping(m) => Some(CatalogEntry::from_yaml_mapping(m)),
                _ => None,
            })
            .collect()
    }

    match value {
        YamlValue::Sequence(items) => mappings(items),
        YamlValue::Mapping(mut map) => {
            if let Some(YamlValue::Sequence(_)) = map.get("books") {
                if let Some(YamlValue::Sequence(items)) = map.remove("books") {
                    return mappings(items);
                }
            }
            let values: Vec<YamlValue> = map.into_iter().map(|(_, v)| v).collect();
            if !values.is_empty() && values.iter().all(YamlValue::is_mapping) {
                mappings(values)
            } else {
                Vec::new()
            }
        }
        _ => Vec::new(),
    }
}

pub fn load_catalog(path: &Path) -> Result<Catalog> {
    let value = yaml::load_value(path)?;
    let entries = entries_from_yaml(value);
    if entries.is_empty() {
        warn!("Catalog {path:?} holds no recognizable entries");
    }
    Ok(Catalog::from_entries(entries))
}

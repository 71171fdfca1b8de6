//! Dataset discovery, loading and the per-dataset pipeline run.
//!
//! A dataset is one folder holding a users table, an orders table and a
//! catalog. Datasets are processed one after another; a failing dataset is
//! logged and skipped so the others still produce summaries.

use std::{
    fs::{self, File},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use encoding_rs::Encoding;
use log::{debug, error, info, warn};
use parquet::{
    file::reader::{FileReader, SerializedFileReader},
    record::Field,
};

use crate::{
    aggregate::{self, DailyRevenuePoint, DatasetReport, Summary},
    catalog::{self, Catalog},
    config::PipelineConfig,
    data::{FieldValue, Table},
    enrich::{self, EnrichedTransaction},
    error::LedgerError,
    identity,
    io_utils,
};

pub const USERS_FILE: &str = "users.csv";
pub const ORDERS_CSV_FILE: &str = "orders.csv";
pub const ORDERS_JSON_FILE: &str = "orders.json";
pub const ORDERS_PARQUET_FILE: &str = "orders.parquet";
pub const CATALOG_FILES: &[&str] = &["books.yaml", "books.yml"];
pub const ALL_SUMMARIES_FILE: &str = "all_summaries.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrdersSource {
    Csv(PathBuf),
    Json(PathBuf),
    Parquet(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSources {
    pub name: String,
    pub users: PathBuf,
    pub orders: OrdersSource,
    pub catalog: PathBuf,
}

pub fn dataset_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.display().to_string())
}

/// Locates the three inputs of a dataset folder.
pub fn locate_sources(dir: &Path) -> Result<DatasetSources, LedgerError> {
    let name = dataset_name(dir);
    let missing = |file: &str| LedgerError::MissingSource {
        dataset: name.clone(),
        file: file.to_string(),
    };

    let users = dir.join(USERS_FILE);
    if !users.is_file() {
        return Err(missing(USERS_FILE));
    }

    let orders = if dir.join(ORDERS_CSV_FILE).is_file() {
        OrdersSource::Csv(dir.join(ORDERS_CSV_FILE))
    } else if dir.join(ORDERS_JSON_FILE).is_file() {
        OrdersSource::Json(dir.join(ORDERS_JSON_FILE))
    } else if dir.join(ORDERS_PARQUET_FILE).is_file() {
        OrdersSource::Parquet(dir.join(ORDERS_PARQUET_FILE))
    } else {
        return Err(missing(ORDERS_CSV_FILE));
    };

    let catalog = CATALOG_FILES
        .iter()
        .map(|file| dir.join(file))
        .find(|path| path.is_file())
        .ok_or_else(|| missing(CATALOG_FILES[0]))?;

    Ok(DatasetSources {
        name,
        users,
        orders,
        catalog,
    })
}

fn has_dataset_files(dir: &Path) -> bool {
    dir.join(USERS_FILE).is_file()
        && [ORDERS_CSV_FILE, ORDERS_JSON_FILE, ORDERS_PARQUET_FILE]
            .iter()
            .any(|f| dir.join(f).is_file())
        && CATALOG_FILES.iter().any(|f| dir.join(f).is_file())
}

/// Sub-folders of `root` named `data*` (any case), sorted by name. A root
/// without such folders that holds a dataset's files itself is the only
/// dataset.
pub fn discover_datasets(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(anyhow!("Data root {root:?} not found"));
    }
    let mut datasets = Vec::new();
    for entry in fs::read_dir(root).with_context(|| format!("Listing {root:?}"))? {
        let entry = entry.with_context(|| format!("Listing {root:?}"))?;
        let path = entry.path();
        let is_data = entry
            .file_name()
            .to_string_lossy()
            .to_lowercase()
            .starts_with("data");
        if path.is_dir() && is_data {
            datasets.push(path);
        }
    }
    datasets.sort();
    if datasets.is_empty() {
        if has_dataset_files(root) {
            datasets.push(root.to_path_buf());
        } else {
            return Err(LedgerError::NoDatasets {
                root: root.to_path_buf(),
            }
            .into());
        }
    }
    Ok(datasets)
}

/// Accepts a JSON array of objects or an object with an `orders` array.
pub fn read_orders_json(path: &Path) -> Result<Table> {
    let raw = fs::read_to_string(path).with_context(|| format!("Reading {path:?}"))?;
    let value: serde_json::Value =
        serde_json::from_str(&raw).with_context(|| format!("Parsing JSON from {path:?}"))?;
    let items = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => match map.remove("orders") {
            Some(serde_json::Value::Array(items)) => items,
            _ => return Err(anyhow!("{path:?} has no 'orders' array")),
        },
        _ => return Err(anyhow!("{path:?} must hold an array of order objects")),
    };
    let records: Vec<Vec<(String, FieldValue)>> = items
        .into_iter()
        .filter_map(|item| match item {
            serde_json::Value::Object(map) => Some(
                map.into_iter()
                    .map(|(k, v)| (k, FieldValue::from_json(v)))
                    .collect(),
            ),
            _ => None,
        })
        .collect();
    Ok(Table::from_records(records))
}

// days between 0001-01-01 and the unix epoch
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

fn timestamp_text(parsed: Option<DateTime<Utc>>) -> FieldValue {
    parsed.map_or(FieldValue::Null, |dt| {
        FieldValue::Text(dt.naive_utc().format("%Y-%m-%d %H:%M:%S%.f").to_string())
    })
}

fn parquet_cell(field: &Field) -> FieldValue {
    match field {
        Field::Null => FieldValue::Null,
        Field::Bool(b) => FieldValue::Boolean(*b),
        Field::Byte(i) => FieldValue::Integer(i64::from(*i)),
        Field::Short(i) => FieldValue::Integer(i64::from(*i)),
        Field::Int(i) => FieldValue::Integer(i64::from(*i)),
        Field::Long(i) => FieldValue::Integer(*i),
        Field::UByte(i) => FieldValue::Integer(i64::from(*i)),
        Field::UShort(i) => FieldValue::Integer(i64::from(*i)),
        Field::UInt(i) => FieldValue::Integer(i64::from(*i)),
        Field::Float(f) => FieldValue::Float(f64::from(*f)),
        Field::Double(f) => FieldValue::Float(*f),
        Field::Str(s) => FieldValue::Text(s.clone()),
        Field::Date(days) => days
            .checked_add(EPOCH_DAYS_FROM_CE)
            .and_then(NaiveDate::from_num_days_from_ce_opt)
            .map_or(FieldValue::Null, |d| {
                FieldValue::Text(d.format("%Y-%m-%d").to_string())
            }),
        Field::TimestampMillis(ms) => timestamp_text(DateTime::from_timestamp_millis(*ms)),
        Field::TimestampMicros(us) => timestamp_text(DateTime::from_timestamp_micros(*us)),
        other => FieldValue::Text(other.to_string()),
    }
}

/// Reads an orders parquet file row by row. Date and timestamp columns come
/// back as text so they pass through the timestamp normalizer like any other
/// source.
pub fn read_orders_parquet(path: &Path) -> Result<Table> {
    let file = File::open(path).with_context(|| format!("Opening {path:?}"))?;
    let reader = SerializedFileReader::new(file)
        .with_context(|| format!("Reading parquet footer of {path:?}"))?;
    let rows = reader
        .get_row_iter(None)
        .with_context(|| format!("Reading rows of {path:?}"))?;
    let mut records = Vec::new();
    for row in rows {
        let row = row.with_context(|| format!("Decoding a row of {path:?}"))?;
        records.push(
            row.get_column_iter()
                .map(|(name, field)| (name.clone(), parquet_cell(field)))
                .collect::<Vec<_>>(),
        );
    }
    debug!("Read {} parquet order row(s) from {path:?}", records.len());
    Ok(Table::from_records(records))
}

fn read_table(path: &Path, config: &PipelineConfig, encoding: &'static Encoding) -> Result<Table> {
    let delimiter = io_utils::resolve_input_delimiter(path, config.delimiter);
    io_utils::read_csv_table(path, delimiter, encoding)
        .with_context(|| format!("Reading {path:?}"))
}

/// Everything one dataset run produces.
#[derive(Debug, Clone)]
pub struct DatasetOutput {
    pub report: DatasetReport,
    pub users_reconciled: Table,
    pub orders_enriched: Table,
    pub transactions: Vec<EnrichedTransaction>,
    pub catalog: Catalog,
}

pub fn process_sources(sources: &DatasetSources, config: &PipelineConfig) -> Result<DatasetOutput> {
    let encoding = io_utils::resolve_encoding(config.input_encoding.as_deref())?;
    let mut users = read_table(&sources.users, config, encoding)?;
    let mut orders = match &sources.orders {
        OrdersSource::Csv(path) => read_table(path, config, encoding)?,
        OrdersSource::Json(path) => read_orders_json(path)?,
        OrdersSource::Parquet(path) => read_orders_parquet(path)?,
    };
    let catalog = catalog::load_catalog(&sources.catalog)
        .with_context(|| format!("Loading catalog {:?}", sources.catalog))?;

    info!(" users: ({}, {})", users.len(), users.width());
    info!(" orders: ({}, {})", orders.len(), orders.width());
    info!(" books: ({}, {})", catalog.len(), catalog.items().first().map_or(0, |i| i.entry.fields().len()));
    debug!(
        " sample authors: {:?}",
        catalog
            .items()
            .iter()
            .take(3)
            .map(|i| i.contributors.names())
            .collect::<Vec<_>>()
    );

    let records = identity::customer_records(&mut users);
    let identities = identity::resolve_identities(&records, &config.resolver_options());
    let users_reconciled = identity::reconciled_table(&users, &records, &identities);
    debug!(
        "{} customer row(s) resolved into {} cluster(s)",
        records.len(),
        identities.cluster_count()
    );

    let transactions = enrich::enrich_transactions(
        &mut orders,
        &identities,
        &catalog,
        &config.currency_rule(),
    );
    let orders_enriched = enrich::enriched_table(&orders, &transactions);
    let report = aggregate::summarize(
        &sources.name,
        &identities,
        &catalog,
        &transactions,
        config.top_days,
    );

    Ok(DatasetOutput {
        report,
        users_reconciled,
        orders_enriched,
        transactions,
        catalog,
    })
}

fn revenue_table(points: &[DailyRevenuePoint]) -> Table {
    Table::new(
        vec!["date".into(), "paid_price".into()],
        points
            .iter()
            .map(|p| {
                vec![
                    FieldValue::Text(p.date.format("%Y-%m-%d").to_string()),
                    FieldValue::Float(p.paid_price),
                ]
            })
            .collect(),
    )
}

pub fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value)?;
    fs::write(path, rendered).with_context(|| format!("Writing {path:?}"))
}

pub fn write_outputs(output: &DatasetOutput, out_dir: &Path) -> Result<()> {
    let name = &output.report.summary.dataset_name;
    let prefixed = |suffix: &str| out_dir.join(format!("{name}_{suffix}"));
    io_utils::write_csv_table(&prefixed("orders_enriched.csv"), &output.orders_enriched)?;
    io_utils::write_csv_table(&prefixed("users_reconciled.csv"), &output.users_reconciled)?;
    io_utils::write_csv_table(&prefixed("books_processed.csv"), &output.catalog.processed_table())?;
    io_utils::write_csv_table(
        &prefixed("daily_revenue.csv"),
        &revenue_table(&output.report.daily_revenue),
    )?;
    io_utils::write_csv_table(
        &prefixed("top5_days.csv"),
        &revenue_table(&output.report.summary.top5_days),
    )?;
    write_json(&prefixed("summary.json"), &output.report.summary)?;
    Ok(())
}

pub fn process_dataset_folder(dir: &Path, out_dir: &Path, config: &PipelineConfig) -> Result<DatasetReport> {
    let sources = locate_sources(dir)?;
    info!("Processing dataset: {}", sources.name);
    let output = process_sources(&sources, config)
        .with_context(|| format!("Processing dataset '{}'", sources.name))?;
    write_outputs(&output, out_dir)
        .with_context(|| format!("Writing outputs for dataset '{}'", sources.name))?;
    let summary = &output.report.summary;
    info!(
        "Finished {}: real_users={}, author_sets={}, popular_authors={:?}",
        summary.dataset_name,
        summary.unique_real_users,
        summary.unique_author_sets,
        summary.most_popular_authors
    );
    Ok(output.report)
}

/// Runs every dataset under `root`, writing per-dataset outputs plus
/// `all_summaries.json`. Fails only when nothing could be processed.
pub fn process_all(root: &Path, out_dir: &Path, config: &PipelineConfig) -> Result<Vec<Summary>> {
    let datasets = discover_datasets(root)?;
    fs::create_dir_all(out_dir).with_context(|| format!("Creating output folder {out_dir:?}"))?;

    let mut summaries = Vec::with_capacity(datasets.len());
    for dir in &datasets {
        match process_dataset_folder(dir, out_dir, config) {
            Ok(report) => summaries.push(report.summary),
            Err(err) => match err.downcast_ref::<LedgerError>() {
                Some(LedgerError::MissingSource { .. }) => warn!("Skipping {dir:?}: {err}"),
                _ => error!("ERROR processing {dir:?}: {err:#}"),
            },
        }
    }

    if summaries.is_empty() {
        return Err(LedgerError::NoProcessableDataset {
            root: root.to_path_buf(),
            attempted: datasets.len(),
        }
        .into());
    }
    write_json(&out_dir.join(ALL_SUMMARIES_FILE), &summaries)?;
    info!(
        "{} of {} dataset(s) processed. Outputs saved to {:?}",
        summaries.len(),
        datasets.len(),
        out_dir
    );
    Ok(summaries)
}

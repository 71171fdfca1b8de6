//! Turns the resolved transaction table into [`EnrichedTransaction`]s.

use chrono::{NaiveDate, NaiveDateTime};
use log::debug;

use crate::{
    catalog::{AttributionKey, Catalog},
    data::{FieldValue, Table},
    identity::IdentityMap,
    normalize::{self, CurrencyRule},
    schema::{self, ORDER_BOOK, ORDER_FIELDS, ORDER_PRICE, ORDER_QUANTITY, ORDER_TIMESTAMP, ORDER_USER},
};

#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedTransaction {
    pub user_id: Option<String>,
    pub book_id: Option<String>,
    pub quantity: u64,
    /// Unit price in the reference currency; `None` when unparseable.
    pub unit_price: Option<f64>,
    /// `quantity × unit_price` rounded to cents; `None` when the price is.
    pub paid_price: Option<f64>,
    pub timestamp: Option<NaiveDateTime>,
    pub cluster_id: Option<String>,
    pub contributors: Vec<String>,
    pub attribution_key: AttributionKey,
}

impl EnrichedTransaction {
    pub fn date(&self) -> Option<NaiveDate> {
        self.timestamp.map(|ts| ts.date())
    }

    /// Paid amount with a missing price counted as zero. Only aggregation
    /// should use this.
    pub fn paid_or_zero(&self) -> f64 {
        self.paid_price.unwrap_or(0.0)
    }
}

/// Resolves the order columns in place and enriches every row.
pub fn enrich_transactions(
    orders: &mut Table,
    identities: &IdentityMap,
    catalog: &Catalog,
    currency: &CurrencyRule,
) -> Vec<EnrichedTransaction> {
    let resolved = schema::resolve_columns(orders, ORDER_FIELDS);
    debug!(
        "Order columns: {}",
        resolved
            .iter()
            .map(|f| format!("{}={}", f.canonical, f.source.as_deref().unwrap_or("-")))
            .collect::<Vec<_>>()
            .join(", ")
    );

    let user_col = orders.column_index(ORDER_USER.canonical);
    let qty_col = orders.column_index(ORDER_QUANTITY.canonical);
    let price_col = orders.column_index(ORDER_PRICE.canonical);
    let ts_col = orders.column_index(ORDER_TIMESTAMP.canonical);
    let book_col = orders.column_index(ORDER_BOOK.canonical);

    orders
        .rows()
        .iter()
        .map(|row| {
            let user_id = user_col.and_then(|idx| row[idx].as_key());
            let book_id = book_col.and_then(|idx| row[idx].as_key());
            let quantity = match qty_col {
                Some(idx) => normalize::normalize_quantity(&row[idx]),
                None => 1,
            };
            let unit_price = match price_col {
                Some(idx) => normalize::normalize_price(&row[idx], currency),
                None => Some(0.0),
            };
            let paid_price = unit_price.map(|price| normalize::round2(quantity as f64 * price));
            let timestamp = ts_col.and_then(|idx| normalize::normalize_timestamp(&row[idx]));
            let cluster_id = user_id.as_deref().map(|id| {
                identities
                    .cluster_of(id)
                    .unwrap_or(id)
                    .to_string()
            });
            let (contributors, attribution_key) = catalog.attribution_for(book_id.as_deref());
            EnrichedTransaction {
                user_id,
                book_id,
                quantity,
                unit_price,
                paid_price,
                timestamp,
                cluster_id,
                contributors,
                attribution_key,
            }
        })
        .collect()
}

/// The resolved order table with the derived columns appended, written as
/// `<dataset>_orders_enriched.csv`.
pub fn enriched_table(orders: &Table, transactions: &[EnrichedTransaction]) -> Table {
    fn opt_text(value: Option<String>) -> FieldValue {
        value.map(FieldValue::Text).unwrap_or(FieldValue::Null)
    }

    let mut table = orders.clone();
    let quantity = derived(transactions, |t| FieldValue::Integer(t.quantity as i64));
    let unit_price = derived(transactions, |t| {
        t.unit_price.map(FieldValue::Float).unwrap_or(FieldValue::Null)
    });
    let paid = derived(transactions, |t| {
        t.paid_price.map(FieldValue::Float).unwrap_or(FieldValue::Null)
    });
    let parsed = derived(transactions, |t| {
        opt_text(t.timestamp.map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string()))
    });
    let date = derived(transactions, |t| {
        opt_text(t.date().map(|d| d.format("%Y-%m-%d").to_string()))
    });
    let cluster = derived(transactions, |t| opt_text(t.cluster_id.clone()));
    let authors = derived(transactions, |t| FieldValue::Text(t.contributors.join("; ")));
    let key = derived(transactions, |t| FieldValue::Text(t.attribution_key.to_string()));

    table.set_column("quantity", quantity);
    table.set_column("unit_price_clean", unit_price);
    table.set_column("paid_price", paid);
    table.set_column("timestamp_parsed", parsed);
    table.set_column("date", date);
    table.set_column("cluster_id", cluster);
    table.set_column("authors", authors);
    table.set_column("author_set", key);
    table
}

fn derived<F>(transactions: &[EnrichedTransaction], f: F) -> Vec<FieldValue>
where
    F: Fn(&EnrichedTransaction) -> FieldValue,
{
    transactions.iter().map(f).collect()
}

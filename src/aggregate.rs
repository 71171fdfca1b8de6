//! Time-series and ranked summaries over one dataset.
//!
//! Tie-breaks differ on purpose between rankings:
//!
//! - top revenue days: stable descending sort, so equal amounts keep date order
//! - most frequent contributors and most sold attribution keys: every entry
//!   tied at the maximum, in first-seen order
//! - top spender: the first cluster (in transaction order) reaching the
//!   maximum, with no tie list

use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::Hash;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    catalog::{Catalog, Contributors},
    enrich::EnrichedTransaction,
    identity::IdentityMap,
    normalize::round2,
};

pub const DEFAULT_TOP_DAYS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyRevenuePoint {
    pub date: NaiveDate,
    pub paid_price: f64,
}

/// Read-only snapshot handed to downstream reporting. Field names are part
/// of the output contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub dataset_name: String,
    pub top5_days: Vec<DailyRevenuePoint>,
    pub unique_real_users: usize,
    pub unique_author_sets: usize,
    pub most_popular_author_sets: Vec<Vec<String>>,
    pub most_popular_authors: Vec<String>,
    pub top_customer_cluster_id: Option<String>,
    pub top_customer_user_ids: Vec<String>,
    pub top_customer_total_spent: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetReport {
    pub summary: Summary,
    pub daily_revenue: Vec<DailyRevenuePoint>,
}

/// Sums per key while remembering the order keys were first seen in.
struct OrderedTally<K> {
    order: Vec<K>,
    totals: HashMap<K, f64>,
}

impl<K: Clone + Eq + Hash> OrderedTally<K> {
    fn new() -> Self {
        Self {
            order: Vec::new(),
            totals: HashMap::new(),
        }
    }

    fn add(&mut self, key: K, amount: f64) {
        match self.totals.get_mut(&key) {
            Some(total) => *total += amount,
            None => {
                self.order.push(key.clone());
                self.totals.insert(key, amount);
            }
        }
    }

    fn entries(&self) -> impl Iterator<Item = (&K, f64)> {
        self.order.iter().map(|k| (k, self.totals[k]))
    }

    fn max(&self) -> Option<f64> {
        self.entries().map(|(_, v)| v).reduce(f64::max)
    }

    /// Every key tied at the maximum, in first-seen order.
    fn all_max(&self) -> Vec<K> {
        match self.max() {
            Some(max) => self
                .entries()
                .filter(|(_, v)| *v == max)
                .map(|(k, _)| k.clone())
                .collect(),
            None => Vec::new(),
        }
    }

    /// The first key reaching the maximum.
    fn first_max(&self) -> Option<(K, f64)> {
        let mut best: Option<(&K, f64)> = None;
        for (key, value) in self.entries() {
            if best.is_none_or(|(_, b)| value > b) {
                best = Some((key, value));
            }
        }
        best.map(|(k, v)| (k.clone(), v))
    }
}

/// Revenue per calendar day, ascending. Undated transactions are left out;
/// unparseable prices count as zero.
pub fn daily_revenue(transactions: &[EnrichedTransaction]) -> Vec<DailyRevenuePoint> {
    let mut by_day: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for tx in transactions {
        if let Some(date) = tx.date() {
            *by_day.entry(date).or_insert(0.0) += tx.paid_or_zero();
        }
    }
    by_day
        .into_iter()
        .map(|(date, total)| DailyRevenuePoint {
            date,
            paid_price: round2(total),
        })
        .collect()
}

pub fn top_days(series: &[DailyRevenuePoint], limit: usize) -> Vec<DailyRevenuePoint> {
    let mut ranked = series.to_vec();
    ranked.sort_by(|a, b| b.paid_price.total_cmp(&a.paid_price));
    ranked.truncate(limit);
    ranked
}

/// Distinct non-empty attribution keys across the catalog.
pub fn unique_attribution_keys(catalog: &Catalog) -> usize {
    catalog
        .items()
        .iter()
        .map(|item| &item.attribution_key)
        .filter(|key| !key.is_empty())
        .collect::<HashSet<_>>()
        .len()
}

/// Contributors appearing in the most catalog entries, all ties included.
/// When no named contributor exists at all, a non-empty catalog falls back
/// to the first contributor of its first entry.
pub fn most_frequent_contributors(catalog: &Catalog) -> Vec<String> {
    let mut tally = OrderedTally::new();
    for item in catalog.items() {
        if let Contributors::Named(names) = &item.contributors {
            for name in names.iter().filter(|n| !n.is_empty()) {
                tally.add(name.clone(), 1.0);
            }
        }
    }
    let winners = tally.all_max();
    if !winners.is_empty() {
        return winners;
    }
    catalog
        .items()
        .first()
        .and_then(|item| item.contributors.names().first().map(|n| n.to_string()))
        .into_iter()
        .collect()
}

/// Attribution keys with the highest summed quantity, all ties included.
/// Transactions without a key are ignored.
pub fn most_sold_attribution_keys(transactions: &[EnrichedTransaction]) -> Vec<Vec<String>> {
    let mut tally = OrderedTally::new();
    for tx in transactions.iter().filter(|t| !t.attribution_key.is_empty()) {
        tally.add(tx.attribution_key.clone(), tx.quantity as f64);
    }
    tally
        .all_max()
        .into_iter()
        .map(|key| key.into_names())
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopSpender {
    pub cluster_id: String,
    pub user_ids: Vec<String>,
    pub total_spent: f64,
}

pub fn top_spender(transactions: &[EnrichedTransaction], identities: &IdentityMap) -> Option<TopSpender> {
    let mut tally = OrderedTally::new();
    for tx in transactions {
        if let Some(cluster) = &tx.cluster_id {
            tally.add(cluster.clone(), tx.paid_or_zero());
        }
    }
    let (cluster_id, total) = tally.first_max()?;
    let user_ids = identities
        .members(&cluster_id)
        .map(<[String]>::to_vec)
        .unwrap_or_else(|| vec![cluster_id.clone()]);
    Some(TopSpender {
        cluster_id,
        user_ids,
        total_spent: round2(total),
    })
}

pub fn summarize(
    dataset_name: &str,
    identities: &IdentityMap,
    catalog: &Catalog,
    transactions: &[EnrichedTransaction],
    top_n: usize,
) -> DatasetReport {
    let daily = daily_revenue(transactions);
    let spender = top_spender(transactions, identities);
    let summary = Summary {
        dataset_name: dataset_name.to_string(),
        top5_days: top_days(&daily, top_n),
        unique_real_users: identities.cluster_count(),
        unique_author_sets: unique_attribution_keys(catalog),
        most_popular_author_sets: most_sold_attribution_keys(transactions),
        most_popular_authors: most_frequent_contributors(catalog),
        top_customer_cluster_id: spender.as_ref().map(|s| s.cluster_id.clone()),
        top_customer_user_ids: spender
            .as_ref()
            .map(|s| s.user_ids.clone())
            .unwrap_or_default(),
        top_customer_total_spent: spender.map(|s| s.total_spent).unwrap_or(0.0),
    };
    DatasetReport {
        summary,
        daily_revenue: daily,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AttributionKey, CatalogEntry};
    use crate::data::FieldValue;
    use crate::identity::{CustomerRecord, ResolverOptions, resolve_identities};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn tx(cluster: &str, day_of_month: Option<u32>, qty: u64, paid: Option<f64>, key: &[&str]) -> EnrichedTransaction {
        EnrichedTransaction {
            user_id: Some(cluster.to_string()),
            book_id: None,
            quantity: qty,
            unit_price: paid.map(|p| p / qty.max(1) as f64),
            paid_price: paid,
            timestamp: day_of_month.and_then(|d| day(d).and_hms_opt(12, 0, 0)),
            cluster_id: Some(cluster.to_string()),
            contributors: key.iter().map(|s| s.to_string()).collect(),
            attribution_key: AttributionKey::from_names(key),
        }
    }

    fn catalog(authors: &[&str]) -> Catalog {
        Catalog::from_entries(
            authors
                .iter()
                .enumerate()
                .map(|(i, a)| {
                    CatalogEntry::new(vec![
                        ("id".into(), FieldValue::Integer(i as i64)),
                        ("author".into(), FieldValue::Text(a.to_string())),
                    ])
                })
                .collect(),
        )
    }

    #[test]
    fn daily_revenue_excludes_undated_and_zeroes_missing_prices() {
        let txs = vec![
            tx("a", Some(2), 1, Some(5.0), &[]),
            tx("a", Some(1), 1, Some(2.5), &[]),
            tx("b", Some(2), 1, None, &[]),
            tx("b", None, 1, Some(100.0), &[]),
        ];
        let series = daily_revenue(&txs);
        assert_eq!(
            series,
            vec![
                DailyRevenuePoint { date: day(1), paid_price: 2.5 },
                DailyRevenuePoint { date: day(2), paid_price: 5.0 },
            ]
        );
    }

    #[test]
    fn top_days_keeps_date_order_for_ties() {
        let series = vec![
            DailyRevenuePoint { date: day(1), paid_price: 10.0 },
            DailyRevenuePoint { date: day(2), paid_price: 30.0 },
            DailyRevenuePoint { date: day(3), paid_price: 10.0 },
            DailyRevenuePoint { date: day(4), paid_price: 5.0 },
        ];
        let top = top_days(&series, 3);
        let dates: Vec<_> = top.iter().map(|p| p.date).collect();
        assert_eq!(dates, vec![day(2), day(1), day(3)]);
    }

    #[test]
    fn most_frequent_contributors_returns_all_ties() {
        let catalog = catalog(&["Ann", "Bob", "Ann, Cy", "Bob", "Dee"]);
        assert_eq!(most_frequent_contributors(&catalog), vec!["Ann", "Bob"]);
    }

    #[test]
    fn most_frequent_contributors_falls_back_to_first_entry() {
        let catalog = Catalog::from_entries(vec![CatalogEntry::new(vec![(
            "title".into(),
            FieldValue::Text("Anonymous".into()),
        )])]);
        assert_eq!(
            most_frequent_contributors(&catalog),
            vec![crate::catalog::UNKNOWN_CONTRIBUTOR]
        );
        assert!(most_frequent_contributors(&Catalog::default()).is_empty());
    }

    #[test]
    fn unique_keys_ignore_order_and_placeholders() {
        let catalog = Catalog::from_entries(vec![
            CatalogEntry::new(vec![("author".into(), FieldValue::Text("A, B".into()))]),
            CatalogEntry::new(vec![("author".into(), FieldValue::Text("B & A".into()))]),
            CatalogEntry::new(vec![("author".into(), FieldValue::Text("C".into()))]),
            CatalogEntry::new(vec![("title".into(), FieldValue::Text("?".into()))]),
        ]);
        assert_eq!(unique_attribution_keys(&catalog), 2);
    }

    #[test]
    fn most_sold_keys_include_ties() {
        let txs = vec![
            tx("a", Some(1), 2, Some(1.0), &["Bob", "Ann"]),
            tx("a", Some(1), 1, Some(1.0), &["Cy"]),
            tx("b", Some(1), 1, Some(1.0), &["Cy"]),
            tx("b", Some(1), 9, Some(1.0), &[]),
        ];
        assert_eq!(
            most_sold_attribution_keys(&txs),
            vec![vec!["Ann".to_string(), "Bob".to_string()], vec!["Cy".to_string()]]
        );
    }

    #[test]
    fn top_spender_takes_first_cluster_on_ties() {
        let identities = resolve_identities(
            &[
                CustomerRecord::new("a", "A", "a@x", "1", ""),
                CustomerRecord::new("b", "B", "b@x", "2", ""),
            ],
            &ResolverOptions::default(),
        );
        let txs = vec![
            tx("b", Some(1), 1, Some(10.0), &[]),
            tx("a", Some(1), 1, Some(10.0), &[]),
            tx("z", Some(1), 1, Some(4.0), &[]),
        ];
        let top = top_spender(&txs, &identities).unwrap();
        assert_eq!(top.cluster_id, "b");
        assert_eq!(top.user_ids, vec!["b".to_string()]);
        assert_eq!(top.total_spent, 10.0);
    }

    #[test]
    fn empty_inputs_yield_empty_summary_fields() {
        let report = summarize(
            "EMPTY",
            &IdentityMap::default(),
            &Catalog::default(),
            &[],
            DEFAULT_TOP_DAYS,
        );
        let summary = report.summary;
        assert!(report.daily_revenue.is_empty());
        assert!(summary.top5_days.is_empty());
        assert_eq!(summary.unique_real_users, 0);
        assert_eq!(summary.unique_author_sets, 0);
        assert!(summary.most_popular_author_sets.is_empty());
        assert!(summary.most_popular_authors.is_empty());
        assert_eq!(summary.top_customer_cluster_id, None);
        assert!(summary.top_customer_user_ids.is_empty());
        assert_eq!(summary.top_customer_total_spent, 0.0);
    }

    #[test]
    fn summary_serializes_dates_as_iso_strings() {
        let point = DailyRevenuePoint { date: day(15), paid_price: 12.5 };
        let json = serde_json::to_value(point).unwrap();
        assert_eq!(json["date"], "2024-01-15");
        assert_eq!(json["paid_price"], 12.5);
    }
}

//! Customer identity resolution.
//!
//! Customer rows are clustered with a disjoint-set forest: two rows are
//! unioned when at least `threshold` of their four attributes (name, email,
//! phone, address) are non-blank and equal after trimming and lowercasing.
//! Clusters are the transitive closure of those pairwise matches, so the
//! partition never depends on the order rows are compared in. Only the root
//! label a cluster ends up with can vary.
//!
//! Two candidate-pair generators are available. [`CandidateStrategy::Pairwise`]
//! compares every pair (O(N²)). [`CandidateStrategy::Blocked`] only compares
//! rows sharing a non-blank email or phone; with a threshold of three or more
//! any qualifying pair must agree on at least one of those two fields, so the
//! partition is identical.

use std::collections::{HashMap, HashSet};

use log::debug;

use crate::{
    data::{FieldValue, Table},
    schema::{self, CUSTOMER_FIELDS},
};

pub const ATTRIBUTE_NAMES: [&str; 4] = ["name", "email", "phone", "address"];
pub const DEFAULT_MATCH_THRESHOLD: usize = 3;

const EMAIL: usize = 1;
const PHONE: usize = 2;

/// One customer row reduced to its identifier and comparison attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerRecord {
    pub id: String,
    attributes: [String; 4],
}

impl CustomerRecord {
    pub fn new(id: impl Into<String>, name: &str, email: &str, phone: &str, address: &str) -> Self {
        Self {
            id: id.into(),
            attributes: [name, email, phone, address].map(|v| v.trim().to_lowercase()),
        }
    }

    pub fn attributes(&self) -> &[String; 4] {
        &self.attributes
    }

    /// Number of attribute positions where both values are present and equal.
    pub fn matching_attributes(&self, other: &CustomerRecord) -> usize {
        self.attributes
            .iter()
            .zip(other.attributes.iter())
            .filter(|(a, b)| !a.is_empty() && a == b)
            .count()
    }
}

/// Index-based disjoint-set forest with path compression.
#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    pub fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
        }
    }

    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    /// Attaches `b`'s tree under `a`'s root. Returns `false` when both were
    /// already in the same set.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return false;
        }
        self.parent[rb] = ra;
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CandidateStrategy {
    #[default]
    Pairwise,
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverOptions {
    pub threshold: usize,
    pub strategy: CandidateStrategy,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
            strategy: CandidateStrategy::Pairwise,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    pub root: String,
    pub members: Vec<String>,
}

/// Result of identity resolution: every identifier's cluster root and the
/// clusters themselves, ordered by first appearance.
#[derive(Debug, Clone, Default)]
pub struct IdentityMap {
    cluster_of: HashMap<String, String>,
    clusters: Vec<Cluster>,
    by_root: HashMap<String, usize>,
}

impl IdentityMap {
    pub fn cluster_of(&self, id: &str) -> Option<&str> {
        self.cluster_of.get(id).map(String::as_str)
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    pub fn members(&self, root: &str) -> Option<&[String]> {
        self.by_root
            .get(root)
            .map(|idx| self.clusters[*idx].members.as_slice())
    }

    /// Membership sets with root labels erased, for comparing partitions.
    pub fn partition(&self) -> HashSet<Vec<String>> {
        self.clusters
            .iter()
            .map(|c| {
                let mut members = c.members.clone();
                members.sort();
                members
            })
            .collect()
    }
}

pub fn resolve_identities(records: &[CustomerRecord], options: &ResolverOptions) -> IdentityMap {
    let mut slots: Vec<&str> = Vec::new();
    let mut slot_of: HashMap<&str, usize> = HashMap::new();
    let record_slots: Vec<usize> = records
        .iter()
        .map(|record| {
            *slot_of.entry(record.id.as_str()).or_insert_with(|| {
                slots.push(record.id.as_str());
                slots.len() - 1
            })
        })
        .collect();

    let mut forest = UnionFind::new(slots.len());
    let threshold = options.threshold.max(1);
    let mut unions = 0usize;
    let mut visit = |i: usize, j: usize| {
        if records[i].matching_attributes(&records[j]) >= threshold
            && forest.union(record_slots[i], record_slots[j])
        {
            unions += 1;
        }
    };
    match options.strategy {
        CandidateStrategy::Blocked if threshold >= 3 => {
            for (i, j) in blocked_pairs(records) {
                visit(i, j);
            }
        }
        strategy => {
            if strategy == CandidateStrategy::Blocked {
                debug!("Blocking needs a threshold of at least 3; comparing all pairs");
            }
            for i in 0..records.len() {
                for j in (i + 1)..records.len() {
                    visit(i, j);
                }
            }
        }
    }
    debug!(
        "Resolved {} customer row(s) with {} union(s)",
        records.len(),
        unions
    );

    let mut map = IdentityMap::default();
    for (slot, id) in slots.iter().enumerate() {
        let root = slots[forest.find(slot)].to_string();
        map.cluster_of.insert((*id).to_string(), root.clone());
        match map.by_root.get(&root) {
            Some(idx) => map.clusters[*idx].members.push((*id).to_string()),
            None => {
                map.by_root.insert(root.clone(), map.clusters.len());
                map.clusters.push(Cluster {
                    root,
                    members: vec![(*id).to_string()],
                });
            }
        }
    }
    map
}

/// Pairs `(i, j)` with `i < j` that share a non-blank email or phone.
fn blocked_pairs(records: &[CustomerRecord]) -> Vec<(usize, usize)> {
    let mut blocks: HashMap<(usize, &str), Vec<usize>> = HashMap::new();
    for (idx, record) in records.iter().enumerate() {
        for attribute in [EMAIL, PHONE] {
            let value = record.attributes[attribute].as_str();
            if !value.is_empty() {
                blocks.entry((attribute, value)).or_default().push(idx);
            }
        }
    }
    let mut seen = HashSet::new();
    let mut pairs = Vec::new();
    for members in blocks.values() {
        for (pos, &i) in members.iter().enumerate() {
            for &j in &members[pos + 1..] {
                if seen.insert((i, j)) {
                    pairs.push((i, j));
                }
            }
        }
    }
    pairs.sort_unstable();
    pairs
}

/// Extracts customer records from a users table, resolving column names
/// first. Rows without an identifier column use their 0-based row index.
pub fn customer_records(table: &mut Table) -> Vec<CustomerRecord> {
    let resolved = schema::resolve_columns(table, CUSTOMER_FIELDS);
    let has_id = resolved[0].is_present();
    let columns: Vec<Option<usize>> = ATTRIBUTE_NAMES
        .iter()
        .map(|name| table.column_index(name))
        .collect();
    let id_column = table.column_index(schema::CUSTOMER_ID.canonical);

    table
        .rows()
        .iter()
        .enumerate()
        .map(|(row_idx, row)| {
            let id = match id_column {
                Some(idx) if has_id => row[idx].as_display().trim().to_string(),
                _ => row_idx.to_string(),
            };
            let attr = |pos: usize| -> String {
                columns[pos]
                    .map(|idx| row[idx].as_display())
                    .unwrap_or_default()
            };
            CustomerRecord::new(id, &attr(0), &attr(1), &attr(2), &attr(3))
        })
        .collect()
}

/// Users table with a `cluster_id` column appended.
pub fn reconciled_table(table: &Table, records: &[CustomerRecord], map: &IdentityMap) -> Table {
    let mut out = table.clone();
    let cluster_ids = records
        .iter()
        .map(|r| {
            map.cluster_of(&r.id)
                .map(|root| FieldValue::Text(root.to_string()))
                .unwrap_or(FieldValue::Null)
        })
        .collect();
    out.set_column("cluster_id", cluster_ids);
    out
}

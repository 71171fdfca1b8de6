//! Plain-text rendering of summaries and clusters for the terminal.

use std::fmt::Write as _;

use itertools::Itertools;

use crate::{aggregate::Summary, identity::IdentityMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
}

fn render_grid(headers: &[&str], align: &[Align], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(widths.len()) {
            widths[idx] = widths[idx].max(cell.chars().count());
        }
    }

    let line = |cells: &mut dyn Iterator<Item = &str>| -> String {
        cells
            .zip(widths.iter().zip(align))
            .map(|(cell, (&width, align))| match align {
                Align::Left => format!("{cell:<width$}"),
                Align::Right => format!("{cell:>width$}"),
            })
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = String::new();
    let _ = writeln!(out, "{}", line(&mut headers.iter().copied()));
    let _ = writeln!(
        out,
        "{}",
        widths.iter().map(|w| "-".repeat(*w)).join("  ")
    );
    for row in rows {
        let _ = writeln!(out, "{}", line(&mut row.iter().map(String::as_str)));
    }
    out
}

pub fn render_summaries(summaries: &[Summary]) -> String {
    let rows = summaries
        .iter()
        .map(|s| {
            vec![
                s.dataset_name.clone(),
                s.unique_real_users.to_string(),
                s.unique_author_sets.to_string(),
                s.most_popular_authors.join(", "),
                s.top_customer_user_ids.join(", "),
                format!("{:.2}", s.top_customer_total_spent),
                s.top5_days
                    .first()
                    .map(|p| format!("{} ({:.2})", p.date.format("%Y-%m-%d"), p.paid_price))
                    .unwrap_or_default(),
            ]
        })
        .collect::<Vec<_>>();
    render_grid(
        &[
            "dataset",
            "real_users",
            "author_sets",
            "popular_authors",
            "top_customer",
            "spent",
            "best_day",
        ],
        &[
            Align::Left,
            Align::Right,
            Align::Right,
            Align::Left,
            Align::Left,
            Align::Right,
            Align::Left,
        ],
        &rows,
    )
}

/// Lists clusters with more than one member unless `include_singletons`.
pub fn render_clusters(identities: &IdentityMap, include_singletons: bool) -> String {
    let rows = identities
        .clusters()
        .iter()
        .filter(|c| include_singletons || c.members.len() > 1)
        .map(|c| {
            vec![
                c.root.clone(),
                c.members.len().to_string(),
                c.members.join(", "),
            ]
        })
        .collect::<Vec<_>>();
    render_grid(
        &["cluster_id", "size", "members"],
        &[Align::Left, Align::Right, Align::Left],
        &rows,
    )
}

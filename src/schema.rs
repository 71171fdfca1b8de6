//! Column-name resolution for loosely structured inputs.
//!
//! Each source names the same concept differently (`qty`, `Quantity`,
//! `count`...). A [`FieldSynonyms`] lists the accepted spellings for one
//! canonical field in priority order; [`resolve_columns`] renames whatever
//! matched so later stages only ever see the canonical vocabulary.
//!
//! Matching is two-tier: an exact, case-sensitive hit on any candidate wins
//! over a case-insensitive hit, and within a tier candidate order decides.
//! A field nobody matches is simply absent; the normalizers supply defaults.

use log::debug;

use crate::data::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSynonyms {
    pub canonical: &'static str,
    pub candidates: &'static [&'static str],
}

pub const ORDER_USER: FieldSynonyms = FieldSynonyms {
    canonical: "user_id",
    candidates: &["user_id", "user", "customer_id", "customer", "userId", "id"],
};

pub const ORDER_QUANTITY: FieldSynonyms = FieldSynonyms {
    canonical: "quantity",
    candidates: &["quantity", "qty", "count"],
};

pub const ORDER_PRICE: FieldSynonyms = FieldSynonyms {
    canonical: "unit_price",
    candidates: &["unit_price", "price", "unitprice", "amount"],
};

pub const ORDER_TIMESTAMP: FieldSynonyms = FieldSynonyms {
    canonical: "timestamp_raw",
    candidates: &[
        "timestamp",
        "order_ts",
        "created_at",
        "order_date",
        "date",
        "time",
    ],
};

pub const ORDER_BOOK: FieldSynonyms = FieldSynonyms {
    canonical: "book_id",
    candidates: &["book_id", "isbn", "sku", "product_id", "book"],
};

pub const ORDER_FIELDS: &[FieldSynonyms] = &[
    ORDER_USER,
    ORDER_QUANTITY,
    ORDER_PRICE,
    ORDER_TIMESTAMP,
    ORDER_BOOK,
];

pub const CATALOG_ID: FieldSynonyms = FieldSynonyms {
    canonical: "book_id",
    candidates: &["book_id", "id", "isbn", "sku"],
};

pub const CUSTOMER_ID: FieldSynonyms = FieldSynonyms {
    canonical: "user_id",
    candidates: &["user_id", "id"],
};

pub const CUSTOMER_NAME: FieldSynonyms = FieldSynonyms {
    canonical: "name",
    candidates: &["name", "full_name"],
};

pub const CUSTOMER_EMAIL: FieldSynonyms = FieldSynonyms {
    canonical: "email",
    candidates: &["email", "e_mail", "mail"],
};

pub const CUSTOMER_PHONE: FieldSynonyms = FieldSynonyms {
    canonical: "phone",
    candidates: &["phone", "phone_number", "telephone"],
};

pub const CUSTOMER_ADDRESS: FieldSynonyms = FieldSynonyms {
    canonical: "address",
    candidates: &["address", "street_address"],
};

pub const CUSTOMER_FIELDS: &[FieldSynonyms] = &[
    CUSTOMER_ID,
    CUSTOMER_NAME,
    CUSTOMER_EMAIL,
    CUSTOMER_PHONE,
    CUSTOMER_ADDRESS,
];

/// Returns the first available column matching `candidates`, preferring an
/// exact match over a case-insensitive one.
pub fn pick_column<'a, S>(columns: &'a [S], candidates: &[&str]) -> Option<&'a str>
where
    S: AsRef<str>,
{
    for candidate in candidates {
        if let Some(found) = columns.iter().find(|c| c.as_ref() == *candidate) {
            return Some(found.as_ref());
        }
    }
    for candidate in candidates {
        if let Some(found) = columns
            .iter()
            .find(|c| c.as_ref().eq_ignore_ascii_case(candidate))
        {
            return Some(found.as_ref());
        }
    }
    None
}

/// Outcome of resolving one canonical field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedField {
    pub canonical: &'static str,
    pub source: Option<String>,
}

impl ResolvedField {
    pub fn is_present(&self) -> bool {
        self.source.is_some()
    }
}

/// Renames every matched column to its canonical name. All matches are
/// computed against the original headers before any rename happens, so one
/// field's rename never changes what another field matches.
pub fn resolve_columns(table: &mut Table, fields: &[FieldSynonyms]) -> Vec<ResolvedField> {
    let original = table.headers().to_vec();
    let mut resolved = Vec::with_capacity(fields.len());
    let mut claimed: Vec<usize> = Vec::new();
    let mut renames: Vec<(usize, &'static str)> = Vec::new();

    for field in fields {
        let source = pick_column(&original, field.candidates).and_then(|name| {
            let idx = original.iter().position(|h| h == name)?;
            if claimed.contains(&idx) {
                return None;
            }
            claimed.push(idx);
            renames.push((idx, field.canonical));
            Some(name.to_string())
        });
        match &source {
            Some(name) if name != field.canonical => {
                debug!("Resolved '{}' from column '{}'", field.canonical, name)
            }
            Some(_) => {}
            None => debug!("No column found for '{}'", field.canonical),
        }
        resolved.push(ResolvedField {
            canonical: field.canonical,
            source,
        });
    }

    for (idx, canonical) in renames {
        table.rename_column(idx, canonical);
    }
    resolved
}

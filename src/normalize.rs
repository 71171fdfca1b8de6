//! Price, timestamp and quantity normalization.
//!
//! None of these functions fail. An unparseable price is `None`
//! (not-a-number) and an unparseable timestamp is `None` (not-a-time); both
//! travel row-wise through the pipeline and are only resolved at the
//! aggregation boundary.

use std::sync::OnceLock;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use regex::Regex;

use crate::data::FieldValue;

/// Identifies prices quoted in the secondary currency and converts them to
/// the reference currency.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrencyRule {
    pub rate: f64,
    pub symbols: Vec<String>,
    pub codes: Vec<String>,
}

impl CurrencyRule {
    pub fn new(rate: f64, symbols: Vec<String>, codes: Vec<String>) -> Self {
        let codes = codes.into_iter().map(|c| c.to_lowercase()).collect();
        Self {
            rate,
            symbols,
            codes,
        }
    }

    pub fn eur(rate: f64) -> Self {
        Self::new(rate, vec!["€".to_string()], vec!["eur".to_string()])
    }

    pub fn is_foreign(&self, raw: &str) -> bool {
        if self.symbols.iter().any(|s| raw.contains(s.as_str())) {
            return true;
        }
        let lowered = raw.to_lowercase();
        self.codes.iter().any(|c| lowered.contains(c.as_str()))
    }
}

pub fn normalize_price(value: &FieldValue, currency: &CurrencyRule) -> Option<f64> {
    match value {
        FieldValue::Integer(i) => Some(*i as f64),
        FieldValue::Float(f) if f.is_nan() => None,
        FieldValue::Float(f) => Some(*f),
        FieldValue::Text(s) => normalize_price_str(s, currency),
        FieldValue::Boolean(_) | FieldValue::List(_) | FieldValue::Null => None,
    }
}

pub fn normalize_price_str(raw: &str, currency: &CurrencyRule) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let foreign = currency.is_foreign(trimmed);
    let mut cleaned: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .collect();
    let commas = cleaned.matches(',').count();
    let dots = cleaned.matches('.').count();
    if commas == 1 && dots == 0 {
        cleaned = cleaned.replace(',', ".");
    } else {
        cleaned.retain(|c| c != ',');
    }
    let parsed = cleaned.parse::<f64>().ok()?;
    if foreign {
        Some(parsed * currency.rate)
    } else {
        Some(parsed)
    }
}

struct TimestampPatterns {
    meridiem: Regex,
    trailing_m: Regex,
    whitespace: Regex,
}

fn patterns() -> &'static TimestampPatterns {
    static PATTERNS: OnceLock<TimestampPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| TimestampPatterns {
        meridiem: Regex::new(r"(?i)\b([ap])(?:\.\s?)?m\b\.?").expect("valid meridiem pattern"),
        trailing_m: Regex::new(r"\bM\.$").expect("valid trailing marker pattern"),
        whitespace: Regex::new(r"\s+").expect("valid whitespace pattern"),
    })
}

/// Rewrites meridiem spellings (`a.m.`, `P.M`, `pm`) to `AM`/`PM`, drops a
/// trailing lone `M.`, turns commas into spaces and collapses whitespace.
pub fn clean_timestamp(raw: &str) -> String {
    let patterns = patterns();
    let text = raw.trim();
    let text = patterns
        .meridiem
        .replace_all(text, |caps: &regex::Captures<'_>| {
            format!("{}M", caps[1].to_ascii_uppercase())
        });
    let text = patterns.trailing_m.replace(&text, "");
    let text = text.replace(',', " ");
    patterns
        .whitespace
        .replace_all(&text, " ")
        .trim()
        .to_string()
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %I:%M:%S %p",
    "%Y-%m-%d %I:%M %p",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d/%m/%Y %I:%M:%S %p",
    "%d/%m/%Y %I:%M %p",
    "%m/%d/%y %H:%M:%S",
    "%m/%d/%y %H:%M",
    "%m/%d/%y %I:%M:%S %p",
    "%m/%d/%y %I:%M %p",
    "%d/%m/%y %H:%M:%S",
    "%d/%m/%y %H:%M",
    "%d/%m/%y %I:%M %p",
    "%m-%d-%Y %H:%M:%S",
    "%m-%d-%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
    "%B %d %Y %H:%M:%S",
    "%B %d %Y %H:%M",
    "%B %d %Y %I:%M:%S %p",
    "%B %d %Y %I:%M %p",
    "%b %d %Y %H:%M:%S",
    "%b %d %Y %H:%M",
    "%b %d %Y %I:%M:%S %p",
    "%b %d %Y %I:%M %p",
    "%d %B %Y %H:%M:%S",
    "%d %B %Y %H:%M",
    "%d %b %Y %H:%M:%S",
    "%d %b %Y %H:%M",
    "%d %B %Y %I:%M %p",
    "%d %b %Y %I:%M %p",
    "%A %B %d %Y %H:%M:%S",
    "%A %B %d %Y %H:%M",
    "%A %B %d %Y %I:%M:%S %p",
    "%A %B %d %Y %I:%M %p",
    "%a %b %d %Y %H:%M:%S",
    "%a %b %d %Y %H:%M",
    "%a %b %d %Y %I:%M %p",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%m/%d/%y",
    "%d/%m/%y",
    "%m-%d-%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%Y.%m.%d",
    "%B %d %Y",
    "%b %d %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%A %B %d %Y",
    "%a %b %d %Y",
];

// `%Y` accepts any digit count, so `01/15/24` would otherwise land in year 24.
const MIN_YEAR: i32 = 1000;

fn plausible(parsed: NaiveDateTime) -> Option<NaiveDateTime> {
    (parsed.year() >= MIN_YEAR).then_some(parsed)
}

/// Parses an already cleaned timestamp. Month-first layouts are tried before
/// day-first ones, so `03/04/2024` is March 4th while `15/04/2024` still
/// parses as April 15th. Two-digit years map into 1970..=2069.
pub fn parse_clean_timestamp(cleaned: &str) -> Option<NaiveDateTime> {
    if cleaned.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(cleaned) {
        return Some(parsed.naive_local());
    }
    if let Ok(parsed) = DateTime::parse_from_str(cleaned, "%Y-%m-%d %H:%M:%S %z") {
        return Some(parsed.naive_local());
    }
    let datetimes = DATETIME_FORMATS
        .iter()
        .filter_map(|fmt| NaiveDateTime::parse_from_str(cleaned, fmt).ok());
    let dates = DATE_FORMATS.iter().filter_map(|fmt| {
        NaiveDate::parse_from_str(cleaned, fmt)
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
    });
    datetimes.chain(dates).find_map(plausible)
}

pub fn normalize_timestamp(value: &FieldValue) -> Option<NaiveDateTime> {
    match value {
        FieldValue::Text(s) => parse_clean_timestamp(&clean_timestamp(s)),
        _ => None,
    }
}

/// Quantity as a non-negative count. Fractions truncate, negatives clamp to
/// zero and anything unreadable counts as zero.
pub fn normalize_quantity(value: &FieldValue) -> u64 {
    let raw = match value {
        FieldValue::Integer(i) => *i as f64,
        FieldValue::Float(f) => *f,
        FieldValue::Text(s) => {
            let trimmed = s.trim();
            match trimmed.parse::<i64>() {
                Ok(i) => i as f64,
                Err(_) => trimmed.parse::<f64>().unwrap_or(0.0),
            }
        }
        FieldValue::Boolean(_) | FieldValue::List(_) | FieldValue::Null => 0.0,
    };
    if raw.is_finite() && raw > 0.0 {
        raw.trunc() as u64
    } else {
        0
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> FieldValue {
        FieldValue::Text(s.to_string())
    }

    #[test]
    fn price_strips_symbols() {
        let eur = CurrencyRule::eur(1.2);
        assert_eq!(normalize_price(&text("$12.99"), &eur), Some(12.99));
        assert_eq!(normalize_price(&text("USD 7"), &eur), Some(7.0));
    }

    #[test]
    fn price_converts_foreign_currency() {
        let eur = CurrencyRule::eur(1.2);
        let converted = normalize_price(&text("€10,50"), &eur).unwrap();
        assert!((converted - 12.60).abs() < 1e-9);
        let coded = normalize_price(&text("10.00 EUR"), &eur).unwrap();
        assert!((coded - 12.0).abs() < 1e-9);
    }

    #[test]
    fn price_treats_comma_as_thousands_when_dot_present() {
        let eur = CurrencyRule::eur(1.2);
        assert_eq!(normalize_price(&text("1,234.56"), &eur), Some(1234.56));
        assert_eq!(normalize_price(&text("1,234,567"), &eur), Some(1234567.0));
    }

    #[test]
    fn price_missing_values_are_not_a_number() {
        let eur = CurrencyRule::eur(1.2);
        assert_eq!(normalize_price(&text(""), &eur), None);
        assert_eq!(normalize_price(&text("   "), &eur), None);
        assert_eq!(normalize_price(&FieldValue::Null, &eur), None);
        assert_eq!(normalize_price(&text("free"), &eur), None);
        assert_eq!(normalize_price(&text("1.2.3"), &eur), None);
        assert_eq!(normalize_price(&FieldValue::Float(f64::NAN), &eur), None);
    }

    #[test]
    fn numeric_prices_pass_through_unconverted() {
        let eur = CurrencyRule::eur(1.2);
        assert_eq!(normalize_price(&FieldValue::Integer(4), &eur), Some(4.0));
        assert_eq!(normalize_price(&FieldValue::Float(4.5), &eur), Some(4.5));
    }

    #[test]
    fn clean_timestamp_normalizes_meridiem_markers() {
        assert_eq!(
            clean_timestamp("2024-01-15 10:30:00 A.M."),
            "2024-01-15 10:30:00 AM"
        );
        assert_eq!(clean_timestamp("01/15/2024 2:05 p.m"), "01/15/2024 2:05 PM");
        assert_eq!(clean_timestamp("Jan 15,  2024"), "Jan 15 2024");
        assert_eq!(clean_timestamp("2024-01-15 10:30 M."), "2024-01-15 10:30");
    }

    #[test]
    fn timestamp_parses_meridiem_input() {
        let parsed = normalize_timestamp(&text("2024-01-15 10:30:00 A.M.")).unwrap();
        assert_eq!(parsed.date(), NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        let evening = normalize_timestamp(&text("2024-01-15 10:30:00 p.m.")).unwrap();
        assert_eq!(evening.format("%H:%M").to_string(), "22:30");
    }

    #[test]
    fn timestamp_prefers_month_first() {
        let ambiguous = normalize_timestamp(&text("03/04/2024")).unwrap();
        assert_eq!(ambiguous.date(), NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        let unambiguous = normalize_timestamp(&text("15/04/2024")).unwrap();
        assert_eq!(
            unambiguous.date(),
            NaiveDate::from_ymd_opt(2024, 4, 15).unwrap()
        );
    }

    #[test]
    fn timestamp_accepts_named_months_and_offsets() {
        let named = normalize_timestamp(&text("March 5, 2024 9:15 AM")).unwrap();
        assert_eq!(named.date(), NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        let offset = normalize_timestamp(&text("2024-03-05T23:15:00+02:00")).unwrap();
        assert_eq!(offset.date(), NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
    }

    #[test]
    fn garbage_timestamp_is_not_a_time() {
        assert_eq!(normalize_timestamp(&text("not a date")), None);
        assert_eq!(normalize_timestamp(&text("")), None);
        assert_eq!(normalize_timestamp(&FieldValue::Null), None);
    }

    #[test]
    fn quantity_coercion() {
        assert_eq!(normalize_quantity(&text("3")), 3);
        assert_eq!(normalize_quantity(&text(" 2.9 ")), 2);
        assert_eq!(normalize_quantity(&FieldValue::Integer(-4)), 0);
        assert_eq!(normalize_quantity(&text("two")), 0);
        assert_eq!(normalize_quantity(&FieldValue::Null), 0);
    }

    #[test]
    fn round2_rounds_half_away_from_zero() {
        assert_eq!(round2(12.345_000_1), 12.35);
        assert_eq!(round2(3.0), 3.0);
    }
}

//! Pipeline settings: defaults, an optional YAML file, then CLI overrides.
//!
//! ```yaml
//! eur_rate: 1.2
//! currency_symbols: ["€"]
//! currency_codes: ["eur"]
//! match_threshold: 3
//! blocking: false
//! top_days: 5
//! delimiter: ","
//! input_encoding: utf-8
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    aggregate::DEFAULT_TOP_DAYS,
    cli::{self, AnalyzeArgs, ClustersArgs},
    error::LedgerError,
    identity::{ATTRIBUTE_NAMES, CandidateStrategy, DEFAULT_MATCH_THRESHOLD, ResolverOptions},
    normalize::CurrencyRule,
    yaml::{self, YamlValue},
};

pub const DEFAULT_EUR_RATE: f64 = 1.2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub eur_rate: f64,
    pub currency_symbols: Vec<String>,
    pub currency_codes: Vec<String>,
    pub match_threshold: usize,
    pub blocking: bool,
    pub top_days: usize,
    #[serde(deserialize_with = "deserialize_delimiter")]
    pub delimiter: Option<u8>,
    pub input_encoding: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            eur_rate: DEFAULT_EUR_RATE,
            currency_symbols: vec!["€".to_string()],
            currency_codes: vec!["eur".to_string()],
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            blocking: false,
            top_days: DEFAULT_TOP_DAYS,
            delimiter: None,
            input_encoding: None,
        }
    }
}

fn deserialize_delimiter<'de, D>(deserializer: D) -> std::result::Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    raw.map(|value| cli::parse_delimiter(&value).map_err(serde::de::Error::custom))
        .transpose()
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let value = yaml::load_value(path)?;
        if matches!(value, YamlValue::Null) {
            return Ok(Self::default());
        }
        serde_yaml::from_value(value)
            .with_context(|| format!("Decoding pipeline configuration from {path:?}"))
    }

    pub fn for_analyze(args: &AnalyzeArgs) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        if let Some(rate) = args.eur_rate {
            config.eur_rate = rate;
        }
        if let Some(threshold) = args.match_threshold {
            config.match_threshold = threshold;
        }
        if let Some(top) = args.top_days {
            config.top_days = top;
        }
        if args.blocking {
            config.blocking = true;
        }
        if args.delimiter.is_some() {
            config.delimiter = args.delimiter;
        }
        if args.input_encoding.is_some() {
            config.input_encoding = args.input_encoding.clone();
        }
        config.validate()?;
        Ok(config)
    }

    pub fn for_clusters(args: &ClustersArgs) -> Result<Self> {
        let mut config = Self::default();
        if let Some(threshold) = args.match_threshold {
            config.match_threshold = threshold;
        }
        config.blocking = args.blocking;
        config.delimiter = args.delimiter;
        config.input_encoding = args.input_encoding.clone();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if !self.eur_rate.is_finite() || self.eur_rate <= 0.0 {
            return Err(LedgerError::InvalidConfig(format!(
                "eur_rate must be a positive number, got {}",
                self.eur_rate
            )));
        }
        if self.match_threshold == 0 || self.match_threshold > ATTRIBUTE_NAMES.len() {
            return Err(LedgerError::InvalidConfig(format!(
                "match_threshold must be between 1 and {}, got {}",
                ATTRIBUTE_NAMES.len(),
                self.match_threshold
            )));
        }
        // a blank marker is contained in every price string
        if self.currency_symbols.iter().any(|s| s.trim().is_empty()) {
            return Err(LedgerError::InvalidConfig(
                "currency_symbols must not contain blank entries".to_string(),
            ));
        }
        if self.currency_codes.iter().any(|c| c.trim().is_empty()) {
            return Err(LedgerError::InvalidConfig(
                "currency_codes must not contain blank entries".to_string(),
            ));
        }
        Ok(())
    }

    pub fn currency_rule(&self) -> CurrencyRule {
        CurrencyRule::new(
            self.eur_rate,
            self.currency_symbols.clone(),
            self.currency_codes.clone(),
        )
    }

    pub fn resolver_options(&self) -> ResolverOptions {
        ResolverOptions {
            threshold: self.match_threshold,
            strategy: if self.blocking {
                CandidateStrategy::Blocked
            } else {
                CandidateStrategy::Pairwise
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("ledger.yaml");
        std::fs::write(&path, "eur_rate: 1.1\ndelimiter: tab\nblocking: true\n").expect("write");

        let config = PipelineConfig::load(&path).expect("load config");
        assert_eq!(config.eur_rate, 1.1);
        assert_eq!(config.delimiter, Some(b'\t'));
        assert_eq!(config.match_threshold, DEFAULT_MATCH_THRESHOLD);
        assert_eq!(config.top_days, DEFAULT_TOP_DAYS);
        assert_eq!(config.resolver_options().strategy, CandidateStrategy::Blocked);
    }

    #[test]
    fn empty_yaml_is_default() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("empty.yaml");
        std::fs::write(&path, "").expect("write");
        assert_eq!(PipelineConfig::load(&path).unwrap(), PipelineConfig::default());
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let bad_rate = PipelineConfig {
            eur_rate: 0.0,
            ..PipelineConfig::default()
        };
        assert!(bad_rate.validate().is_err());
        let bad_threshold = PipelineConfig {
            match_threshold: 5,
            ..PipelineConfig::default()
        };
        assert!(bad_threshold.validate().is_err());
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_blank_currency_markers() {
        let config: PipelineConfig =
            serde_yaml::from_str("currency_symbols: [\"€\", \"\"]\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("currency_symbols"));
        let blank_code = PipelineConfig {
            currency_codes: vec!["eur".to_string(), "  ".to_string()],
            ..PipelineConfig::default()
        };
        assert!(matches!(
            blank_code.validate(),
            Err(LedgerError::InvalidConfig(msg)) if msg.contains("currency_codes")
        ));
    }
}

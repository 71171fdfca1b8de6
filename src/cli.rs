use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Reconcile bookstore customers, orders and catalogs into a revenue ledger",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Process every dataset under a data root and write summaries
    Analyze(AnalyzeArgs),
    /// Cluster the customers of a single users CSV and print the clusters
    Clusters(ClustersArgs),
}

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    /// Root folder holding DATA* dataset folders (or one dataset's files)
    #[arg(long = "data-root", default_value = "./data")]
    pub data_root: PathBuf,
    /// Folder receiving the per-dataset outputs and all_summaries.json
    #[arg(long = "out-dir", default_value = "./output")]
    pub out_dir: PathBuf,
    /// Optional YAML pipeline configuration
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Conversion rate from the secondary currency (EUR) to the reference currency
    #[arg(long = "eur-rate")]
    pub eur_rate: Option<f64>,
    /// Number of equal attributes required to merge two customers
    #[arg(long = "match-threshold")]
    pub match_threshold: Option<usize>,
    /// Number of revenue days to keep in the summary ranking
    #[arg(long = "top-days")]
    pub top_days: Option<usize>,
    /// Only compare customers sharing an email or phone
    #[arg(long)]
    pub blocking: bool,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the CSV inputs (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Also print all summaries as JSON to stdout
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ClustersArgs {
    /// Users CSV file to reconcile
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Number of equal attributes required to merge two customers
    #[arg(long = "match-threshold")]
    pub match_threshold: Option<usize>,
    /// Only compare customers sharing an email or phone
    #[arg(long)]
    pub blocking: bool,
    /// Include single-member clusters in the listing
    #[arg(long)]
    pub all: bool,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

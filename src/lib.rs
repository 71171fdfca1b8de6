pub mod aggregate;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod data;
pub mod dataset;
pub mod enrich;
pub mod error;
pub mod identity;
pub mod io_utils;
pub mod normalize;
pub mod report;
pub mod schema;
pub mod yaml;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    cli::{Cli, Commands},
    config::PipelineConfig,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("book_ledger", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Analyze(args) => handle_analyze(&args),
        Commands::Clusters(args) => handle_clusters(&args),
    }
}

fn handle_analyze(args: &cli::AnalyzeArgs) -> Result<()> {
    let config = PipelineConfig::for_analyze(args)?;
    debug!("Pipeline configuration: {:?}", config);
    info!(
        "Analyzing datasets under {:?} (EUR rate {}, match threshold {})",
        args.data_root, config.eur_rate, config.match_threshold
    );
    let summaries = dataset::process_all(&args.data_root, &args.out_dir, &config)?;
    print!("{}", report::render_summaries(&summaries));
    if args.json {
        let rendered =
            serde_json::to_string_pretty(&summaries).context("Serializing summaries")?;
        println!("{rendered}");
    }
    Ok(())
}

fn handle_clusters(args: &cli::ClustersArgs) -> Result<()> {
    let config = PipelineConfig::for_clusters(args)?;
    let encoding = io_utils::resolve_encoding(config.input_encoding.as_deref())?;
    let delimiter = io_utils::resolve_input_delimiter(&args.input, config.delimiter);
    info!(
        "Reconciling customers in '{}' with delimiter '{}'",
        args.input.display(),
        printable_delimiter(delimiter)
    );
    let mut users = io_utils::read_csv_table(&args.input, delimiter, encoding)
        .with_context(|| format!("Reading customers from {:?}", args.input))?;
    let records = identity::customer_records(&mut users);
    let identities = identity::resolve_identities(&records, &config.resolver_options());
    print!("{}", report::render_clusters(&identities, args.all));
    info!(
        "{} customer row(s) form {} real customer(s)",
        records.len(),
        identities.cluster_count()
    );
    Ok(())
}

fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}

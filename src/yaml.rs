use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};

pub use serde_yaml::Value as YamlValue;

fn read_to_string(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("Opening YAML file {path:?}"))?;
    let mut buf = String::new();
    file.read_to_string(&mut buf)
        .with_context(|| format!("Reading YAML file {path:?}"))?;
    Ok(buf)
}

/// Parses a YAML document without imposing a shape. An empty file yields
/// `Null`.
pub fn load_value(path: &Path) -> Result<YamlValue> {
    let raw = read_to_string(path)?;
    if raw.trim().is_empty() {
        return Ok(YamlValue::Null);
    }
    serde_yaml::from_str(&raw).with_context(|| format!("Parsing YAML from {path:?}"))
}

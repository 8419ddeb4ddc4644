//! Profile file support for the blis CLI
//!
//! A profile names the workload spec to generate from, how long to run it,
//! and where to write the resulting trace. Any value can be overridden from
//! the command line with `--set key=value` before the profile is parsed.

use anyhow::{bail, Context, Result};
use blis_core::workload::GenerationConfig;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level profile configuration
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    pub generation: GenerationSection,
    pub output: OutputConfig,
}

/// What to generate
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GenerationSection {
    /// Workload spec file, relative to the profile's directory
    pub spec: PathBuf,
    /// Overrides the spec's seed
    #[serde(default)]
    pub seed: Option<u64>,
    /// Generation horizon (falls back to the spec's `horizon_us`)
    #[serde(with = "humantime_serde", default)]
    #[schemars(with = "Option<String>")]
    pub horizon: Option<Duration>,
    /// Request cap (falls back to the spec's `num_requests`; 0 = unlimited)
    #[serde(default)]
    pub max_requests: Option<i64>,
    #[serde(default)]
    pub config: GenerationConfig,
}

/// Where to write results
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Trace v2 header (TOML)
    pub trace_header: PathBuf,
    /// Trace v2 data (CSV)
    pub trace_data: PathBuf,
    /// Optional JSON summary of the generated stream
    #[serde(default)]
    pub summary: Option<PathBuf>,
}

impl ProfileConfig {
    /// Load profile from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read profile: {}", path.display()))?;

        let config: ProfileConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse profile: {}", path.display()))?;
        Ok(config)
    }

    /// Load profile from TOML file with --set style overrides
    pub fn from_file_with_overrides<P: AsRef<Path>>(path: P, overrides: &[String]) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read profile: {}", path.display()))?;

        let mut value: toml::Value = toml::from_str(&content)
            .with_context(|| format!("Failed to parse profile: {}", path.display()))?;

        for override_str in overrides {
            let (key, val) = parse_key_value(override_str)
                .with_context(|| format!("Invalid override format: {}", override_str))?;

            set_toml_path(&mut value, &key, &val)
                .with_context(|| format!("Failed to apply override: {}", override_str))?;
        }

        let config: ProfileConfig =
            value.try_into().with_context(|| "Failed to deserialize modified profile")?;
        Ok(config)
    }

    /// Load, apply overrides, resolve relative paths and validate
    pub fn load<P: AsRef<Path>>(path: P, overrides: &[String]) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if overrides.is_empty() {
            Self::from_file(path)?
        } else {
            Self::from_file_with_overrides(path, overrides)?
        };
        if let Some(dir) = path.parent() {
            config.resolve_relative_to(dir);
        }
        config.validate()?;
        Ok(config)
    }

    /// Interpret relative paths against `base`
    pub fn resolve_relative_to(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.generation.spec);
        resolve(&mut self.output.trace_header);
        resolve(&mut self.output.trace_data);
        if let Some(summary) = self.output.summary.as_mut() {
            resolve(summary);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.generation.spec.as_os_str().is_empty() {
            bail!("generation.spec cannot be empty");
        }
        if let Some(horizon) = self.generation.horizon {
            if horizon.is_zero() {
                bail!("generation.horizon must be > 0");
            }
        }
        if let Some(max) = self.generation.max_requests {
            if max < 0 {
                bail!("generation.max_requests must be >= 0");
            }
        }
        let cfg = &self.generation.config;
        if cfg.vocab_size == 0 {
            bail!("generation.config.vocab_size must be > 0");
        }
        if cfg.per_client_cap_factor < 1 {
            bail!("generation.config.per_client_cap_factor must be >= 1");
        }
        if cfg.decode_us_per_token < 0 {
            bail!("generation.config.decode_us_per_token must be >= 0");
        }
        if self.output.trace_header == self.output.trace_data {
            bail!("output.trace_header and output.trace_data must differ");
        }
        Ok(())
    }
}

/// Convert a horizon to whole microseconds, saturating at `i64::MAX`
pub fn horizon_us(horizon: Duration) -> i64 {
    i64::try_from(horizon.as_micros()).unwrap_or(i64::MAX)
}

/// Parse a "key=value" string into (key, value) tuple
fn parse_key_value(override_str: &str) -> Result<(String, String)> {
    match override_str.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => bail!("Invalid override format '{}'. Expected 'key=value'", override_str),
    }
}

/// Path segment types
enum PathSegment {
    Key(String),
    Index(usize),
    Append,
}

/// Parse a path string into segments (handles "key", "0", "+")
fn parse_path(path: &str) -> Vec<PathSegment> {
    path.split('.')
        .filter(|part| !part.is_empty())
        .map(|part| {
            if part == "+" {
                PathSegment::Append
            } else if let Ok(idx) = part.parse::<usize>() {
                PathSegment::Index(idx)
            } else {
                PathSegment::Key(part.to_string())
            }
        })
        .collect()
}

/// Set a value in TOML using dot-notation path
fn set_toml_path(root: &mut toml::Value, path: &str, value_str: &str) -> Result<()> {
    let parts = parse_path(path);
    let Some((last, parents)) = parts.split_last() else {
        bail!("Empty path");
    };

    let mut current = root;
    for part in parents {
        current = match part {
            PathSegment::Key(key) => {
                let toml::Value::Table(table) = current else {
                    bail!("Cannot navigate through non-table value at key '{}'", key);
                };
                table
                    .entry(key.clone())
                    .or_insert(toml::Value::Table(Default::default()))
            }
            PathSegment::Index(idx) => {
                let toml::Value::Array(arr) = current else {
                    bail!("Cannot index non-array value");
                };
                let len = arr.len();
                match arr.get_mut(*idx) {
                    Some(item) => item,
                    None => bail!("Array index {} out of bounds (length: {})", idx, len),
                }
            }
            PathSegment::Append => bail!("Append operation '+' can only be at the end of path"),
        };
    }

    let parsed = parse_value(value_str)?;
    match (last, current) {
        (PathSegment::Key(key), toml::Value::Table(table)) => {
            table.insert(key.clone(), parsed);
        }
        (PathSegment::Key(key), _) => bail!("Cannot set key '{}' on non-table value", key),
        (PathSegment::Index(idx), toml::Value::Array(arr)) => {
            let len = arr.len();
            match arr.get_mut(*idx) {
                Some(slot) => *slot = parsed,
                None => bail!("Array index {} out of bounds (length: {})", idx, len),
            }
        }
        (PathSegment::Append, toml::Value::Array(arr)) => arr.push(parsed),
        (PathSegment::Index(_), _) => bail!("Cannot index non-array value"),
        (PathSegment::Append, _) => bail!("Cannot append to non-array value"),
    }
    Ok(())
}

/// Parse an inline TOML array or table
fn parse_inline(trimmed: &str) -> Option<toml::Value> {
    let doc = format!("value = {}", trimmed);
    match toml::from_str::<toml::Value>(&doc) {
        Ok(toml::Value::Table(mut table)) => table.remove("value"),
        _ => None,
    }
}

/// Parse a string value with type inference
fn parse_value(value_str: &str) -> Result<toml::Value> {
    let trimmed = value_str.trim();

    match trimmed {
        "true" => return Ok(toml::Value::Boolean(true)),
        "false" => return Ok(toml::Value::Boolean(false)),
        _ => {}
    }

    if let Ok(int_val) = trimmed.parse::<i64>() {
        return Ok(toml::Value::Integer(int_val));
    }
    if let Ok(float_val) = trimmed.parse::<f64>() {
        return Ok(toml::Value::Float(float_val));
    }

    if trimmed.starts_with('[') && trimmed.ends_with(']') {
        return parse_inline(trimmed)
            .with_context(|| format!("Failed to parse array: {}", trimmed));
    }
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return parse_inline(trimmed)
            .with_context(|| format!("Failed to parse inline table: {}", trimmed));
    }

    // Strings, with optional surrounding quotes stripped
    let string_val = if trimmed.len() >= 2
        && ((trimmed.starts_with('"') && trimmed.ends_with('"'))
            || (trimmed.starts_with('\'') && trimmed.ends_with('\'')))
    {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    };

    Ok(toml::Value::String(string_val.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE: &str = r#"
[generation]
spec = "chat.toml"
seed = 7
horizon = "30s"

[output]
trace_header = "out/trace.toml"
trace_data = "out/trace.csv"
"#;

    fn value() -> toml::Value {
        toml::from_str(PROFILE).unwrap()
    }

    #[test]
    fn test_parse_value_types() {
        assert_eq!(parse_value("true").unwrap(), toml::Value::Boolean(true));
        assert_eq!(parse_value("42").unwrap(), toml::Value::Integer(42));
        assert_eq!(parse_value("0.5").unwrap(), toml::Value::Float(0.5));
        assert_eq!(parse_value("\"60s\"").unwrap(), toml::Value::String("60s".to_string()));
        assert_eq!(parse_value("plain").unwrap(), toml::Value::String("plain".to_string()));
        assert_eq!(parse_value("\"").unwrap(), toml::Value::String("\"".to_string()));
        let arr = parse_value("[1, 2]").unwrap();
        assert_eq!(arr.as_array().map(Vec::len), Some(2));
        let table = parse_value("{ a = 1 }").unwrap();
        assert!(table.as_table().is_some_and(|t| t.contains_key("a")));
        assert!(parse_value("[1, = ]").is_err());
    }

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("generation.seed=9").unwrap(),
            ("generation.seed".to_string(), "9".to_string())
        );
        assert_eq!(parse_key_value("a=b=c").unwrap().1, "b=c");
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=1").is_err());
    }

    #[test]
    fn test_set_nested_creates_tables() {
        let mut v = value();
        set_toml_path(&mut v, "generation.config.parallel", "false").unwrap();
        assert_eq!(v["generation"]["config"]["parallel"], toml::Value::Boolean(false));
    }

    #[test]
    fn test_set_array_index_and_append() {
        let mut v: toml::Value = toml::from_str("xs = [1, 2]").unwrap();
        set_toml_path(&mut v, "xs.1", "5").unwrap();
        set_toml_path(&mut v, "xs.+", "9").unwrap();
        let xs: Vec<i64> =
            v["xs"].as_array().unwrap().iter().map(|x| x.as_integer().unwrap()).collect();
        assert_eq!(xs, vec![1, 5, 9]);

        assert!(set_toml_path(&mut v, "xs.7", "1").is_err());
        assert!(set_toml_path(&mut v, "xs.+.a", "1").is_err());
        assert!(set_toml_path(&mut v, "", "1").is_err());
    }

    #[test]
    fn test_profile_parses() {
        let config: ProfileConfig = toml::from_str(PROFILE).unwrap();
        assert_eq!(config.generation.seed, Some(7));
        assert_eq!(config.generation.horizon, Some(Duration::from_secs(30)));
        assert_eq!(config.generation.config, GenerationConfig::default());
        assert!(config.output.summary.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_unknown_field_rejected() {
        let text = format!("{PROFILE}\n[extra]\nx = 1\n");
        assert!(toml::from_str::<ProfileConfig>(&text).is_err());
    }

    #[test]
    fn test_resolve_relative_paths() {
        let mut config: ProfileConfig = toml::from_str(PROFILE).unwrap();
        config.output.summary = Some(PathBuf::from("/abs/summary.json"));
        config.resolve_relative_to(Path::new("/profiles"));
        assert_eq!(config.generation.spec, PathBuf::from("/profiles/chat.toml"));
        assert_eq!(config.output.trace_data, PathBuf::from("/profiles/out/trace.csv"));
        assert_eq!(config.output.summary, Some(PathBuf::from("/abs/summary.json")));
    }

    #[test]
    fn test_validate_rejects() {
        let mut config: ProfileConfig = toml::from_str(PROFILE).unwrap();
        config.generation.max_requests = Some(-1);
        assert!(config.validate().is_err());

        let mut config: ProfileConfig = toml::from_str(PROFILE).unwrap();
        config.generation.horizon = Some(Duration::ZERO);
        assert!(config.validate().is_err());

        let mut config: ProfileConfig = toml::from_str(PROFILE).unwrap();
        config.output.trace_data = config.output.trace_header.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_horizon_us() {
        assert_eq!(horizon_us(Duration::from_millis(1500)), 1_500_000);
        assert_eq!(horizon_us(Duration::MAX), i64::MAX);
    }
}

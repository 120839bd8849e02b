//! Persisted configuration: defaults plus the source set.
//!
//! The config file is TOML. A missing file is not an error: it behaves as
//! an empty default config, and is created on the first mutation. Saves are
//! atomic (write to a temp file in the same directory, then rename).
//!
//! A sibling `ext/` directory may hold driver-extension files, each
//! registering an alias type that resolves to a built-in document driver
//! plus injected options (for example a pipe-delimited CSV variant).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::output::Format;
use crate::source::{SourceSet, SourceType};

pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: u32,
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub sources: SourceSet,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            defaults: Defaults::default(),
            sources: SourceSet::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default = "default_format")]
    pub format: Format,
    #[serde(default)]
    pub header: bool,
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout_secs: u64,
    #[serde(default = "default_shell_completion_timeout")]
    pub shell_completion_timeout_ms: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            format: default_format(),
            header: false,
            ping_timeout_secs: default_ping_timeout(),
            shell_completion_timeout_ms: default_shell_completion_timeout(),
        }
    }
}

fn default_format() -> Format {
    Format::Table
}

fn default_ping_timeout() -> u64 {
    10
}

fn default_shell_completion_timeout() -> u64 {
    500
}

pub fn load(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    let config: Config = toml::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;
    Ok(config)
}

pub fn save(path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let content = toml::to_string_pretty(config).context("failed to serialize config")?;
    let tmp = path.with_extension("toml.tmp");
    std::fs::write(&tmp, content)
        .with_context(|| format!("failed to write config file: {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("failed to replace config file: {}", path.display()))?;
    Ok(())
}

/// A driver extension loaded from `ext/<name>.toml`.
///
/// ```toml
/// type = "pipe"
/// base = "csv"
///
/// [options]
/// delimiter = "|"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ExtDriverDef {
    /// The alias type name users pass to `--driver`.
    #[serde(rename = "type")]
    pub type_name: String,
    /// The built-in document driver the alias resolves to.
    pub base: SourceType,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

/// Loads all driver extensions from the `ext/` directory next to the config
/// file. A missing directory yields an empty set.
pub fn load_ext_drivers(config_path: &Path) -> Result<Vec<ExtDriverDef>> {
    let dir = ext_dir(config_path);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut defs = Vec::new();
    let mut entries: Vec<_> = std::fs::read_dir(&dir)?
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|e| e == "toml"))
        .collect();
    entries.sort();
    for path in entries {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read driver extension: {}", path.display()))?;
        let def: ExtDriverDef = toml::from_str(&content)
            .with_context(|| format!("failed to parse driver extension: {}", path.display()))?;
        defs.push(def);
    }
    Ok(defs)
}

fn ext_dir(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("ext")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_toml() {
        let mut config = Config::default();
        config
            .sources
            .add(
                crate::source::Source::new(
                    "@pg1",
                    "postgres://u:p@localhost/db",
                    BTreeMap::new(),
                )
                .unwrap(),
            )
            .unwrap();
        config.sources.set_active("@pg1").unwrap();
        config.defaults.format = Format::Jsonl;

        let text = toml::to_string_pretty(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.version, CONFIG_VERSION);
        assert_eq!(back.defaults.format, Format::Jsonl);
        assert_eq!(back.sources.active().unwrap().handle, "@pg1");
    }

    #[test]
    fn missing_file_is_default_config() {
        let config = load(Path::new("/nonexistent/qv.toml")).unwrap();
        assert!(config.sources.is_empty());
        assert_eq!(config.defaults.ping_timeout_secs, 10);
        assert_eq!(config.defaults.shell_completion_timeout_ms, 500);
    }

    #[test]
    fn save_and_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("qv.toml");
        let config = Config::default();
        save(&path, &config).unwrap();
        let back = load(&path).unwrap();
        assert_eq!(back.version, config.version);
    }

    #[test]
    fn ext_driver_parses() {
        let def: ExtDriverDef = toml::from_str(
            r#"
type = "pipe"
base = "csv"

[options]
delimiter = "|"
"#,
        )
        .unwrap();
        assert_eq!(def.type_name, "pipe");
        assert_eq!(def.base, SourceType::Csv);
        assert_eq!(def.options["delimiter"], "|");
    }
}

//! Service configuration module.
//!
//! Handles loading, validating, and merging `cropserve.toml`. Stock defaults
//! are the base layer; a `cropserve.toml` in the config directory overrides
//! them key by key.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! catalog = "catalog.toml"  # Catalog file, relative to the config directory
//!
//! [transform]
//! max_concurrent = 4        # Transforms running at once (omit for auto = CPU cores)
//!
//! [guard]
//! wait_timeout_ms = 30000   # Give up waiting for another caller (omit to wait forever)
//!
//! [processing]
//! max_workers = 4           # Parallel context renders (omit for auto = CPU cores)
//!
//! [logging]
//! filter = "cropserve=info" # tracing filter directive; RUST_LOG wins
//! ```
//!
//! ## Partial Configuration
//!
//! Config files are sparse, override just the values you want:
//!
//! ```toml
//! [transform]
//! max_concurrent = 2
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::service::ServiceSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Name of the config file looked up in the config directory.
pub const CONFIG_FILE: &str = "cropserve.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Service configuration loaded from `cropserve.toml`.
///
/// All fields have defaults. User config files need only specify the values
/// they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CropserveConfig {
    /// Catalog file, relative to the config directory.
    #[serde(default = "default_catalog")]
    pub catalog: String,
    pub transform: TransformConfig,
    pub guard: GuardConfig,
    pub processing: ProcessingConfig,
    pub logging: LoggingConfig,
}

fn default_catalog() -> String {
    "catalog.toml".to_string()
}

impl Default for CropserveConfig {
    fn default() -> Self {
        Self {
            catalog: default_catalog(),
            transform: TransformConfig::default(),
            guard: GuardConfig::default(),
            processing: ProcessingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl CropserveConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.catalog.trim().is_empty() {
            return Err(ConfigError::Validation("catalog must not be empty".into()));
        }
        if self.transform.max_concurrent == Some(0) {
            return Err(ConfigError::Validation(
                "transform.max_concurrent must be at least 1".into(),
            ));
        }
        if self.guard.wait_timeout_ms == Some(0) {
            return Err(ConfigError::Validation(
                "guard.wait_timeout_ms must be at least 1".into(),
            ));
        }
        if self.processing.max_workers == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_workers must be at least 1".into(),
            ));
        }
        if self.logging.filter.trim().is_empty() {
            return Err(ConfigError::Validation(
                "logging.filter must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Catalog path resolved against the config directory.
    pub fn catalog_path(&self, config_dir: &Path) -> PathBuf {
        config_dir.join(&self.catalog)
    }

    /// Settings for [`crate::service::VariantService`].
    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            transform_limit: effective_transform_limit(&self.transform),
            wait_timeout: self.guard.wait_timeout_ms.map(Duration::from_millis),
        }
    }
}

/// Transform engine settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransformConfig {
    /// Maximum number of transforms running at once, across all variants.
    /// When absent, defaults to the number of CPU cores.
    pub max_concurrent: Option<usize>,
}

/// Single-flight settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GuardConfig {
    /// How long a caller waits for another caller computing the same
    /// variant. When absent, waits until the computation finishes.
    pub wait_timeout_ms: Option<u64>,
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel render workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_workers: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "cropserve=info".to_string(),
        }
    }
}

fn available_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = available_cores();
    config.max_workers.map(|n| n.min(cores)).unwrap_or(cores)
}

/// Resolve the transform permit count from config.
///
/// Unlike worker threads this is not clamped: engines may be remote.
pub fn effective_transform_limit(config: &TransformConfig) -> usize {
    config.max_concurrent.unwrap_or_else(available_cores).max(1)
}

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(CropserveConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load `cropserve.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if no `cropserve.toml` exists in the directory.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(dir: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = dir.join(CONFIG_FILE);
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<CropserveConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: CropserveConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `cropserve.toml` in the given directory.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result.
pub fn load_config(dir: &Path) -> Result<CropserveConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(dir)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `cropserve.toml` with all keys and
/// explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# cropserve Configuration
# =======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# Catalog of images, contexts, resolutions and registered crops.
# Relative paths resolve against the directory holding this file.
catalog = "catalog.toml"

# ---------------------------------------------------------------------------
# Transform engines
# ---------------------------------------------------------------------------
[transform]
# Maximum transforms running at once, across all variants.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_concurrent = 4

# ---------------------------------------------------------------------------
# Concurrent requests for the same variant
# ---------------------------------------------------------------------------
[guard]
# How long a request waits for another request rendering the same variant.
# Omit or comment out to wait until that render finishes.
# wait_timeout_ms = 30000

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel workers when rendering a whole context.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_workers = 4

# ---------------------------------------------------------------------------
# Logging
# ---------------------------------------------------------------------------
[logging]
# tracing filter directive, used when RUST_LOG is not set.
filter = "cropserve=info"
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_values() {
        let config = CropserveConfig::default();
        assert_eq!(config.catalog, "catalog.toml");
        assert_eq!(config.transform.max_concurrent, None);
        assert_eq!(config.guard.wait_timeout_ms, None);
        assert_eq!(config.processing.max_workers, None);
        assert_eq!(config.logging.filter, "cropserve=info");
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
[transform]
max_concurrent = 2
"#;
        let config: CropserveConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.transform.max_concurrent, Some(2));
        // Defaults preserved
        assert_eq!(config.catalog, "catalog.toml");
        assert_eq!(config.logging.filter, "cropserve=info");
    }

    #[test]
    fn catalog_path_is_relative_to_config_dir() {
        let config = CropserveConfig {
            catalog: "data/catalog.toml".to_string(),
            ..CropserveConfig::default()
        };
        assert_eq!(
            config.catalog_path(Path::new("/srv/cropserve")),
            PathBuf::from("/srv/cropserve/data/catalog.toml")
        );
    }

    // =========================================================================
    // load_config tests
    // =========================================================================

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config, CropserveConfig::default());
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILE),
            r#"
catalog = "images.toml"

[guard]
wait_timeout_ms = 1500

[logging]
filter = "cropserve=debug"
"#,
        )
        .unwrap();

        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.catalog, "images.toml");
        assert_eq!(config.guard.wait_timeout_ms, Some(1500));
        assert_eq!(config.logging.filter, "cropserve=debug");
        // Unspecified defaults preserved
        assert_eq!(config.transform.max_concurrent, None);
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILE), "this is not valid toml [[[").unwrap();

        let result = load_config(tmp.path());
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn load_config_ignores_other_file_names() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("config.toml"), "catalog = \"other.toml\"").unwrap();

        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.catalog, "catalog.toml");
    }

    // =========================================================================
    // Derived settings
    // =========================================================================

    #[test]
    fn effective_threads_auto() {
        let config = ProcessingConfig { max_workers: None };
        assert_eq!(effective_threads(&config), available_cores());
    }

    #[test]
    fn effective_threads_clamped_to_cores() {
        let config = ProcessingConfig {
            max_workers: Some(99999),
        };
        assert_eq!(effective_threads(&config), available_cores());
    }

    #[test]
    fn effective_threads_user_constrains_down() {
        let config = ProcessingConfig {
            max_workers: Some(1),
        };
        assert_eq!(effective_threads(&config), 1);
    }

    #[test]
    fn transform_limit_is_not_clamped() {
        let config = TransformConfig {
            max_concurrent: Some(512),
        };
        assert_eq!(effective_transform_limit(&config), 512);
        assert_eq!(
            effective_transform_limit(&TransformConfig::default()),
            available_cores()
        );
    }

    #[test]
    fn service_settings_from_config() {
        let mut config = CropserveConfig::default();
        config.transform.max_concurrent = Some(3);
        config.guard.wait_timeout_ms = Some(250);

        let settings = config.service_settings();
        assert_eq!(settings.transform_limit, 3);
        assert_eq!(settings.wait_timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn service_settings_wait_forever_by_default() {
        let settings = CropserveConfig::default().service_settings();
        assert_eq!(settings.wait_timeout, None);
    }

    // =========================================================================
    // merge_toml tests
    // =========================================================================

    #[test]
    fn merge_toml_scalar_override() {
        let base: toml::Value = toml::from_str(r#"catalog = "a.toml""#).unwrap();
        let overlay: toml::Value = toml::from_str(r#"catalog = "b.toml""#).unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged.get("catalog").unwrap().as_str(), Some("b.toml"));
    }

    #[test]
    fn merge_toml_table_merge() {
        let base: toml::Value = toml::from_str(
            r#"
[logging]
filter = "cropserve=info"
extra = 1
"#,
        )
        .unwrap();
        let overlay: toml::Value = toml::from_str(
            r#"
[logging]
filter = "warn"
"#,
        )
        .unwrap();
        let merged = merge_toml(base, overlay);
        let logging = merged.get("logging").unwrap();
        assert_eq!(logging.get("filter").unwrap().as_str(), Some("warn"));
        // extra preserved from base
        assert_eq!(logging.get("extra").unwrap().as_integer(), Some(1));
    }

    #[test]
    fn merge_toml_deep_nested() {
        let base: toml::Value = toml::from_str(
            r#"
[a.b]
x = 1
y = 2
"#,
        )
        .unwrap();
        let overlay: toml::Value = toml::from_str(
            r#"
[a.b]
y = 20
"#,
        )
        .unwrap();
        let merged = merge_toml(base, overlay);
        let b = merged.get("a").unwrap().get("b").unwrap();
        assert_eq!(b.get("x").unwrap().as_integer(), Some(1));
        assert_eq!(b.get("y").unwrap().as_integer(), Some(20));
    }

    // =========================================================================
    // Unknown key rejection
    // =========================================================================

    #[test]
    fn unknown_key_rejected() {
        let toml_str = r#"
[transform]
max_concurent = 4
"#;
        let result: Result<CropserveConfig, _> = toml::from_str(toml_str);
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("unknown field"));
    }

    #[test]
    fn unknown_section_rejected() {
        let toml_str = r#"
[transforms]
max_concurrent = 4
"#;
        let result: Result<CropserveConfig, _> = toml::from_str(toml_str);
        assert!(result.is_err());
    }

    #[test]
    fn unknown_key_rejected_via_load_config() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILE),
            r#"
[guard]
timeout = 10
"#,
        )
        .unwrap();

        assert!(load_config(tmp.path()).is_err());
    }

    // =========================================================================
    // Validation tests
    // =========================================================================

    #[test]
    fn validate_default_config_passes() {
        assert!(CropserveConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_zero_limits_rejected() {
        let mut config = CropserveConfig::default();
        config.transform.max_concurrent = Some(0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_concurrent"));

        let mut config = CropserveConfig::default();
        config.guard.wait_timeout_ms = Some(0);
        assert!(config.validate().is_err());

        let mut config = CropserveConfig::default();
        config.processing.max_workers = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_empty_strings_rejected() {
        let mut config = CropserveConfig::default();
        config.logging.filter = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = CropserveConfig::default();
        config.catalog = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_config_validates_values() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILE),
            r#"
[transform]
max_concurrent = 0
"#,
        )
        .unwrap();

        let result = load_config(tmp.path());
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    // =========================================================================
    // resolve_config / load_raw_config tests
    // =========================================================================

    #[test]
    fn load_raw_config_returns_none_when_no_file() {
        let tmp = TempDir::new().unwrap();
        assert!(load_raw_config(tmp.path()).unwrap().is_none());
    }

    #[test]
    fn resolve_config_with_overlay() {
        let base = stock_defaults_value().unwrap();
        let overlay: toml::Value = toml::from_str(
            r#"
[processing]
max_workers = 2
"#,
        )
        .unwrap();
        let config = resolve_config(base, Some(overlay)).unwrap();
        assert_eq!(config.processing.max_workers, Some(2));
        assert_eq!(config.catalog, "catalog.toml");
    }

    #[test]
    fn resolve_config_rejects_invalid_values() {
        let base = stock_defaults_value().unwrap();
        let overlay: toml::Value = toml::from_str(
            r#"
[logging]
filter = ""
"#,
        )
        .unwrap();
        let result = resolve_config(base, Some(overlay));
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    // =========================================================================
    // stock config tests
    // =========================================================================

    #[test]
    fn stock_config_toml_roundtrips_to_defaults() {
        let config: CropserveConfig = toml::from_str(stock_config_toml()).unwrap();
        assert_eq!(config, CropserveConfig::default());
    }

    #[test]
    fn stock_config_toml_contains_all_sections() {
        let content = stock_config_toml();
        for section in ["[transform]", "[guard]", "[processing]", "[logging]"] {
            assert!(content.contains(section), "missing {section}");
        }
    }

    #[test]
    fn stock_defaults_value_has_all_sections() {
        let val = stock_defaults_value().unwrap();
        assert!(val.is_table());
        assert!(val.get("catalog").is_some());
        assert!(val.get("transform").is_some());
        assert!(val.get("guard").is_some());
        assert!(val.get("processing").is_some());
        assert!(val.get("logging").is_some());
    }
}

//! Layered configuration for markwatch.
//!
//! Sources, later ones winning:
//! - Default values
//! - `.markwatch/settings.toml`, found by walking up from the working directory
//! - Environment variables
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `MW_` and use double underscores
//! to separate nested levels:
//! - `MW_DEBOUNCE__INDEX_QUIET_MS=500` sets `debounce.index_quiet_ms`
//! - `MW_INDEX__MARKER_KIND=Entity` sets `index.marker_kind`
//! - `MW_REGENERATION__BULK_UPDATE_LIMIT=50` sets `regeneration.bulk_update_limit`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::index::IgnorePolicy;
use crate::regen::RegenConfig;

const CONFIG_DIR: &str = ".markwatch";
const CONFIG_FILE: &str = "settings.toml";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Workspace root directory (where .markwatch is located)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub debounce: DebounceConfig,

    #[serde(default)]
    pub regeneration: RegenerationConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default level for every module: error, warn, info, debug or trace
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module overrides, e.g. `regen = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct IndexConfig {
    /// Annotation whose value must be unique across the workspace
    #[serde(default = "default_marker_kind")]
    pub marker_kind: String,

    /// Marker values ending in one of these suffixes are never indexed
    #[serde(default = "default_ignored_suffixes")]
    pub ignored_value_suffixes: Vec<String>,

    /// Source file extensions to scan
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Extra gitignore-style patterns to skip
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DebounceConfig {
    /// Quiet period before changed files are re-indexed
    #[serde(default = "default_quiet_ms")]
    pub index_quiet_ms: u64,

    /// Quiet period before changed scopes are regenerated
    #[serde(default = "default_quiet_ms")]
    pub regen_quiet_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RegenerationConfig {
    /// Handlers run between two intermediate commits
    #[serde(default = "default_bulk_update_limit")]
    pub bulk_update_limit: usize,

    /// Handler factories allowed to discover concurrently
    #[serde(default = "default_discovery_threads")]
    pub discovery_threads: usize,
}

// Default value functions
fn default_version() -> u32 { 1 }
fn default_log_level() -> String { "warn".to_string() }
fn default_marker_kind() -> String { "Marker".to_string() }
fn default_ignored_suffixes() -> Vec<String> { vec!["_generated".to_string()] }
fn default_extensions() -> Vec<String> { vec!["java".to_string(), "kt".to_string()] }
fn default_quiet_ms() -> u64 { 2000 }
fn default_bulk_update_limit() -> usize { 100 }
fn default_discovery_threads() -> usize { num_cpus::get() }

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            workspace_root: None,
            logging: LoggingConfig::default(),
            index: IndexConfig::default(),
            debounce: DebounceConfig::default(),
            regeneration: RegenerationConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            marker_kind: default_marker_kind(),
            ignored_value_suffixes: default_ignored_suffixes(),
            extensions: default_extensions(),
            ignore_patterns: vec![
                "target/**".to_string(),
                "build/**".to_string(),
                ".git/**".to_string(),
            ],
        }
    }
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            index_quiet_ms: default_quiet_ms(),
            regen_quiet_ms: default_quiet_ms(),
        }
    }
}

impl Default for RegenerationConfig {
    fn default() -> Self {
        Self {
            bulk_update_limit: default_bulk_update_limit(),
            discovery_threads: default_discovery_threads(),
        }
    }
}

impl IndexConfig {
    pub fn ignore_policy(&self) -> IgnorePolicy {
        IgnorePolicy::new(self.ignored_value_suffixes.iter().cloned())
    }
}

impl DebounceConfig {
    pub fn index_quiet(&self) -> Duration {
        Duration::from_millis(self.index_quiet_ms)
    }

    pub fn regen_quiet(&self) -> Duration {
        Duration::from_millis(self.regen_quiet_ms)
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let start = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::load_in(&start)
    }

    /// Load configuration for the workspace enclosing `start`.
    pub fn load_in(start: &Path) -> Result<Self, Box<figment::Error>> {
        let root = Self::find_workspace_root(start);
        let config_path = root
            .as_ref()
            .map(|root| root.join(CONFIG_DIR).join(CONFIG_FILE))
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));

        Self::figment(&config_path)
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                if settings.workspace_root.is_none() {
                    settings.workspace_root = root;
                }
                settings
            })
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref()).extract().map_err(Box::new)
    }

    fn figment(config_path: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_path))
            // Double underscore separates nested levels; single underscores
            // stay inside field names.
            .merge(Env::prefixed("MW_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
    }

    /// Nearest ancestor of `start` (inclusive) that contains `.markwatch/`.
    pub fn find_workspace_root(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .find(|ancestor| ancestor.join(CONFIG_DIR).is_dir())
            .map(Path::to_path_buf)
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file below `root`. Returns its path.
    pub fn init_config_file(root: &Path, force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = root.join(CONFIG_DIR).join(CONFIG_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        let settings = Settings {
            workspace_root: Some(root.to_path_buf()),
            ..Settings::default()
        };
        settings.save(&config_path)?;

        Ok(config_path)
    }

    /// Regeneration tuning derived from these settings.
    pub fn regen_config(&self) -> RegenConfig {
        RegenConfig {
            quiet: self.debounce.regen_quiet(),
            bulk_update_limit: self.regeneration.bulk_update_limit.max(1),
            discovery_threads: self.regeneration.discovery_threads.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.logging.default, "warn");
        assert_eq!(settings.index.marker_kind, "Marker");
        assert_eq!(settings.index.ignored_value_suffixes, vec!["_generated"]);
        assert_eq!(settings.debounce.index_quiet_ms, 2000);
        assert_eq!(settings.regeneration.bulk_update_limit, 100);
        assert!(settings.regeneration.discovery_threads > 0);
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
version = 2

[index]
marker_kind = "Entity"
extensions = ["java"]

[debounce]
index_quiet_ms = 250

[logging.modules]
regen = "debug"
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.version, 2);
        assert_eq!(settings.index.marker_kind, "Entity");
        assert_eq!(settings.index.extensions, vec!["java"]);
        assert_eq!(settings.debounce.index_quiet(), Duration::from_millis(250));
        assert_eq!(settings.logging.modules["regen"], "debug");

        // Untouched values keep their defaults
        assert_eq!(settings.debounce.regen_quiet_ms, 2000);
        assert_eq!(settings.index.ignored_value_suffixes, vec!["_generated"]);
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("settings.toml");

        let mut settings = Settings::default();
        settings.regeneration.bulk_update_limit = 7;
        settings.index.ignore_patterns = vec!["gen/**".to_string()];

        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.regeneration.bulk_update_limit, 7);
        assert_eq!(loaded.index.ignore_patterns, vec!["gen/**"]);
    }

    #[test]
    fn test_init_refuses_to_overwrite_without_force() {
        let temp_dir = TempDir::new().unwrap();

        let path = Settings::init_config_file(temp_dir.path(), false).unwrap();
        assert!(path.ends_with(".markwatch/settings.toml"));
        assert!(Settings::init_config_file(temp_dir.path(), false).is_err());
        assert!(Settings::init_config_file(temp_dir.path(), true).is_ok());
    }

    #[test]
    fn test_layered_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_dir = temp_dir.path().join(".markwatch");
        fs::create_dir_all(&config_dir).unwrap();
        fs::write(
            config_dir.join("settings.toml"),
            "[regeneration]\ndiscovery_threads = 2\nbulk_update_limit = 10\n",
        )
        .unwrap();

        let nested = temp_dir.path().join("module").join("src");
        fs::create_dir_all(&nested).unwrap();

        // Set environment variables that should override config file
        unsafe {
            std::env::set_var("MW_REGENERATION__DISCOVERY_THREADS", "3");
        }

        let settings = Settings::load_in(&nested).unwrap();

        unsafe {
            std::env::remove_var("MW_REGENERATION__DISCOVERY_THREADS");
        }

        assert_eq!(settings.regeneration.discovery_threads, 3);
        assert_eq!(settings.regeneration.bulk_update_limit, 10);
        assert_eq!(settings.workspace_root.as_deref(), Some(temp_dir.path()));

        let regen = settings.regen_config();
        assert_eq!(regen.bulk_update_limit, 10);
        assert_eq!(regen.quiet, Duration::from_millis(2000));
    }
}

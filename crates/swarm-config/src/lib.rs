//! Configuration for the swarm coordination services.
//!
//! Configuration is read from a single TOML file. Every section is optional
//! and falls back to its defaults, so an empty file (or no file at all) is a
//! valid configuration.
//!
//! ```toml
//! [storage]
//! root = "/var/lib/swarm"
//!
//! [conflict]
//! intent_ttl_hours = 4
//!
//! [work_proof]
//! repo_path = "."
//! vcs = "git"
//!
//! [logging]
//! level = "debug"
//! format = "json"
//! ```

use std::env;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Environment variable naming a config file to load.
pub const CONFIG_ENV_VAR: &str = "SWARM_CONFIG";

const CONFIG_FILE_NAME: &str = "config.toml";
const FALLBACK_DATA_DIR: &str = ".swarm";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to render config TOML: {0}")]
    Render(#[from] toml::ser::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    pub storage: StorageConfig,
    pub conflict: ConflictConfig,
    pub consensus: ConsensusConfig,
    pub work_proof: WorkProofConfig,
    pub patterns: PatternsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Record store root. Unset means the platform data directory.
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictConfig {
    /// Lifetime of a declared intent when the caller gives none.
    pub intent_ttl_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Agreement rule used when a proposal does not name one.
    pub default_rule: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VcsKind {
    #[default]
    Git,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkProofConfig {
    /// Repository the proofs are checked against; relative file paths in
    /// commitments resolve against it too.
    pub repo_path: PathBuf,
    pub vcs: VcsKind,
    pub vcs_timeout_secs: u64,
    /// Proofs completed faster than this get a "very short duration" note.
    pub short_duration_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternsConfig {
    /// Events required in the log before mining starts.
    pub min_events: usize,
    pub sequence_window_minutes: i64,
    /// Record coordination events automatically from the other services.
    pub feed_from_services: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            intent_ttl_hours: 4.0,
        }
    }
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            default_rule: "majority".to_string(),
        }
    }
}

impl Default for WorkProofConfig {
    fn default() -> Self {
        Self {
            repo_path: PathBuf::from("."),
            vcs: VcsKind::Git,
            vcs_timeout_secs: 10,
            short_duration_secs: 60,
        }
    }
}

impl Default for PatternsConfig {
    fn default() -> Self {
        Self {
            min_events: 5,
            sequence_window_minutes: 120,
            feed_from_services: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

// ============================================================
// Loading
// ============================================================

impl SwarmConfig {
    /// Load configuration.
    ///
    /// Lookup order: `explicit`, then `$SWARM_CONFIG`, then
    /// `<config_dir>/config.toml` when it exists, then defaults. A file that
    /// was asked for explicitly must exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_path(path);
        }
        if let Some(path) = env::var_os(CONFIG_ENV_VAR).filter(|p| !p.is_empty()) {
            return Self::from_path(Path::new(&path));
        }
        if let Some(path) = default_config_path().filter(|p| p.is_file()) {
            return Self::from_path(&path);
        }
        debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&contents)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: SwarmConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.conflict.intent_ttl_hours.is_finite() && self.conflict.intent_ttl_hours > 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "conflict.intent_ttl_hours",
                reason: "must be > 0".to_string(),
            });
        }
        if self.consensus.default_rule.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "consensus.default_rule",
                reason: "must not be empty".to_string(),
            });
        }
        if self.work_proof.vcs_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "work_proof.vcs_timeout_secs",
                reason: "must be > 0".to_string(),
            });
        }
        if self.patterns.sequence_window_minutes <= 0 {
            return Err(ConfigError::InvalidValue {
                field: "patterns.sequence_window_minutes",
                reason: "must be > 0".to_string(),
            });
        }
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "logging.level",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Where the record store lives.
    pub fn storage_root(&self) -> PathBuf {
        self.storage
            .root
            .clone()
            .or_else(|| project_dirs().map(|dirs| dirs.data_dir().to_path_buf()))
            .unwrap_or_else(|| PathBuf::from(FALLBACK_DATA_DIR))
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "swarm", "swarm")
}

/// `<config_dir>/config.toml` for the current platform, if one can be
/// determined.
pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::tempdir;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = SwarmConfig::from_toml("").unwrap();
        assert_eq!(config, SwarmConfig::default());
        assert_eq!(config.conflict.intent_ttl_hours, 4.0);
        assert_eq!(config.consensus.default_rule, "majority");
        assert_eq!(config.work_proof.vcs, VcsKind::Git);
        assert_eq!(config.patterns.min_events, 5);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = SwarmConfig::from_toml(
            r#"
            [work_proof]
            vcs = "none"

            [logging]
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.work_proof.vcs, VcsKind::None);
        assert_eq!(config.work_proof.vcs_timeout_secs, 10);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = SwarmConfig::from_toml("[conflict]\nintent_ttl_hours = 0\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "conflict.intent_ttl_hours",
                ..
            }
        ));
        assert!(matches!(
            SwarmConfig::from_toml("[logging]\nformat = \"xml\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = SwarmConfig::default();
        config.storage.root = Some(PathBuf::from("/tmp/swarm"));
        config.patterns.feed_from_services = false;

        let rendered = config.to_toml().unwrap();
        assert_eq!(SwarmConfig::from_toml(&rendered).unwrap(), config);
    }

    #[test]
    #[serial]
    fn test_load_prefers_explicit_then_env() {
        let dir = tempdir().expect("tempdir");
        let explicit = dir.path().join("explicit.toml");
        let from_env = dir.path().join("env.toml");
        std::fs::write(&explicit, "[consensus]\ndefault_rule = \"unanimous\"\n").unwrap();
        std::fs::write(&from_env, "[consensus]\ndefault_rule = \"weighted\"\n").unwrap();

        env::set_var(CONFIG_ENV_VAR, &from_env);
        let loaded = SwarmConfig::load(Some(&explicit)).unwrap();
        assert_eq!(loaded.consensus.default_rule, "unanimous");

        let loaded = SwarmConfig::load(None).unwrap();
        assert_eq!(loaded.consensus.default_rule, "weighted");
        env::remove_var(CONFIG_ENV_VAR);
    }

    #[test]
    #[serial]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempdir().expect("tempdir");
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            SwarmConfig::load(Some(&missing)),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_storage_root_override() {
        let mut config = SwarmConfig::default();
        config.storage.root = Some(PathBuf::from("/srv/swarm"));
        assert_eq!(config.storage_root(), PathBuf::from("/srv/swarm"));
    }
}

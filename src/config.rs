//! Runtime configuration
//!
//! Values come from the command line or environment first, then an optional
//! TOML file, then compiled defaults.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::store::{JsonFileStore, LabelStore};

pub const DEFAULT_DATA_FILE: &str = "data.json";
pub const DEFAULT_LABELS_FILE: &str = "labels.json";
pub const DEFAULT_BIND: &str = "0.0.0.0:3000";

/// Which editor variant to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Single user, labels written to disk on every change
    #[default]
    Server,
    /// Single user, labels kept in memory until exported
    Local,
    /// Many users, dataset split into shards by participant id
    Sharded,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Server => "server",
            Mode::Local => "local",
            Mode::Sharded => "sharded",
        }
    }
}

/// Settings accepted on the command line or via environment
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ConfigArgs {
    /// TOML config file
    #[arg(long, env = "LABELER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Dataset file (JSON array of {image, document})
    #[arg(long, env = "LABELER_DATA")]
    pub data: Option<PathBuf>,

    /// Label snapshot file
    #[arg(long, env = "LABELER_LABELS")]
    pub labels: Option<PathBuf>,

    /// Editor variant
    #[arg(long, env = "LABELER_MODE", value_enum)]
    pub mode: Option<Mode>,

    /// Number of shards in sharded mode
    #[arg(long, env = "LABELER_SHARDS")]
    pub shards: Option<usize>,

    /// Listen address
    #[arg(long, env = "LABELER_BIND")]
    pub bind: Option<String>,
}

/// Contents of the optional TOML file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub data: Option<PathBuf>,
    pub labels: Option<PathBuf>,
    pub mode: Option<Mode>,
    pub shards: Option<usize>,
    pub bind: Option<String>,
}

impl FileConfig {
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::InvalidConfiguration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| AppError::InvalidConfiguration(e.to_string()))
    }
}

/// Resolved configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data: PathBuf,
    pub labels: PathBuf,
    pub mode: Mode,
    pub shards: usize,
    pub bind: String,
}

impl Config {
    /// Resolve from arguments, reading the TOML file they point at if any
    pub fn load(args: &ConfigArgs) -> Result<Self> {
        let file = match &args.config {
            Some(path) => FileConfig::from_path(path)?,
            None => FileConfig::default(),
        };
        Self::merge(args, file)
    }

    pub fn merge(args: &ConfigArgs, file: FileConfig) -> Result<Self> {
        let config = Self {
            data: args
                .data
                .clone()
                .or(file.data)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_FILE)),
            labels: args
                .labels
                .clone()
                .or(file.labels)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LABELS_FILE)),
            mode: args.mode.or(file.mode).unwrap_or_default(),
            shards: args.shards.or(file.shards).unwrap_or(1),
            bind: args
                .bind
                .clone()
                .or(file.bind)
                .unwrap_or_else(|| DEFAULT_BIND.to_string()),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.shards == 0 {
            return Err(AppError::InvalidConfiguration(
                "shards must be at least 1".into(),
            ));
        }
        if self.mode != Mode::Sharded && self.shards != 1 {
            return Err(AppError::InvalidConfiguration(format!(
                "{} mode uses a single shard; got shards = {}",
                self.mode.as_str(),
                self.shards
            )));
        }
        Ok(())
    }

    /// Store matching the configured mode
    pub fn build_store(&self) -> Result<Arc<dyn LabelStore>> {
        let store: Arc<dyn LabelStore> = match self.mode {
            Mode::Server | Mode::Sharded => Arc::new(JsonFileStore::new(&self.labels)),
            Mode::Local => Arc::new(JsonFileStore::on_export(&self.labels)),
        };
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use crate::models::ExportScope;
    use crate::session::Session;
    use crate::store::FlushPolicy;
    use chrono::Utc;

    #[test]
    fn test_defaults() {
        let config = Config::merge(&ConfigArgs::default(), FileConfig::default()).unwrap();
        assert_eq!(config.data, PathBuf::from("data.json"));
        assert_eq!(config.labels, PathBuf::from("labels.json"));
        assert_eq!(config.mode, Mode::Server);
        assert_eq!(config.shards, 1);
        assert_eq!(config.bind, DEFAULT_BIND);
    }

    #[test]
    fn test_args_override_file() {
        let file = FileConfig::from_toml(
            r#"
            data = "from_file.json"
            mode = "sharded"
            shards = 4
            "#,
        )
        .unwrap();
        let args = ConfigArgs {
            shards: Some(8),
            ..Default::default()
        };

        let config = Config::merge(&args, file).unwrap();
        assert_eq!(config.data, PathBuf::from("from_file.json"));
        assert_eq!(config.mode, Mode::Sharded);
        assert_eq!(config.shards, 8);
    }

    #[test]
    fn test_zero_shards_rejected() {
        let args = ConfigArgs {
            mode: Some(Mode::Sharded),
            shards: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            Config::merge(&args, FileConfig::default()),
            Err(AppError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_shards_outside_sharded_mode_rejected() {
        let args = ConfigArgs {
            shards: Some(3),
            ..Default::default()
        };
        assert!(Config::merge(&args, FileConfig::default()).is_err());
    }

    #[test]
    fn test_unknown_toml_key_rejected() {
        assert!(matches!(
            FileConfig::from_toml("shard_count = 3"),
            Err(AppError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_missing_config_file() {
        let args = ConfigArgs {
            config: Some(PathBuf::from("/nonexistent/labeler.toml")),
            ..Default::default()
        };
        assert!(matches!(
            Config::load(&args),
            Err(AppError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_store_per_mode() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::merge(&ConfigArgs::default(), FileConfig::default()).unwrap();
        config.labels = dir.path().join("labels.json");

        assert_eq!(config.build_store().unwrap().policy(), FlushPolicy::EveryMutation);
        config.mode = Mode::Local;
        assert_eq!(config.build_store().unwrap().policy(), FlushPolicy::OnExport);
    }

    #[test]
    fn test_local_mode_writes_labels_on_export() {
        let dir = tempfile::tempdir().unwrap();
        let args = ConfigArgs {
            labels: Some(dir.path().join("labels.json")),
            mode: Some(Mode::Local),
            ..Default::default()
        };
        let config = Config::merge(&args, FileConfig::default()).unwrap();
        let dataset = Arc::new(Dataset::from_pairs([("a.png", ""), ("b.png", "")]));

        {
            let mut session =
                Session::open(dataset.clone(), config.build_store().unwrap(), config.shards).unwrap();
            session.apply_label(0, "数学", None).unwrap();
            // Nothing reaches disk before the export
            assert!(!config.labels.exists());
            session
                .export_snapshot(ExportScope::All, None, Utc::now())
                .unwrap();
        }
        assert!(config.labels.exists());

        let reopened = Session::open(dataset, config.build_store().unwrap(), config.shards).unwrap();
        assert_eq!(reopened.ledger().get(0).unwrap(), "数学");
        assert_eq!(reopened.progress().labeled_total, 1);
    }
}

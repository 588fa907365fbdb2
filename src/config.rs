use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const MOCK_DATA_FILE: &str = "mock-data.json";
pub const POLICY_FILE: &str = "policy.json";
pub const RUBRIC_FILE: &str = "rubric.json";
pub const EMPLOYEES_FILE: &str = "employees.json";
pub const CLIENT_STATE_FILE: &str = "legacy-state.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconcileConfig {
    pub target_db: PathBuf,
    pub legacy_db: Option<PathBuf>,
    pub data_root: PathBuf,
    pub client_state: Option<PathBuf>,
    pub report_dir: PathBuf,
    pub log_dir: PathBuf,
    pub default_locale: String,
    pub default_department: String,
    pub dry_run: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            target_db: PathBuf::from("data/canonical.db"),
            legacy_db: None,
            data_root: PathBuf::from("data"),
            client_state: None,
            report_dir: PathBuf::from("reports"),
            log_dir: PathBuf::from("logs"),
            default_locale: "ar".to_string(),
            default_department: "unassigned".to_string(),
            dry_run: false,
        }
    }
}

/// Command-line and environment values layered over the file config.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub target_db: Option<PathBuf>,
    pub legacy_db: Option<PathBuf>,
    pub data_root: Option<PathBuf>,
    pub client_state: Option<PathBuf>,
    pub report_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub default_locale: Option<String>,
    pub default_department: Option<String>,
    pub dry_run: bool,
}

impl ReconcileConfig {
    /// Defaults, then the optional YAML file, then overrides.
    pub fn load(path: Option<&Path>, overrides: ConfigOverrides) -> AppResult<Self> {
        let mut config = match path {
            Some(path) => {
                let contents = fs::read_to_string(path)
                    .map_err(|error| AppError::Config(format!("{}: {}", path.to_string_lossy(), error)))?;
                serde_yaml::from_str::<ReconcileConfig>(&contents)?
            }
            None => ReconcileConfig::default(),
        };
        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(value) = overrides.target_db {
            self.target_db = value;
        }
        if let Some(value) = overrides.legacy_db {
            self.legacy_db = Some(value);
        }
        if let Some(value) = overrides.data_root {
            self.data_root = value;
        }
        if let Some(value) = overrides.client_state {
            self.client_state = Some(value);
        }
        if let Some(value) = overrides.report_dir {
            self.report_dir = value;
        }
        if let Some(value) = overrides.log_dir {
            self.log_dir = value;
        }
        if let Some(value) = overrides.default_locale {
            self.default_locale = value;
        }
        if let Some(value) = overrides.default_department {
            self.default_department = value;
        }
        self.dry_run |= overrides.dry_run;
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.target_db.as_os_str().is_empty() {
            return Err(AppError::Config("targetDb must not be empty".to_string()));
        }
        if self.default_locale.trim().is_empty() {
            return Err(AppError::Config("defaultLocale must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn data_file(&self, name: &str) -> PathBuf {
        self.data_root.join(name)
    }

    pub fn client_state_path(&self) -> PathBuf {
        self.client_state
            .clone()
            .unwrap_or_else(|| self.data_file(CLIENT_STATE_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigOverrides, ReconcileConfig, CLIENT_STATE_FILE};
    use std::path::PathBuf;

    #[test]
    fn yaml_file_then_overrides_are_layered() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("reconcile.yaml");
        std::fs::write(&path, "targetDb: /srv/canonical.db\ndataRoot: /srv/exports\ndefaultLocale: en\n")
            .expect("write config");

        let config = ReconcileConfig::load(
            Some(&path),
            ConfigOverrides {
                data_root: Some(PathBuf::from("/tmp/override")),
                dry_run: true,
                ..ConfigOverrides::default()
            },
        )
        .expect("load");

        assert_eq!(config.target_db, PathBuf::from("/srv/canonical.db"));
        assert_eq!(config.data_root, PathBuf::from("/tmp/override"));
        assert_eq!(config.default_locale, "en");
        assert_eq!(config.default_department, "unassigned");
        assert!(config.dry_run);
        assert_eq!(config.client_state_path(), PathBuf::from("/tmp/override").join(CLIENT_STATE_FILE));
    }

    #[test]
    fn empty_target_is_rejected() {
        let result = ReconcileConfig::load(
            None,
            ConfigOverrides {
                target_db: Some(PathBuf::new()),
                ..ConfigOverrides::default()
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn missing_config_file_is_a_config_error() {
        let result = ReconcileConfig::load(Some(std::path::Path::new("/nonexistent/reconcile.yaml")), ConfigOverrides::default());
        assert!(matches!(result, Err(crate::errors::AppError::Config(_))));
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration loading and validation.
//!
//! Configuration lives in a YAML file under the application directory
//! (`~/.kong` by default). Everything is validated once, on load; drivers
//! receive an already-validated [`Config`].

use crate::driver::{DriverKind, UnknownDriverTag};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const APP_DIR_NAME: &str = ".kong";
pub const CONFIG_FILE_NAME: &str = "config.yml";
pub const DB_FILE_NAME: &str = "database.sqlite";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Driver(#[from] UnknownDriverTag),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("missing config section: {0}")]
    MissingSection(&'static str),
}

/// Serde adapter storing [`DriverKind`] as its fully-qualified tag.
mod driver_tag {
    use super::DriverKind;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(kind: &DriverKind, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(kind.tag())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<DriverKind, D::Error> {
        let tag = String::deserialize(de)?;
        tag.parse().map_err(serde::de::Error::custom)
    }
}

/// Slurm driver section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlurmConfig {
    #[serde(default = "SlurmConfig::default_account")]
    pub account: String,
    #[serde(default = "SlurmConfig::default_node_size")]
    pub node_size: u32,
    #[serde(default = "SlurmConfig::default_queue")]
    pub default_queue: String,
}

impl SlurmConfig {
    fn default_account() -> String {
        "account".to_string()
    }

    fn default_node_size() -> u32 {
        1
    }

    fn default_queue() -> String {
        "queue".to_string()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.account.is_empty() {
            return Err(ConfigError::Invalid("slurm_driver.account is empty".into()));
        }
        if self.default_queue.is_empty() {
            return Err(ConfigError::Invalid(
                "slurm_driver.default_queue is empty".into(),
            ));
        }
        if self.node_size == 0 {
            return Err(ConfigError::Invalid(
                "slurm_driver.node_size must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl Default for SlurmConfig {
    fn default() -> Self {
        Self {
            account: Self::default_account(),
            node_size: Self::default_node_size(),
            default_queue: Self::default_queue(),
        }
    }
}

/// HTCondor driver section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HtCondorConfig {
    #[serde(default = "HtCondorConfig::default_universe_value")]
    pub default_universe: String,
    #[serde(default)]
    pub submitfile_extra: String,
}

impl HtCondorConfig {
    fn default_universe_value() -> String {
        "vanilla".to_string()
    }
}

impl Default for HtCondorConfig {
    fn default() -> Self {
        Self {
            default_universe: Self::default_universe_value(),
            submitfile_extra: String::new(),
        }
    }
}

/// Panda/grid driver section. The keys mirror the environment the grid
/// tooling expects, hence the shouting names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrunConfig {
    #[serde(rename = "PANDA_PYTHONPATH")]
    pub panda_pythonpath: String,
    #[serde(rename = "PATHENA_GRID_SETUP_SH")]
    pub pathena_grid_setup_sh: String,
    pub emi_path: String,
}

/// One notifier entry: a provider name plus free-form provider options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifySpec {
    pub name: String,
    #[serde(flatten, default)]
    pub options: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawConfig {
    default_driver: Option<String>,
    jobdir: Option<PathBuf>,
    joboutputdir: Option<PathBuf>,
    history_length: Option<u32>,
    slurm_driver: Option<SlurmConfig>,
    htcondor_driver: Option<HtCondorConfig>,
    prun_driver: Option<PrunConfig>,
    notify: Option<Vec<NotifySpec>>,
}

/// Validated configuration.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    #[serde(with = "driver_tag")]
    pub default_driver: DriverKind,
    pub jobdir: PathBuf,
    pub joboutputdir: PathBuf,
    pub history_length: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slurm_driver: Option<SlurmConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub htcondor_driver: Option<HtCondorConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prun_driver: Option<PrunConfig>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notify: Vec<NotifySpec>,
    #[serde(skip)]
    pub app_dir: PathBuf,
}

impl Config {
    /// Default application directory: `~/.kong`.
    pub fn default_app_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME)
    }

    /// Load and validate `<app_dir>/config.yml`.
    pub fn load(app_dir: &Path) -> Result<Self, ConfigError> {
        let path = app_dir.join(CONFIG_FILE_NAME);
        tracing::debug!(path = %path.display(), "loading configuration");
        let text = std::fs::read_to_string(path)?;
        let raw: RawConfig = serde_yaml::from_str(&text)?;
        Self::from_raw(raw, app_dir)
    }

    /// A validated config with all defaults, rooted at `app_dir`. Mostly for
    /// tests; production goes through [`Config::load`].
    pub fn default_at(app_dir: &Path) -> Result<Self, ConfigError> {
        Self::from_raw(RawConfig::default(), app_dir)
    }

    fn from_raw(raw: RawConfig, app_dir: &Path) -> Result<Self, ConfigError> {
        let default_driver = match raw.default_driver {
            Some(tag) => tag.parse::<DriverKind>()?,
            None => DriverKind::Local,
        };

        let jobdir = raw.jobdir.unwrap_or_else(|| app_dir.join("jobdir"));
        let joboutputdir = raw.joboutputdir.unwrap_or_else(|| app_dir.join("joboutput"));
        for dir in [&jobdir, &joboutputdir] {
            std::fs::create_dir_all(dir)?;
        }

        if let Some(slurm) = &raw.slurm_driver {
            slurm.validate()?;
        }

        let config = Self {
            default_driver,
            jobdir,
            joboutputdir,
            history_length: raw.history_length.unwrap_or(1000),
            slurm_driver: raw.slurm_driver,
            htcondor_driver: raw.htcondor_driver,
            prun_driver: raw.prun_driver,
            notify: raw.notify.unwrap_or_default(),
            app_dir: app_dir.to_path_buf(),
        };
        Ok(config)
    }

    pub fn db_file(&self) -> PathBuf {
        self.app_dir.join(DB_FILE_NAME)
    }

    /// Shared HTCondor user log, one file for all condor jobs.
    pub fn htcondor_log_file(&self) -> PathBuf {
        self.app_dir.join("htcondor_log").join("htcondor.log")
    }

    pub fn slurm(&self) -> Result<&SlurmConfig, ConfigError> {
        self.slurm_driver
            .as_ref()
            .ok_or(ConfigError::MissingSection("slurm_driver"))
    }

    pub fn htcondor(&self) -> Result<&HtCondorConfig, ConfigError> {
        self.htcondor_driver
            .as_ref()
            .ok_or(ConfigError::MissingSection("htcondor_driver"))
    }

    pub fn prun(&self) -> Result<&PrunConfig, ConfigError> {
        self.prun_driver
            .as_ref()
            .ok_or(ConfigError::MissingSection("prun_driver"))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

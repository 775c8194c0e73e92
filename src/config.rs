use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ledger::scorer::{DEFAULT_RULE_WEIGHT, ScoringConfig};

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_RENDER_RESOLUTION: u32 = 300;

/// Run configuration. Every field has a default so a partial JSON file is enough.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub api_base: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub classifier_model: String,
    pub extractor_model: String,
    pub transcription_model: String,
    pub rule_weight: f64,
    pub typical_max_pounds: Option<i64>,
    pub render_resolution: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            classifier_model: DEFAULT_MODEL.to_string(),
            extractor_model: DEFAULT_MODEL.to_string(),
            transcription_model: DEFAULT_MODEL.to_string(),
            rule_weight: DEFAULT_RULE_WEIGHT,
            typical_max_pounds: None,
            render_resolution: DEFAULT_RENDER_RESOLUTION,
        }
    }
}

/// Connection settings handed to the service client at construction.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub api_base: String,
    /// `None` when the variable is unset; every request then fails with a service error.
    pub api_key: Option<String>,
    pub api_key_env: String,
    pub timeout_secs: u64,
}

/// Directory layout under a data root.
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.root.join("raw")
    }

    pub fn interim_dir(&self) -> PathBuf {
        self.root.join("interim")
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.root.join("processed")
    }

    pub fn manifest_dir(&self) -> PathBuf {
        self.root.join("manifests")
    }

    pub fn sqlite_cache_path(&self) -> PathBuf {
        self.interim_dir().join("transcriptions.sqlite")
    }
}

impl LedgerConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let raw =
                    fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
                serde_json::from_slice::<Self>(&raw)
                    .with_context(|| format!("failed to parse {}", path.display()))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.rule_weight) {
            bail!("rule_weight must be within [0, 1], got {}", self.rule_weight);
        }
        if self.typical_max_pounds.is_some_and(|value| value <= 0) {
            bail!("typical_max_pounds must be positive when set");
        }
        if self.render_resolution == 0 {
            bail!("render_resolution must be positive");
        }
        Ok(())
    }

    pub fn scoring(&self) -> ScoringConfig {
        ScoringConfig {
            rule_weight: self.rule_weight,
            typical_max_pounds: self.typical_max_pounds,
        }
    }

    /// The API key is read once, here, from the variable the config names.
    ///
    /// A missing key is not fatal: cached pages can still be classified and extracted
    /// through the local fallbacks.
    pub fn resolve_service(&self) -> ServiceConfig {
        let api_key = std::env::var(&self.api_key_env)
            .ok()
            .filter(|value| !value.trim().is_empty());
        if api_key.is_none() {
            warn!(
                variable = %self.api_key_env,
                "API key not set; service calls will fall back or fail"
            );
        }

        ServiceConfig {
            api_base: self.api_base.clone(),
            api_key,
            api_key_env: self.api_key_env.clone(),
            timeout_secs: self.timeout_secs,
        }
    }
}

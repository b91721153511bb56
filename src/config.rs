use serde::{Deserialize, Serialize};

use crate::storage::DataDir;

const CONFIG_FILE: &str = "config.yaml";

/// Default model download timeout in seconds
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;
const DEFAULT_TOP_K: usize = crate::semantic::DEFAULT_TOP_K;

const DEFAULT_N_ESTIMATORS: usize = 100;
const DEFAULT_SEED: u64 = 42;

const DEFAULT_PAGE_SIZE: u64 = 100;
const DEFAULT_BASE_TOTAL: u64 = 1000;
const DEFAULT_INGREDIENT_TOTAL: u64 = 6200;
const DEFAULT_PROCESS_TOTAL: u64 = 3100;
const DEFAULT_NUTRITION_CSV: &str = "nutrition_info.csv";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to access config.yaml: {0}")]
    Io(#[from] std::io::Error),

    #[error("config.yaml is malformed: {0}")]
    Malformed(#[from] serde_yml::Error),

    #[error("config.yaml is not valid utf8")]
    NotUtf8,

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Configuration for name search
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Model name for embeddings (e.g., "paraphrase-multilingual-MiniLM-L12-v2")
    #[serde(default = "default_model")]
    pub model: String,

    /// Results returned by name search
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Timeout for model download in seconds
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            top_k: DEFAULT_TOP_K,
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
        }
    }
}

fn default_model() -> String {
    crate::semantic::DEFAULT_MODEL.to_string()
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

/// Random forest settings for calorie imputation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImputationConfig {
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,

    /// Unlimited when absent
    #[serde(default)]
    pub max_depth: Option<usize>,

    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for ImputationConfig {
    fn default() -> Self {
        Self {
            n_estimators: DEFAULT_N_ESTIMATORS,
            max_depth: None,
            seed: DEFAULT_SEED,
        }
    }
}

fn default_n_estimators() -> usize {
    DEFAULT_N_ESTIMATORS
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

/// Row totals fetched per table and the page size used to fetch them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    #[serde(default = "default_base_total")]
    pub base_total: u64,
    #[serde(default = "default_ingredient_total")]
    pub ingredient_total: u64,
    #[serde(default = "default_process_total")]
    pub process_total: u64,

    /// Nutrition table CSV, relative to the data directory
    #[serde(default = "default_nutrition_csv")]
    pub nutrition_csv: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            base_total: DEFAULT_BASE_TOTAL,
            ingredient_total: DEFAULT_INGREDIENT_TOTAL,
            process_total: DEFAULT_PROCESS_TOTAL,
            nutrition_csv: default_nutrition_csv(),
        }
    }
}

fn default_page_size() -> u64 {
    DEFAULT_PAGE_SIZE
}

fn default_base_total() -> u64 {
    DEFAULT_BASE_TOTAL
}

fn default_ingredient_total() -> u64 {
    DEFAULT_INGREDIENT_TOTAL
}

fn default_process_total() -> u64 {
    DEFAULT_PROCESS_TOTAL
}

fn default_nutrition_csv() -> String {
    DEFAULT_NUTRITION_CSV.to_string()
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub imputation: ImputationConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

impl Config {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.search.model.trim().is_empty() {
            return Err(ConfigError::Invalid("search.model must not be empty".into()));
        }
        if self.search.top_k == 0 {
            return Err(ConfigError::Invalid(
                "search.top_k must be greater than 0".into(),
            ));
        }
        if self.search.download_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "search.download_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.imputation.n_estimators == 0 {
            return Err(ConfigError::Invalid(
                "imputation.n_estimators must be greater than 0".into(),
            ));
        }
        if self.imputation.max_depth == Some(0) {
            return Err(ConfigError::Invalid(
                "imputation.max_depth must be greater than 0 when set".into(),
            ));
        }

        if self.ingest.page_size == 0 {
            return Err(ConfigError::Invalid(
                "ingest.page_size must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Read config.yaml from `dir`, writing the defaults first if it does
    /// not exist. Missing keys are filled in and written back.
    pub fn load_with(dir: &DataDir) -> Result<Self, ConfigError> {
        if !dir.exists(CONFIG_FILE) {
            log::info!("writing default {}", dir.path(CONFIG_FILE).display());
            Self::default().save(dir)?;
        }

        let config_str =
            String::from_utf8(dir.read(CONFIG_FILE)?).map_err(|_| ConfigError::NotUtf8)?;
        let config: Self = serde_yml::from_str(&config_str)?;
        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save(dir)?;
        }

        Ok(config)
    }

    pub fn save(&self, dir: &DataDir) -> Result<(), ConfigError> {
        let config_str = serde_yml::to_string(&self)?;
        dir.write(CONFIG_FILE, config_str.as_bytes())?;
        Ok(())
    }
}

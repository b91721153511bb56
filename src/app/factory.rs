use crate::{
    app::service::RecipeApp,
    config::{Config, SearchConfig},
    events::CsvEventLog,
    recipes::BackendCsv,
    semantic::{EmbeddingModel, SemanticSearch},
    storage::DataDir,
};
use anyhow::{Context, Result};
use homedir::my_home;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const VECTORS_FILE: &str = "vectors.bin";

/// Application factory for creating and configuring application components
pub struct AppFactory;

impl AppFactory {
    /// Build the app on top of the data directory in `paths`.
    ///
    /// The embedding model is loaded on first use. A model that fails to
    /// load does not fail the app; name search then reports it while
    /// ingredient search keeps working.
    pub fn create_app(paths: &AppPaths) -> Result<RecipeApp> {
        let dir = DataDir::open(&paths.base_path)
            .context("Failed to open application data directory")?;
        let config = Config::load_with(&dir).context("Failed to load config.yaml")?;

        let store = BackendCsv::load(dir.clone()).context("Failed to load recipe tables")?;
        let sink = CsvEventLog::new(dir);

        let semantic = {
            let paths = paths.clone();
            let search = config.search.clone();
            Box::new(move || Self::create_semantic(&paths, &search))
        };

        Ok(RecipeApp::new(
            Arc::new(store),
            semantic,
            Arc::new(sink),
            config,
            paths,
        ))
    }

    fn create_semantic(paths: &AppPaths, search: &SearchConfig) -> Result<SemanticSearch, String> {
        let model = EmbeddingModel::new(
            &search.model,
            paths.base_path.clone(),
            Some(Duration::from_secs(search.download_timeout_secs)),
        )
        .map_err(|e| e.to_string())?;

        SemanticSearch::open(Arc::new(model), paths.vectors_path.clone()).map_err(|e| e.to_string())
    }

    /// Get application paths with validation
    pub fn get_paths() -> Result<AppPaths> {
        let paths = AppPaths::new(Self::get_base_path()?);

        std::fs::create_dir_all(&paths.base_path)
            .context("Failed to create application base directory")?;

        Ok(paths)
    }

    /// `RCP_BASE_PATH`, or `~/.local/share/rcp`
    fn get_base_path() -> Result<PathBuf> {
        if let Ok(base_path) = std::env::var("RCP_BASE_PATH") {
            return Ok(PathBuf::from(base_path));
        }

        let home = my_home()
            .map_err(|e| anyhow::anyhow!("Could not determine home directory: {e:?}"))?
            .context("Home directory path is empty")?;
        Ok(home.join(".local/share/rcp"))
    }
}

/// Application paths structure
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub base_path: PathBuf,
    pub vectors_path: PathBuf,
}

impl AppPaths {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        let base_path = base_path.into();
        Self {
            vectors_path: base_path.join(VECTORS_FILE),
            base_path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_paths() {
        let paths = AppPaths::new("/test/base");

        assert_eq!(paths.base_path, PathBuf::from("/test/base"));
        assert_eq!(paths.vectors_path, PathBuf::from("/test/base/vectors.bin"));
    }
}

use crate::config::ConfigError;
use crate::impute::ImputeError;
use crate::ingest::IngestError;
use crate::recipes::{RecipeId, StoreError};
use crate::semantic::SemanticSearchError;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("recipe {0} not found")]
    NotFound(RecipeId),

    #[error("name search unavailable: {0}")]
    ModelUnavailable(String),

    #[error("no recipe with a known calorie to train on")]
    EmptyTrainingSet,

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("store already holds {0} recipes, pass --force to ingest again")]
    AlreadyIngested(usize),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("unexpected error: {0:?}")]
    Other(#[from] anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => AppError::NotFound(id),
            StoreError::DuplicateKey { .. } | StoreError::CalorieAlreadySet(_) => {
                AppError::InvalidData(err.to_string())
            }
            StoreError::Io(_) | StoreError::Csv(_) | StoreError::Poisoned => {
                AppError::StorageUnavailable(err.to_string())
            }
        }
    }
}

impl From<SemanticSearchError> for AppError {
    fn from(err: SemanticSearchError) -> Self {
        match err {
            SemanticSearchError::Storage(_) => AppError::StorageUnavailable(err.to_string()),
            _ => AppError::ModelUnavailable(err.to_string()),
        }
    }
}

impl From<ImputeError> for AppError {
    fn from(err: ImputeError) -> Self {
        match err {
            ImputeError::EmptyTrainingSet => AppError::EmptyTrainingSet,
            ImputeError::Store(err) => err.into(),
            ImputeError::Model(err) => AppError::InvalidData(err.to_string()),
        }
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Impute(err) => err.into(),
            IngestError::Store(err) => err.into(),
            IngestError::Embedding(err) => err.into(),
            IngestError::StaleVectors(_) => AppError::StorageUnavailable(err.to_string()),
            IngestError::MissingField { .. } | IngestError::NoRecipes | IngestError::Nutrition(_) => {
                AppError::InvalidData(err.to_string())
            }
        }
    }
}

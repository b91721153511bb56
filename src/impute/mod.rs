//! Calorie imputation.
//!
//! A TF-IDF + random forest pipeline is trained on recipes whose calorie is
//! known and predicts the calorie of every recipe still at 0. The imputer
//! moves `Untrained -> Trained -> Applied`; each state is its own type, so
//! predictions can not be written before a model was fitted.
//!
//! The write-back is one `update_calories` batch: either every missing
//! calorie is filled or none is.

mod features;
mod forest;
mod tfidf;

use serde::Serialize;

use crate::config::ImputationConfig;
use crate::recipes::{CalorieUpdate, RecipeId, RecipeStore, StoreError};

use features::recipe_features;
use forest::{r_squared, RandomForestRegressor};
use tfidf::TfidfVectorizer;

pub use forest::FitError;

#[derive(Debug, thiserror::Error)]
pub enum ImputeError {
    #[error("no recipe with a known calorie to train on")]
    EmptyTrainingSet,

    #[error("model error: {0}")]
    Model(#[from] FitError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A recipe's feature text with its known calorie.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingExample {
    pub recipe_id: RecipeId,
    pub features: String,
    pub calorie: u32,
}

/// A recipe's feature text whose calorie is missing.
#[derive(Debug, Clone, PartialEq)]
pub struct ImputationTarget {
    pub recipe_id: RecipeId,
    pub features: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingReport {
    pub trained_on: usize,
    pub vocabulary: usize,
    /// Fit on the training set itself; a diagnostic, not a validation score
    pub r_squared: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImputationReport {
    pub training: Option<TrainingReport>,
    pub imputed: usize,
}

pub struct Untrained;

pub struct Trained {
    vectorizer: TfidfVectorizer,
    forest: RandomForestRegressor,
    report: TrainingReport,
}

pub struct Applied {
    report: ImputationReport,
}

pub struct CalorieImputer<S> {
    config: ImputationConfig,
    state: S,
}

impl CalorieImputer<Untrained> {
    pub fn new(config: ImputationConfig) -> Self {
        Self {
            config,
            state: Untrained,
        }
    }

    pub fn train(self, examples: &[TrainingExample]) -> Result<CalorieImputer<Trained>, ImputeError> {
        if examples.is_empty() {
            return Err(ImputeError::EmptyTrainingSet);
        }

        let documents: Vec<&str> = examples.iter().map(|e| e.features.as_str()).collect();
        let targets: Vec<f64> = examples.iter().map(|e| e.calorie as f64).collect();

        let vectorizer = TfidfVectorizer::fit(&documents);
        let rows = vectorizer.transform_all(&documents);

        let mut forest = RandomForestRegressor::new(self.config.n_estimators)
            .with_max_depth(self.config.max_depth)
            .with_seed(self.config.seed);
        forest.fit(&rows, &targets)?;

        let report = TrainingReport {
            trained_on: examples.len(),
            vocabulary: vectorizer.vocabulary_size(),
            r_squared: r_squared(&targets, &forest.predict_all(&rows)),
        };
        log_lowest_calories(examples);

        Ok(CalorieImputer {
            config: self.config,
            state: Trained {
                vectorizer,
                forest,
                report,
            },
        })
    }
}

fn log_lowest_calories(examples: &[TrainingExample]) {
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }
    let mut lowest: Vec<&TrainingExample> = examples.iter().collect();
    lowest.sort_by_key(|e| (e.calorie, e.recipe_id));
    for e in lowest.iter().take(20) {
        log::debug!("low calorie sample {}: {} kcal <- {:?}", e.recipe_id, e.calorie, e.features);
    }
}

impl CalorieImputer<Trained> {
    pub fn report(&self) -> &TrainingReport {
        &self.state.report
    }

    /// Rounded prediction, never below 1 so it does not read as "unknown".
    pub fn predict(&self, features: &str) -> u32 {
        let row = self.state.vectorizer.transform(features);
        let prediction = self.state.forest.predict(&row).round();
        (prediction as u32).max(1)
    }

    /// Predict every target and write them back as one batch.
    pub fn apply(
        self,
        store: &dyn RecipeStore,
        targets: &[ImputationTarget],
    ) -> Result<CalorieImputer<Applied>, ImputeError> {
        let batch: Vec<CalorieUpdate> = targets
            .iter()
            .map(|t| CalorieUpdate {
                recipe_id: t.recipe_id,
                calorie: self.predict(&t.features),
            })
            .collect();

        let imputed = store.update_calories(&batch)?;
        log::info!("imputed the calorie of {} recipes", imputed);

        Ok(CalorieImputer {
            config: self.config,
            state: Applied {
                report: ImputationReport {
                    training: Some(self.state.report),
                    imputed,
                },
            },
        })
    }
}

impl CalorieImputer<Applied> {
    pub fn into_report(self) -> ImputationReport {
        self.state.report
    }
}

/// Split the stored recipes into training examples and imputation targets.
pub fn partition(store: &dyn RecipeStore) -> Result<(Vec<TrainingExample>, Vec<ImputationTarget>), StoreError> {
    let recipes = store.recipes()?;
    let mut features = recipe_features(&recipes, &store.ingredients()?);

    let mut examples = vec![];
    let mut targets = vec![];
    for recipe in &recipes {
        let text = features.remove(&recipe.id).unwrap_or_default();
        if recipe.has_known_calorie() {
            examples.push(TrainingExample {
                recipe_id: recipe.id,
                features: text,
                calorie: recipe.calorie,
            });
        } else {
            targets.push(ImputationTarget {
                recipe_id: recipe.id,
                features: text,
            });
        }
    }
    Ok((examples, targets))
}

/// Fill every missing calorie in `store`.
///
/// With nothing to impute this is a no-op and no model is fitted. With
/// something to impute but no known calorie it fails with
/// [`ImputeError::EmptyTrainingSet`] and nothing is written.
pub fn impute_missing_calories(
    store: &dyn RecipeStore,
    config: &ImputationConfig,
) -> Result<ImputationReport, ImputeError> {
    let _span = tracing::info_span!("impute", n_estimators = config.n_estimators).entered();
    let (examples, targets) = partition(store)?;
    if targets.is_empty() {
        log::info!("every recipe has a calorie, nothing to impute");
        return Ok(ImputationReport {
            training: None,
            imputed: 0,
        });
    }

    let trained = CalorieImputer::new(config.clone()).train(&examples)?;
    let report = trained.report();
    log::info!(
        "calorie model trained on {} recipes ({} terms), R² {:.4}",
        report.trained_on,
        report.vocabulary,
        report.r_squared
    );

    Ok(trained.apply(store, &targets)?.into_report())
}

//! Bulk ingestion.
//!
//! Raw rows are fetched and cleaned, recipe names are embedded, the tables
//! are written, missing calories are imputed and the nutrition table is
//! loaded. The run is all or nothing: if any write fails the previous
//! tables are restored and the previous vectors stay in place. Without a
//! model the previous vectors no longer describe the tables and are
//! removed as the last write.

mod clean;
mod nutrition;
mod source;

use serde::Serialize;
use std::path::Path;
use std::time::Instant;

use crate::config::Config;
use crate::impute::{impute_missing_calories, ImputationReport, ImputeError};
use crate::recipes::{Dataset, RecipeStore, StoreError};
use crate::semantic::{SemanticSearch, SemanticSearchError, VectorStorage, VectorStorageError};

use clean::{clean_base, clean_ingredients, clean_process};
use nutrition::load_nutrition_csv;
use source::fetch_all;

pub use source::{JsonDumpSource, RecipeSource, Table};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("{table} row without {field}")]
    MissingField {
        table: &'static str,
        field: &'static str,
    },

    #[error("the source returned no recipes")]
    NoRecipes,

    #[error("failed to read nutrition csv: {0}")]
    Nutrition(#[from] csv::Error),

    #[error("failed to embed recipe names: {0}")]
    Embedding(#[from] SemanticSearchError),

    #[error("failed to remove outdated vectors: {0}")]
    StaleVectors(#[from] VectorStorageError),

    #[error(transparent)]
    Impute(#[from] ImputeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub recipes: usize,
    pub ingredients: usize,
    pub steps: usize,
    /// `None` when no embedding model was available
    pub embedded: Option<usize>,
    pub imputation: ImputationReport,
    /// `None` when the nutrition table was left as it was
    pub nutrition: Option<usize>,
}

/// Where the recipe-name vectors of an ingestion go.
#[derive(Clone, Copy)]
pub enum NameIndex<'a> {
    Model(&'a SemanticSearch),
    /// No model is loaded. The vector file at this path is removed.
    Unavailable(&'a Path),
}

/// Fetch every table from `source` and clean it into one dataset.
pub fn collect(source: &dyn RecipeSource, config: &Config) -> Result<Dataset, IngestError> {
    let ingest = &config.ingest;
    let base = fetch_all(source, Table::Base, ingest.base_total, ingest.page_size);
    let ingredients = fetch_all(source, Table::Ingredient, ingest.ingredient_total, ingest.page_size);
    let process = fetch_all(source, Table::Process, ingest.process_total, ingest.page_size);

    let base = clean_base(&base)?;
    if base.recipes.is_empty() {
        return Err(IngestError::NoRecipes);
    }

    let mut dataset = Dataset {
        recipes: base.recipes,
        ingredients: clean_ingredients(&ingredients)?,
        process: clean_process(&process)?,
        nations: base.nations,
        types: base.types,
    };
    dataset.normalize()?;
    Ok(dataset)
}

/// Write `dataset` and everything derived from it.
///
/// With [`NameIndex::Unavailable`] the tables are still written and name
/// search stays unavailable until the names are indexed again.
pub fn ingest(
    dataset: Dataset,
    store: &dyn RecipeStore,
    index: NameIndex<'_>,
    config: &Config,
    nutrition_csv: &Path,
) -> Result<IngestReport, IngestError> {
    let now = Instant::now();
    let _span = tracing::info_span!("ingest", recipes = dataset.recipes.len()).entered();

    let staged_vectors = match index {
        NameIndex::Model(semantic) => {
            let names: Vec<_> = dataset
                .recipes
                .iter()
                .map(|r| (r.id, r.name.clone()))
                .collect();
            Some(semantic.embed_names(&names)?)
        }
        NameIndex::Unavailable(_) => {
            log::warn!("no embedding model, recipe names are not indexed");
            None
        }
    };

    let nutrition_rows = if store.nutrition_count()? == 0 && nutrition_csv.exists() {
        Some(load_nutrition_csv(nutrition_csv)?)
    } else {
        if !nutrition_csv.exists() {
            log::warn!("{} not found, nutrition table not loaded", nutrition_csv.display());
        }
        None
    };

    let mut report = IngestReport {
        recipes: dataset.recipes.len(),
        ingredients: dataset.ingredients.len(),
        steps: dataset.process.len(),
        embedded: None,
        imputation: ImputationReport {
            training: None,
            imputed: 0,
        },
        nutrition: None,
    };

    let previous = store.snapshot()?;
    store.replace_all(dataset)?;

    let written = (|| -> Result<(), IngestError> {
        report.imputation = impute_missing_calories(store, &config.imputation)?;

        if let Some(rows) = nutrition_rows {
            store.replace_nutrition(rows)?;
            report.nutrition = Some(store.nutrition_count()?);
        }

        match (index, staged_vectors) {
            (NameIndex::Model(semantic), Some(vectors)) => {
                report.embedded = Some(semantic.commit(vectors)?);
            }
            (NameIndex::Unavailable(vectors_path), _) => {
                VectorStorage::new(vectors_path.to_path_buf()).delete()?;
            }
            (NameIndex::Model(_), None) => {}
        }
        Ok(())
    })();

    if let Err(err) = written {
        log::error!("ingestion failed, restoring previous tables: {}", err);
        if report.nutrition.is_some() {
            if let Err(restore_err) = store.replace_nutrition(vec![]) {
                log::error!("failed to clear nutrition table: {}", restore_err);
            }
        }
        if let Err(restore_err) = store.replace_all(previous) {
            log::error!("failed to restore previous tables: {}", restore_err);
        }
        return Err(err);
    }

    log::info!(
        "ingested {} recipes in {}ms",
        report.recipes,
        now.elapsed().as_millis()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn collect_requires_recipes() {
        let tmp = tempfile::tempdir().unwrap();
        let source = JsonDumpSource::new(tmp.path());
        assert!(matches!(
            collect(&source, &Config::default()),
            Err(IngestError::NoRecipes)
        ));
    }

    #[test]
    fn collect_cleans_every_table() {
        let tmp = tempfile::tempdir().unwrap();
        let write = |table: Table, rows: serde_json::Value| {
            let grid = table.grid();
            std::fs::write(
                tmp.path().join(format!("{grid}.json")),
                json!({ grid: { "row": rows } }).to_string(),
            )
            .unwrap();
        };
        write(
            Table::Base,
            json!([
                { "RECIPE_ID": 2, "RECIPE_NM_KO": "잡채", "NATION_CODE": "3020001", "NATION_NM": "한식",
                  "TY_CODE": "3010001", "TY_NM": "반찬", "CALORIE": "300Kcal" },
                { "RECIPE_ID": 1, "RECIPE_NM_KO": "떡국", "NATION_CODE": "3020001", "NATION_NM": "한식",
                  "TY_CODE": "3010002", "TY_NM": "국", "CALORIE": "" }
            ]),
        );
        write(
            Table::Ingredient,
            json!([
                { "RECIPE_ID": 1, "IRDNT_NM": "떡", "IRDNT_CPCTY": "300g" },
                { "RECIPE_ID": 1, "IRDNT_NM": "소고기", "IRDNT_CPCTY": "100g" }
            ]),
        );
        write(
            Table::Process,
            json!([{ "RECIPE_ID": 1, "COOKING_NO": 1, "COOKING_DC": "끓인다" }]),
        );

        let dataset = collect(&JsonDumpSource::new(tmp.path()), &Config::default()).unwrap();
        let ids: Vec<_> = dataset.recipes.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(dataset.ingredients.len(), 2);
        assert_eq!(dataset.ingredients[1].seq, 2);
        assert_eq!(dataset.process.len(), 1);
        assert_eq!(dataset.nations.len(), 1);
        assert_eq!(dataset.types.len(), 2);
    }
}

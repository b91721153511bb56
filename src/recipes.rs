use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashSet},
    fmt::Display,
    fs::File,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Instant,
};

use crate::{filter::CategoryFilter, storage::DataDir};

pub type RecipeId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NationCode(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeCode(pub u32);

impl Display for NationCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for TypeCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One row of `RECIPE_BASE`. A calorie of 0 means "unknown".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    #[serde(rename = "RECIPE_ID")]
    pub id: RecipeId,
    #[serde(rename = "RECIPE_NM_KO", default)]
    pub name: String,
    #[serde(rename = "SUMRY", default)]
    pub summary: String,
    #[serde(rename = "NATION_CODE", default)]
    pub nation: Option<NationCode>,
    #[serde(rename = "TY_CODE", default)]
    pub kind: Option<TypeCode>,
    #[serde(rename = "COOKING_TIME", default)]
    pub cooking_minutes: u32,
    #[serde(rename = "CALORIE", default)]
    pub calorie: u32,
    #[serde(rename = "QNT", default)]
    pub servings: u32,
}

impl Recipe {
    pub fn has_known_calorie(&self) -> bool {
        self.calorie > 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngredientLine {
    #[serde(rename = "RECIPE_ID")]
    pub recipe_id: RecipeId,
    #[serde(rename = "IRDNT_SN")]
    pub seq: u32,
    #[serde(rename = "IRDNT_NM", default)]
    pub name: String,
    #[serde(rename = "IRDNT_CPCTY", default)]
    pub quantity: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessStep {
    #[serde(rename = "RECIPE_ID")]
    pub recipe_id: RecipeId,
    #[serde(rename = "COOKING_NO")]
    pub step: u32,
    #[serde(rename = "COOKING_DC", default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NationInfo {
    #[serde(rename = "NATION_CODE")]
    pub code: NationCode,
    #[serde(rename = "NATION_NM", default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeInfo {
    #[serde(rename = "TY_CODE")]
    pub code: TypeCode,
    #[serde(rename = "TY_NM", default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NutritionInfo {
    #[serde(rename = "FOOD_GROUP", default)]
    pub food_group: String,
    #[serde(rename = "FOOD_NAME")]
    pub food_name: String,
    #[serde(rename = "ENERGY", default)]
    pub energy: f32,
    #[serde(rename = "PROTEIN", default)]
    pub protein: f32,
    #[serde(rename = "FAT", default)]
    pub fat: f32,
    #[serde(rename = "CH", default)]
    pub carbohydrate: f32,
    #[serde(rename = "SUGAR", default)]
    pub sugar: f32,
}

/// Everything one ingestion run produces, written as a unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub recipes: Vec<Recipe>,
    pub ingredients: Vec<IngredientLine>,
    pub process: Vec<ProcessStep>,
    pub nations: Vec<NationInfo>,
    pub types: Vec<TypeInfo>,
}

impl Dataset {
    /// Sort every table by its key and reject duplicate keys.
    pub fn normalize(&mut self) -> Result<(), StoreError> {
        self.recipes.sort_by_key(|r| r.id);
        check_unique("RECIPE_BASE", self.recipes.iter().map(|r| r.id))?;

        self.ingredients.sort_by_key(|i| (i.recipe_id, i.seq));
        check_unique(
            "RECIPE_INGREDIENT",
            self.ingredients.iter().map(|i| (i.recipe_id, i.seq)),
        )?;

        self.process.sort_by_key(|p| (p.recipe_id, p.step));
        check_unique(
            "RECIPE_PROCESS",
            self.process.iter().map(|p| (p.recipe_id, p.step)),
        )?;

        self.nations.sort_by_key(|n| n.code);
        check_unique("NATION_INFO", self.nations.iter().map(|n| n.code))?;

        self.types.sort_by_key(|t| t.code);
        check_unique("TYPE_INFO", self.types.iter().map(|t| t.code))?;

        Ok(())
    }
}

fn check_unique<K, I>(table: &'static str, keys: I) -> Result<(), StoreError>
where
    K: std::hash::Hash + Eq + std::fmt::Debug,
    I: IntoIterator<Item = K>,
{
    let mut seen = HashSet::new();
    for key in keys {
        let label = format!("{key:?}");
        if !seen.insert(key) {
            return Err(StoreError::DuplicateKey { table, key: label });
        }
    }
    Ok(())
}

/// A recipe with its reference names, ingredient lines and steps in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecipeDetail {
    pub recipe: Recipe,
    pub nation_name: Option<String>,
    pub type_name: Option<String>,
    pub ingredients: Vec<IngredientLine>,
    pub process: Vec<ProcessStep>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalorieUpdate {
    pub recipe_id: RecipeId,
    pub calorie: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("recipe {0} not found")]
    NotFound(RecipeId),

    #[error("duplicate key in {table}: {key}")]
    DuplicateKey { table: &'static str, key: String },

    #[error("calorie of recipe {0} is already set")]
    CalorieAlreadySet(RecipeId),

    #[error("table lock poisoned")]
    Poisoned,
}

/// The relational tables the search core reads and the ingestion writes.
pub trait RecipeStore: Send + Sync {
    fn is_empty(&self) -> Result<bool, StoreError>;
    fn replace_all(&self, dataset: Dataset) -> Result<(), StoreError>;
    fn snapshot(&self) -> Result<Dataset, StoreError>;
    fn recipes(&self) -> Result<Vec<Recipe>, StoreError>;
    fn recipe(&self, id: RecipeId) -> Result<Option<Recipe>, StoreError>;
    fn ingredients(&self) -> Result<Vec<IngredientLine>, StoreError>;
    fn detail(&self, id: RecipeId) -> Result<Option<RecipeDetail>, StoreError>;
    fn nations(&self) -> Result<Vec<NationInfo>, StoreError>;
    fn types(&self) -> Result<Vec<TypeInfo>, StoreError>;

    /// Set the calorie of every listed recipe, all or nothing.
    ///
    /// Only recipes whose calorie is still unknown may be written.
    fn update_calories(&self, batch: &[CalorieUpdate]) -> Result<usize, StoreError>;

    /// Distinct recipes with an ingredient name containing `keyword`
    /// (case-sensitive), ascending by recipe id.
    fn search_by_ingredient(
        &self,
        keyword: &str,
        filter: &CategoryFilter,
    ) -> Result<Vec<Recipe>, StoreError>;

    fn nutrition_count(&self) -> Result<usize, StoreError>;
    fn replace_nutrition(&self, rows: Vec<NutritionInfo>) -> Result<(), StoreError>;
}

const RECIPE_BASE: &str = "RECIPE_BASE.csv";
const RECIPE_INGREDIENT: &str = "RECIPE_INGREDIENT.csv";
const RECIPE_PROCESS: &str = "RECIPE_PROCESS.csv";
const NATION_INFO: &str = "NATION_INFO.csv";
const TYPE_INFO: &str = "TYPE_INFO.csv";
const NUTRITION_INFO: &str = "NUTRITION_INFO.csv";

#[derive(Debug, Default)]
struct Tables {
    dataset: Dataset,
    nutrition: Vec<NutritionInfo>,
}

/// One CSV file per table inside a [`DataDir`], cached in memory.
#[derive(Debug)]
pub struct BackendCsv {
    dir: DataDir,
    tables: RwLock<Tables>,
}

impl BackendCsv {
    pub fn load(dir: DataDir) -> Result<Self, StoreError> {
        let now = Instant::now();

        let mut dataset = Dataset {
            recipes: read_table(&dir, RECIPE_BASE)?,
            ingredients: read_table(&dir, RECIPE_INGREDIENT)?,
            process: read_table(&dir, RECIPE_PROCESS)?,
            nations: read_table(&dir, NATION_INFO)?,
            types: read_table(&dir, TYPE_INFO)?,
        };
        dataset.normalize()?;
        let nutrition = read_table(&dir, NUTRITION_INFO)?;

        log::debug!(
            "took {}ms to read {} recipes",
            now.elapsed().as_micros() as f64 / 1000.0,
            dataset.recipes.len()
        );

        Ok(BackendCsv {
            dir,
            tables: RwLock::new(Tables { dataset, nutrition }),
        })
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables.write().map_err(|_| StoreError::Poisoned)
    }

    /// Stage every table to a temp file, then rename them all into place.
    /// Nothing is renamed unless every table was staged.
    fn persist(&self, staged: Vec<(&'static str, Result<PathBuf, StoreError>)>) -> Result<(), StoreError> {
        let mut ready = Vec::with_capacity(staged.len());
        let mut failure = None;
        for (ident, result) in staged {
            match result {
                Ok(path) => ready.push((ident, path)),
                Err(err) => {
                    failure.get_or_insert(err);
                }
            }
        }

        if let Some(err) = failure {
            for (_, path) in ready {
                let _ = std::fs::remove_file(path);
            }
            return Err(err);
        }

        for (ident, path) in ready {
            self.dir.commit(&path, ident)?;
        }
        Ok(())
    }
}

fn read_table<T: DeserializeOwned>(dir: &DataDir, ident: &str) -> Result<Vec<T>, StoreError> {
    if !dir.exists(ident) {
        return Ok(vec![]);
    }

    let mut reader = csv::Reader::from_path(dir.path(ident))?;
    let mut rows = vec![];
    for record in reader.deserialize() {
        rows.push(record?);
    }
    Ok(rows)
}

fn stage_table<T: Serialize>(dir: &DataDir, ident: &str, rows: &[T]) -> Result<PathBuf, StoreError> {
    let temp_path = dir.temp_path(ident);
    let result = (|| -> Result<(), StoreError> {
        let mut writer = csv::Writer::from_path(&temp_path)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        let file: File = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(())
    })();

    match result {
        Ok(()) => Ok(temp_path),
        Err(err) => {
            let _ = std::fs::remove_file(&temp_path);
            Err(err)
        }
    }
}

impl RecipeStore for BackendCsv {
    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.read()?.dataset.recipes.is_empty())
    }

    fn replace_all(&self, mut dataset: Dataset) -> Result<(), StoreError> {
        dataset.normalize()?;

        let mut tables = self.write()?;
        self.persist(vec![
            (RECIPE_BASE, stage_table(&self.dir, RECIPE_BASE, &dataset.recipes)),
            (
                RECIPE_INGREDIENT,
                stage_table(&self.dir, RECIPE_INGREDIENT, &dataset.ingredients),
            ),
            (
                RECIPE_PROCESS,
                stage_table(&self.dir, RECIPE_PROCESS, &dataset.process),
            ),
            (NATION_INFO, stage_table(&self.dir, NATION_INFO, &dataset.nations)),
            (TYPE_INFO, stage_table(&self.dir, TYPE_INFO, &dataset.types)),
        ])?;

        log::info!(
            "stored {} recipes, {} ingredient lines, {} steps",
            dataset.recipes.len(),
            dataset.ingredients.len(),
            dataset.process.len()
        );
        tables.dataset = dataset;
        Ok(())
    }

    fn snapshot(&self) -> Result<Dataset, StoreError> {
        Ok(self.read()?.dataset.clone())
    }

    fn recipes(&self) -> Result<Vec<Recipe>, StoreError> {
        Ok(self.read()?.dataset.recipes.clone())
    }

    fn recipe(&self, id: RecipeId) -> Result<Option<Recipe>, StoreError> {
        let tables = self.read()?;
        let recipes = &tables.dataset.recipes;
        Ok(recipes
            .binary_search_by_key(&id, |r| r.id)
            .ok()
            .map(|idx| recipes[idx].clone()))
    }

    fn ingredients(&self) -> Result<Vec<IngredientLine>, StoreError> {
        Ok(self.read()?.dataset.ingredients.clone())
    }

    fn detail(&self, id: RecipeId) -> Result<Option<RecipeDetail>, StoreError> {
        let Some(recipe) = self.recipe(id)? else {
            return Ok(None);
        };

        let tables = self.read()?;
        let dataset = &tables.dataset;
        let nation_name = recipe.nation.and_then(|code| {
            dataset
                .nations
                .iter()
                .find(|n| n.code == code)
                .map(|n| n.name.clone())
        });
        let type_name = recipe.kind.and_then(|code| {
            dataset
                .types
                .iter()
                .find(|t| t.code == code)
                .map(|t| t.name.clone())
        });

        Ok(Some(RecipeDetail {
            nation_name,
            type_name,
            ingredients: dataset
                .ingredients
                .iter()
                .filter(|i| i.recipe_id == id)
                .cloned()
                .collect(),
            process: dataset
                .process
                .iter()
                .filter(|p| p.recipe_id == id)
                .cloned()
                .collect(),
            recipe,
        }))
    }

    fn nations(&self) -> Result<Vec<NationInfo>, StoreError> {
        Ok(self.read()?.dataset.nations.clone())
    }

    fn types(&self) -> Result<Vec<TypeInfo>, StoreError> {
        Ok(self.read()?.dataset.types.clone())
    }

    fn update_calories(&self, batch: &[CalorieUpdate]) -> Result<usize, StoreError> {
        if batch.is_empty() {
            return Ok(0);
        }

        let mut tables = self.write()?;
        let mut recipes = tables.dataset.recipes.clone();

        for update in batch {
            let idx = recipes
                .binary_search_by_key(&update.recipe_id, |r| r.id)
                .map_err(|_| StoreError::NotFound(update.recipe_id))?;
            let recipe = &mut recipes[idx];
            if recipe.has_known_calorie() {
                return Err(StoreError::CalorieAlreadySet(recipe.id));
            }
            recipe.calorie = update.calorie;
        }

        self.persist(vec![(
            RECIPE_BASE,
            stage_table(&self.dir, RECIPE_BASE, &recipes),
        )])?;

        tables.dataset.recipes = recipes;
        Ok(batch.len())
    }

    fn search_by_ingredient(
        &self,
        keyword: &str,
        filter: &CategoryFilter,
    ) -> Result<Vec<Recipe>, StoreError> {
        let tables = self.read()?;
        let dataset = &tables.dataset;

        let matching: HashSet<RecipeId> = dataset
            .ingredients
            .iter()
            .filter(|i| i.name.contains(keyword))
            .map(|i| i.recipe_id)
            .collect();

        Ok(dataset
            .recipes
            .iter()
            .filter(|r| matching.contains(&r.id) && filter.matches(r))
            .cloned()
            .collect())
    }

    fn nutrition_count(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.nutrition.len())
    }

    fn replace_nutrition(&self, rows: Vec<NutritionInfo>) -> Result<(), StoreError> {
        // FOOD_NAME is the key; the first row for a name wins
        let mut by_name: BTreeMap<String, NutritionInfo> = BTreeMap::new();
        for row in rows {
            by_name.entry(row.food_name.clone()).or_insert(row);
        }
        let rows: Vec<NutritionInfo> = by_name.into_values().collect();

        let mut tables = self.write()?;
        self.persist(vec![(
            NUTRITION_INFO,
            stage_table(&self.dir, NUTRITION_INFO, &rows),
        )])?;
        tables.nutrition = rows;
        Ok(())
    }
}

#[cfg(test)]
impl BackendCsv {
    pub fn data_dir(&self) -> &DataDir {
        &self.dir
    }
}

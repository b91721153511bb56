use chrono::Local;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::{
    app::{errors::AppError, factory::AppPaths},
    config::Config,
    events::{
        DwellEvent, EventSink, RecipeView, RecommendEvent, SearchEvent, SearchId, SearchKind,
    },
    filter::CategoryFilter,
    impute::{impute_missing_calories, ImputationReport},
    ingest::{self, IngestReport, NameIndex, RecipeSource},
    recipes::{NationInfo, Recipe, RecipeDetail, RecipeId, RecipeStore, TypeInfo},
    semantic::SemanticSearch,
};

/// One shown result. `score` is the cosine similarity for name search and
/// absent for ingredient search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub recipe: Recipe,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOutcome {
    pub search_id: SearchId,
    pub hits: Vec<SearchHit>,
}

/// Codes a [`CategoryFilter`] can constrain on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Categories {
    pub nations: Vec<NationInfo>,
    pub types: Vec<TypeInfo>,
}

/// Loads the name search on first use. The error is kept so name search
/// can report it on every call.
pub type SemanticLoader = Box<dyn FnOnce() -> Result<SemanticSearch, String> + Send>;

/// Query-time entry point wiring the recipe store, name search and the
/// event sink together.
pub struct RecipeApp {
    store: Arc<dyn RecipeStore>,
    semantic: Lazy<Result<SemanticSearch, String>, SemanticLoader>,
    sink: Arc<dyn EventSink>,
    config: Config,
    vectors_path: PathBuf,
    nutrition_csv: PathBuf,
}

impl RecipeApp {
    /// `semantic` runs the first time a command needs the embedding model,
    /// so ingredient search and detail never wait for a model download.
    pub fn new(
        store: Arc<dyn RecipeStore>,
        semantic: SemanticLoader,
        sink: Arc<dyn EventSink>,
        config: Config,
        paths: &AppPaths,
    ) -> Self {
        let nutrition_csv = paths.base_path.join(&config.ingest.nutrition_csv);
        Self {
            store,
            semantic: Lazy::new(semantic),
            sink,
            config,
            vectors_path: paths.vectors_path.clone(),
            nutrition_csv,
        }
    }

    fn loaded_semantic(&self) -> &Result<SemanticSearch, String> {
        let loaded = Lazy::force(&self.semantic);
        if let Err(err) = loaded {
            log::warn!("name search disabled: {}", err);
        }
        loaded
    }

    fn semantic(&self) -> Result<&SemanticSearch, AppError> {
        self.loaded_semantic()
            .as_ref()
            .map_err(|err| AppError::ModelUnavailable(err.clone()))
    }

    /// Rank the recipes passing `filter` by name similarity to `query`.
    ///
    /// An empty filtered set is an empty outcome, not an error. Without a
    /// loaded model this fails with [`AppError::ModelUnavailable`].
    pub fn search_by_name(
        &self,
        query: &str,
        filter: &CategoryFilter,
    ) -> Result<SearchOutcome, AppError> {
        let semantic = self.semantic()?;
        if semantic.indexed_count() == 0 {
            log::warn!("no recipe names are indexed, run `rcp reindex`");
        }

        let recipes = self.store.recipes()?;
        let candidates = filter.apply(&recipes);
        let candidate_ids: Vec<RecipeId> = candidates.iter().map(|r| r.id).collect();

        let scored = if candidate_ids.is_empty() {
            vec![]
        } else {
            semantic.search(query, &candidate_ids, self.config.search.top_k)?
        };

        let hits = scored
            .into_iter()
            .filter_map(|s| {
                candidates
                    .iter()
                    .find(|r| r.id == s.id)
                    .map(|r| SearchHit {
                        recipe: (*r).clone(),
                        score: Some(s.score),
                    })
            })
            .collect();

        Ok(self.emit(SearchKind::Name, query, filter, hits))
    }

    /// Recipes with an ingredient containing `keyword`, ascending by id.
    /// Works whether or not the embedding model loaded.
    pub fn search_by_ingredient(
        &self,
        keyword: &str,
        filter: &CategoryFilter,
    ) -> Result<SearchOutcome, AppError> {
        let hits = self
            .store
            .search_by_ingredient(keyword, filter)?
            .into_iter()
            .map(|recipe| SearchHit {
                recipe,
                score: None,
            })
            .collect();

        Ok(self.emit(SearchKind::Ingredient, keyword, filter, hits))
    }

    fn emit(
        &self,
        kind: SearchKind,
        keyword: &str,
        filter: &CategoryFilter,
        hits: Vec<SearchHit>,
    ) -> SearchOutcome {
        let search_id = SearchId::new();
        let event = SearchEvent {
            search_id: search_id.clone(),
            kind,
            keyword: keyword.to_string(),
            nation: filter.nation,
            type_code: filter.kind,
            at: Local::now(),
        };
        if let Err(err) = self.sink.search(&event) {
            log::error!("failed to record search {}: {}", search_id, err);
        }

        let shown: Vec<RecipeId> = hits.iter().map(|h| h.recipe.id).collect();
        if let Err(err) = self
            .sink
            .recommend(&RecommendEvent::for_results(&search_id, &shown))
        {
            log::error!("failed to record results of search {}: {}", search_id, err);
        }

        log::debug!("search {} ({:?}) returned {} hits", search_id, kind, shown.len());
        SearchOutcome { search_id, hits }
    }

    /// Record a finished view. Returns false when the view was too short
    /// to count.
    pub fn record_view(&self, view: RecipeView) -> Result<bool, AppError> {
        let Some(event) = DwellEvent::from_view(view) else {
            return Ok(false);
        };
        self.sink
            .dwell(&event)
            .map_err(|err| AppError::StorageUnavailable(err.to_string()))?;
        Ok(true)
    }

    pub fn categories(&self) -> Result<Categories, AppError> {
        Ok(Categories {
            nations: self.store.nations()?,
            types: self.store.types()?,
        })
    }

    pub fn detail(&self, id: RecipeId) -> Result<RecipeDetail, AppError> {
        self.store.detail(id)?.ok_or(AppError::NotFound(id))
    }

    /// Load `source` into the store. Refuses when the store already holds
    /// recipes unless `force` is set.
    pub fn ingest(&self, source: &dyn RecipeSource, force: bool) -> Result<IngestReport, AppError> {
        if !force && !self.store.is_empty()? {
            return Err(AppError::AlreadyIngested(self.store.recipes()?.len()));
        }

        let dataset = ingest::collect(source, &self.config)?;
        let index = match self.loaded_semantic() {
            Ok(semantic) => NameIndex::Model(semantic),
            Err(_) => NameIndex::Unavailable(&self.vectors_path),
        };
        let report = ingest::ingest(
            dataset,
            self.store.as_ref(),
            index,
            &self.config,
            &self.nutrition_csv,
        )?;
        Ok(report)
    }

    /// Fill the calories still missing in the store.
    pub fn impute(&self) -> Result<ImputationReport, AppError> {
        Ok(impute_missing_calories(
            self.store.as_ref(),
            &self.config.imputation,
        )?)
    }

    /// Re-embed every stored recipe name, replacing the vector file.
    pub fn reindex(&self) -> Result<usize, AppError> {
        let semantic = self.semantic()?;
        let names: Vec<_> = self
            .store
            .recipes()?
            .into_iter()
            .map(|r| (r.id, r.name))
            .collect();
        Ok(semantic.build(&names)?)
    }
}

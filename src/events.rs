//! Search, recommendation and dwell events.
//!
//! Every search gets a [`SearchId`]; the recommendation rows of the shown
//! results and later dwell records carry the same id so the three logs
//! can be joined.

use chrono::{DateTime, Local};
use serde::{Serialize, Serializer};
use std::convert::Infallible;
use std::fs::OpenOptions;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;
use std::{fmt::Display, ops::Deref};

use crate::recipes::{NationCode, RecipeId, TypeCode};
use crate::storage::DataDir;

/// Views this short are noise, not a genuine look at the recipe.
pub const MIN_DWELL: Duration = Duration::from_secs(3);

const SEARCH_LOG: &str = "SEARCH_LOG.csv";
const RECOMMEND_LOG: &str = "RECOMMEND_LOG.csv";
const DWELL_TIME_LOG: &str = "DWELL_TIME_LOG.csv";

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SearchId(String);

impl Display for SearchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SearchId {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(SearchId(s.to_string()))
    }
}

impl Deref for SearchId {
    type Target = String;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<&str> for SearchId {
    fn from(fr: &str) -> Self {
        SearchId(fr.to_string())
    }
}

impl SearchId {
    #[inline]
    pub fn new() -> SearchId {
        SearchId(rusty_ulid::generate_ulid_string())
    }
}

impl Default for SearchId {
    fn default() -> Self {
        Self::new()
    }
}

/// Search path, stored as its numeric code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchKind {
    Name,
    Ingredient,
}

impl SearchKind {
    pub fn code(&self) -> u8 {
        match self {
            SearchKind::Name => 1,
            SearchKind::Ingredient => 2,
        }
    }
}

impl Serialize for SearchKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SearchEvent {
    #[serde(rename = "SRCH_ID")]
    pub search_id: SearchId,
    #[serde(rename = "SRCH_CODE")]
    pub kind: SearchKind,
    #[serde(rename = "SRCH_KEYWORD")]
    pub keyword: String,
    #[serde(rename = "NATION_CODE")]
    pub nation: Option<NationCode>,
    #[serde(rename = "TY_CODE")]
    pub type_code: Option<TypeCode>,
    #[serde(rename = "SRCH_TIME")]
    pub at: DateTime<Local>,
}

/// One shown result; `rank` starts at 1.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RecommendEvent {
    #[serde(rename = "SRCH_ID")]
    pub search_id: SearchId,
    #[serde(rename = "RECIPE_ID")]
    pub recipe_id: RecipeId,
    #[serde(rename = "RANK")]
    pub rank: u32,
}

impl RecommendEvent {
    pub fn for_results(search_id: &SearchId, recipe_ids: &[RecipeId]) -> Vec<RecommendEvent> {
        recipe_ids
            .iter()
            .enumerate()
            .map(|(idx, id)| RecommendEvent {
                search_id: search_id.clone(),
                recipe_id: *id,
                rank: idx as u32 + 1,
            })
            .collect()
    }
}

/// A finished view of one recipe, as reported by the caller.
#[derive(Clone, Debug, PartialEq)]
pub struct RecipeView {
    pub search_id: SearchId,
    pub recipe_id: RecipeId,
    pub started_at: DateTime<Local>,
    pub dwell: Duration,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DwellEvent {
    #[serde(rename = "SRCH_ID")]
    pub search_id: SearchId,
    #[serde(rename = "RECIPE_ID")]
    pub recipe_id: RecipeId,
    #[serde(rename = "START_TIME")]
    pub started_at: DateTime<Local>,
    /// Whole seconds
    #[serde(rename = "DWELL_TIME")]
    pub dwell_secs: u64,
}

impl DwellEvent {
    /// `None` when the view lasted [`MIN_DWELL`] or less.
    pub fn from_view(view: RecipeView) -> Option<DwellEvent> {
        if view.dwell <= MIN_DWELL {
            log::debug!(
                "dropping {:.1}s view of recipe {}",
                view.dwell.as_secs_f64(),
                view.recipe_id
            );
            return None;
        }

        Some(DwellEvent {
            search_id: view.search_id,
            recipe_id: view.recipe_id,
            started_at: view.started_at,
            dwell_secs: view.dwell.as_secs(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("event log lock poisoned")]
    Poisoned,
}

/// Receives events; persisting them is up to the implementation.
pub trait EventSink: Send + Sync {
    fn search(&self, event: &SearchEvent) -> Result<(), EventError>;
    fn recommend(&self, events: &[RecommendEvent]) -> Result<(), EventError>;
    fn dwell(&self, event: &DwellEvent) -> Result<(), EventError>;
}

/// Appends events to `SEARCH_LOG.csv`, `RECOMMEND_LOG.csv` and
/// `DWELL_TIME_LOG.csv`. A header is written when a file is created.
pub struct CsvEventLog {
    dir: DataDir,
    lock: Mutex<()>,
}

impl CsvEventLog {
    pub fn new(dir: DataDir) -> Self {
        Self {
            dir,
            lock: Mutex::new(()),
        }
    }

    fn append<T: Serialize>(&self, ident: &str, rows: &[T]) -> Result<(), EventError> {
        if rows.is_empty() {
            return Ok(());
        }
        let _guard = self.lock.lock().map_err(|_| EventError::Poisoned)?;

        let path = self.dir.path(ident);
        let is_new = std::fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(is_new)
            .from_writer(file);
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl EventSink for CsvEventLog {
    fn search(&self, event: &SearchEvent) -> Result<(), EventError> {
        self.append(SEARCH_LOG, std::slice::from_ref(event))
    }

    fn recommend(&self, events: &[RecommendEvent]) -> Result<(), EventError> {
        self.append(RECOMMEND_LOG, events)
    }

    fn dwell(&self, event: &DwellEvent) -> Result<(), EventError> {
        self.append(DWELL_TIME_LOG, std::slice::from_ref(event))
    }
}

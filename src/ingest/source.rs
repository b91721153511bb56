//! Paged access to the raw recipe tables.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt::Display;
use std::path::PathBuf;
use std::sync::Mutex;

pub type RawRow = Map<String, Value>;

/// The three raw tables of the open-data recipe service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Base,
    Ingredient,
    Process,
}

impl Table {
    /// Dataset identifier used by the open-data service.
    pub fn grid(&self) -> &'static str {
        match self {
            Table::Base => "Grid_20150827000000000226_1",
            Table::Ingredient => "Grid_20150827000000000227_1",
            Table::Process => "Grid_20150827000000000228_1",
        }
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Table::Base => write!(f, "base"),
            Table::Ingredient => write!(f, "ingredient"),
            Table::Process => write!(f, "process"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("{table} dump not found at {path}")]
    Missing { table: Table, path: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed dump: {0}")]
    Malformed(String),
}

/// Something that serves rows `start..=end` (1-based) of a table.
pub trait RecipeSource {
    fn fetch_page(&self, table: Table, start: u64, end: u64) -> Result<Vec<RawRow>, SourceError>;
}

/// Fetch rows `1..=total` in pages of `step`. A failing page ends the
/// fetch; the rows of earlier pages are kept.
pub fn fetch_all(source: &dyn RecipeSource, table: Table, total: u64, step: u64) -> Vec<RawRow> {
    let step = step.max(1);
    let mut rows = vec![];
    let mut start = 1;
    while start <= total {
        let end = (start + step - 1).min(total);
        log::debug!("fetching {} rows {}..={}", table, start, end);
        match source.fetch_page(table, start, end) {
            Ok(page) => rows.extend(page),
            Err(err) => {
                log::warn!("stopped fetching {} rows at {}..={}: {}", table, start, end, err);
                break;
            }
        }
        start += step;
    }
    log::info!("fetched {} {} rows", rows.len(), table);
    rows
}

/// Reads service responses saved as `<dir>/<grid>.json`, each shaped like
/// `{"<grid>": {"row": [...]}}`, and pages through their rows.
pub struct JsonDumpSource {
    dir: PathBuf,
    loaded: Mutex<HashMap<Table, Vec<RawRow>>>,
}

impl JsonDumpSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            loaded: Mutex::new(HashMap::new()),
        }
    }

    fn read_dump(&self, table: Table) -> Result<Vec<RawRow>, SourceError> {
        let path = self.dir.join(format!("{}.json", table.grid()));
        if !path.exists() {
            return Err(SourceError::Missing {
                table,
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(&path)?;
        let mut doc: Value = serde_json::from_str(&content)
            .map_err(|e| SourceError::Malformed(format!("{}: {}", path.display(), e)))?;

        // a response without the grid or its rows carries no data
        let rows = match doc.get_mut(table.grid()).and_then(|g| g.get_mut("row")) {
            Some(Value::Array(rows)) => std::mem::take(rows),
            Some(_) => {
                return Err(SourceError::Malformed(format!(
                    "{}: \"row\" is not an array",
                    path.display()
                )))
            }
            None => vec![],
        };

        rows.into_iter()
            .map(|row| match row {
                Value::Object(map) => Ok(map),
                other => Err(SourceError::Malformed(format!(
                    "{}: row is not an object: {}",
                    path.display(),
                    other
                ))),
            })
            .collect()
    }
}

impl RecipeSource for JsonDumpSource {
    fn fetch_page(&self, table: Table, start: u64, end: u64) -> Result<Vec<RawRow>, SourceError> {
        let mut loaded = self
            .loaded
            .lock()
            .map_err(|_| SourceError::Malformed("dump cache lock poisoned".to_string()))?;

        if !loaded.contains_key(&table) {
            let rows = self.read_dump(table)?;
            loaded.insert(table, rows);
        }
        let rows = loaded.get(&table).map(Vec::as_slice).unwrap_or_default();

        let from = (start.saturating_sub(1) as usize).min(rows.len());
        let to = (end as usize).min(rows.len()).max(from);
        Ok(rows[from..to].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;

    fn row(id: u64) -> RawRow {
        match json!({ "RECIPE_ID": id }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    struct Paged {
        rows: u64,
        fail_from: Option<u64>,
        calls: RefCell<Vec<(u64, u64)>>,
    }

    impl RecipeSource for Paged {
        fn fetch_page(&self, _: Table, start: u64, end: u64) -> Result<Vec<RawRow>, SourceError> {
            self.calls.borrow_mut().push((start, end));
            if self.fail_from.is_some_and(|f| start >= f) {
                return Err(SourceError::Malformed("boom".into()));
            }
            Ok((start..=end.min(self.rows)).map(row).collect())
        }
    }

    #[test]
    fn pages_cover_the_total() {
        let source = Paged {
            rows: 250,
            fail_from: None,
            calls: RefCell::new(vec![]),
        };
        let rows = fetch_all(&source, Table::Base, 250, 100);

        assert_eq!(rows.len(), 250);
        assert_eq!(*source.calls.borrow(), vec![(1, 100), (101, 200), (201, 250)]);
    }

    #[test]
    fn failing_page_stops_the_fetch() {
        let source = Paged {
            rows: 300,
            fail_from: Some(101),
            calls: RefCell::new(vec![]),
        };
        let rows = fetch_all(&source, Table::Ingredient, 300, 100);

        assert_eq!(rows.len(), 100);
        assert_eq!(source.calls.borrow().len(), 2);
    }

    #[test]
    fn json_dump_pages() {
        let tmp = tempfile::tempdir().unwrap();
        let grid = Table::Process.grid();
        let rows: Vec<Value> = (1..=5).map(|i| json!({ "RECIPE_ID": i, "COOKING_NO": 1 })).collect();
        std::fs::write(
            tmp.path().join(format!("{grid}.json")),
            json!({ grid: { "totalCnt": 5, "row": rows } }).to_string(),
        )
        .unwrap();

        let source = JsonDumpSource::new(tmp.path());
        assert_eq!(source.fetch_page(Table::Process, 1, 2).unwrap().len(), 2);
        assert_eq!(source.fetch_page(Table::Process, 4, 10).unwrap().len(), 2);
        assert!(source.fetch_page(Table::Process, 11, 20).unwrap().is_empty());
        assert_eq!(fetch_all(&source, Table::Process, 3100, 100).len(), 5);
    }

    #[test]
    fn json_dump_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let source = JsonDumpSource::new(tmp.path());
        assert!(matches!(
            source.fetch_page(Table::Base, 1, 100),
            Err(SourceError::Missing { table: Table::Base, .. })
        ));
        assert!(fetch_all(&source, Table::Base, 1000, 100).is_empty());
    }

    #[test]
    fn json_dump_without_rows_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let grid = Table::Base.grid();
        std::fs::write(tmp.path().join(format!("{grid}.json")), r#"{"RESULT": {}}"#).unwrap();

        let source = JsonDumpSource::new(tmp.path());
        assert!(source.fetch_page(Table::Base, 1, 100).unwrap().is_empty());
    }
}

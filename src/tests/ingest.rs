use serde_json::{json, Value};
use std::path::Path;

use crate::config::Config;
use crate::ingest::{collect, ingest, IngestError, JsonDumpSource, NameIndex, Table};
use crate::impute::ImputeError;
use crate::recipes::RecipeStore;
use crate::semantic::SemanticSearch;

use super::support::*;

fn write_dump(dir: &Path, table: Table, rows: Vec<Value>) {
    let grid = table.grid();
    std::fs::write(
        dir.join(format!("{grid}.json")),
        json!({ grid: { "totalCnt": rows.len(), "row": rows } }).to_string(),
    )
    .unwrap();
}

fn base_row(id: u64, name: &str, nation: (&str, &str), kind: (&str, &str), calorie: &str) -> Value {
    json!({
        "RECIPE_ID": id,
        "RECIPE_NM_KO": name,
        "SUMRY": format!("{name} 레시피"),
        "NATION_CODE": nation.0,
        "NATION_NM": nation.1,
        "TY_CODE": kind.0,
        "TY_NM": kind.1,
        "COOKING_TIME": "30분",
        "CALORIE": calorie,
        "QNT": "2인분"
    })
}

/// Dumps for four Korean and Japanese dishes, one of them without a calorie.
pub(super) fn write_dumps(dir: &Path, calories: [&str; 4]) {
    let korean = ("3020001", "한식");
    let japanese = ("3020009", "일본");
    let soup = ("3010002", "국");
    let rice = ("3010001", "밥");

    write_dump(
        dir,
        Table::Base,
        vec![
            base_row(1, "미역국", korean, soup, calories[0]),
            base_row(2, "콩나물국", korean, soup, calories[1]),
            base_row(3, "초밥", japanese, rice, calories[2]),
            base_row(4, "유부초밥", japanese, rice, calories[3]),
        ],
    );
    write_dump(
        dir,
        Table::Ingredient,
        vec![
            json!({ "RECIPE_ID": 1, "IRDNT_NM": "미역(건조)", "IRDNT_CPCTY": "20g" }),
            json!({ "RECIPE_ID": 1, "IRDNT_NM": "소고기", "IRDNT_CPCTY": "100g" }),
            json!({ "RECIPE_ID": 2, "IRDNT_NM": "콩나물", "IRDNT_CPCTY": "200g" }),
            json!({ "RECIPE_ID": 3, "IRDNT_NM": "밥", "IRDNT_CPCTY": "2공기" }),
            json!({ "RECIPE_ID": 3, "IRDNT_NM": "연어", "IRDNT_CPCTY": "150g" }),
            json!({ "RECIPE_ID": 4, "IRDNT_NM": "밥", "IRDNT_CPCTY": "2공기" }),
            json!({ "RECIPE_ID": 4, "IRDNT_NM": "유부", "IRDNT_CPCTY": "10장" }),
        ],
    );
    write_dump(
        dir,
        Table::Process,
        vec![
            json!({ "RECIPE_ID": 1, "COOKING_NO": 1, "COOKING_DC": "미역을 불린다" }),
            json!({ "RECIPE_ID": 1, "COOKING_NO": 2, "COOKING_DC": "소고기와 볶다가 물을 붓는다" }),
        ],
    );
}

fn write_nutrition(path: &Path) {
    std::fs::write(
        path,
        "식품군,식품명,에너지,탄수화물,단백질,지방,당류\n\
         ,,kcal,g,g,g,g\n\
         곡류,쌀밥,143,31.7,2.5,0.3,0\n\
         해조류,미역,18,3.4,2.1,0.2,0\n",
    )
    .unwrap();
}

fn small_config() -> Config {
    let mut config = Config::default();
    config.imputation.n_estimators = 10;
    config
}

#[test]
fn full_pipeline_writes_every_table() {
    let dumps = tempfile::tempdir().unwrap();
    write_dumps(dumps.path(), ["150Kcal", "90Kcal", "", "480Kcal"]);
    let nutrition = dumps.path().join("nutrition_info.csv");
    write_nutrition(&nutrition);

    let (store, tmp) = fresh_store();
    let semantic = SemanticSearch::open(embedder(32), tmp.path().join("vectors.bin")).unwrap();
    let config = small_config();

    let dataset = collect(&JsonDumpSource::new(dumps.path()), &config).unwrap();
    let index = NameIndex::Model(&semantic);
    let report = ingest(dataset, &store, index, &config, &nutrition).unwrap();

    assert_eq!(report.recipes, 4);
    assert_eq!(report.ingredients, 7);
    assert_eq!(report.steps, 2);
    assert_eq!(report.embedded, Some(4));
    assert_eq!(report.imputation.imputed, 1);
    assert_eq!(report.nutrition, Some(2));

    // 3020009 is folded into 3020005 and renamed
    let nations = store.nations().unwrap();
    assert!(nations.iter().any(|n| n.code.0 == 3020005 && n.name == "일식"));
    assert!(store.recipes().unwrap().iter().all(|r| r.calorie > 0));
    assert_eq!(semantic.indexed_count(), 4);
    assert!(tmp.path().join("vectors.bin").exists());
}

#[test]
fn pipeline_without_model_still_writes_tables() {
    let dumps = tempfile::tempdir().unwrap();
    write_dumps(dumps.path(), ["150Kcal", "90Kcal", "300Kcal", "480Kcal"]);

    let (store, tmp) = fresh_store();
    let config = small_config();
    let dataset = collect(&JsonDumpSource::new(dumps.path()), &config).unwrap();
    let report = ingest(
        dataset,
        &store,
        NameIndex::Unavailable(&tmp.path().join("vectors.bin")),
        &config,
        &dumps.path().join("missing.csv"),
    )
    .unwrap();

    assert_eq!(report.embedded, None);
    assert_eq!(report.nutrition, None);
    assert_eq!(report.imputation.imputed, 0);
    assert_eq!(store.recipes().unwrap().len(), 4);
}

#[test]
fn failed_imputation_restores_previous_state() {
    let (store, tmp) = fresh_store();
    store.replace_all(sample_dataset()).unwrap();
    let semantic = SemanticSearch::open(embedder(32), tmp.path().join("vectors.bin")).unwrap();
    let names: Vec<_> = store
        .recipes()
        .unwrap()
        .into_iter()
        .map(|r| (r.id, r.name))
        .collect();
    semantic.build(&names).unwrap();
    let before = store.snapshot().unwrap();

    // no calorie anywhere: nothing to train on
    let dumps = tempfile::tempdir().unwrap();
    write_dumps(dumps.path(), ["", "", "", ""]);
    let nutrition = dumps.path().join("nutrition_info.csv");
    write_nutrition(&nutrition);

    let config = small_config();
    let dataset = collect(&JsonDumpSource::new(dumps.path()), &config).unwrap();
    let index = NameIndex::Model(&semantic);
    let err = ingest(dataset, &store, index, &config, &nutrition).unwrap_err();
    assert!(matches!(
        err,
        IngestError::Impute(ImputeError::EmptyTrainingSet)
    ));

    assert_eq!(store.snapshot().unwrap(), before);
    assert_eq!(store.nutrition_count().unwrap(), 0);
    assert_eq!(semantic.indexed_count(), 6);
    assert!(semantic.embedding(1).is_some());

    // the files on disk hold the previous tables as well
    let reloaded = crate::recipes::BackendCsv::load(store.data_dir().clone()).unwrap();
    assert_eq!(reloaded.snapshot().unwrap(), before);
}

#[test]
fn failed_embedding_writes_nothing() {
    let dumps = tempfile::tempdir().unwrap();
    write_dumps(dumps.path(), ["150Kcal", "90Kcal", "300Kcal", "480Kcal"]);

    let (store, tmp) = fresh_store();
    let semantic = SemanticSearch::open(
        std::sync::Arc::new(HashEmbedder::failing("hash-test", 32)),
        tmp.path().join("vectors.bin"),
    )
    .unwrap();

    let config = small_config();
    let dataset = collect(&JsonDumpSource::new(dumps.path()), &config).unwrap();
    let err = ingest(
        dataset,
        &store,
        NameIndex::Model(&semantic),
        &config,
        &dumps.path().join("missing.csv"),
    )
    .unwrap_err();

    assert!(matches!(err, IngestError::Embedding(_)));
    assert!(store.is_empty().unwrap());
}

#[test]
fn nutrition_is_loaded_only_once() {
    let dumps = tempfile::tempdir().unwrap();
    write_dumps(dumps.path(), ["150Kcal", "90Kcal", "300Kcal", "480Kcal"]);
    let nutrition = dumps.path().join("nutrition_info.csv");
    write_nutrition(&nutrition);

    let (store, tmp) = fresh_store();
    let config = small_config();
    let source = JsonDumpSource::new(dumps.path());
    let vectors = tmp.path().join("vectors.bin");
    let run = || {
        let dataset = collect(&source, &config).unwrap();
        ingest(dataset, &store, NameIndex::Unavailable(&vectors), &config, &nutrition).unwrap()
    };

    let first = run();
    assert_eq!(first.nutrition, Some(2));

    let second = run();
    assert_eq!(second.nutrition, None);
    assert_eq!(store.nutrition_count().unwrap(), 2);
}

#[test]
fn ingest_without_model_drops_vectors_of_previous_tables() {
    let (store, tmp) = fresh_store();
    store.replace_all(sample_dataset()).unwrap();
    let vectors = tmp.path().join("vectors.bin");
    let names: Vec<_> = store
        .recipes()
        .unwrap()
        .into_iter()
        .map(|r| (r.id, r.name))
        .collect();
    SemanticSearch::open(embedder(32), vectors.clone())
        .unwrap()
        .build(&names)
        .unwrap();

    let mut dataset = sample_dataset();
    dataset.recipes[2].name = "짬뽕".to_string();
    dataset.recipes.push(recipe(7, "잡채", KOREAN, MAIN_DISH, 250));
    ingest(
        dataset,
        &store,
        NameIndex::Unavailable(&vectors),
        &small_config(),
        &tmp.path().join("missing.csv"),
    )
    .unwrap();

    assert!(!vectors.exists());
    let reopened = SemanticSearch::open(embedder(32), vectors).unwrap();
    assert_eq!(reopened.indexed_count(), 0);
    assert!(reopened.embedding(3).is_none());
}

#[test]
fn failed_ingest_without_model_keeps_vectors() {
    let (store, tmp) = fresh_store();
    store.replace_all(sample_dataset()).unwrap();
    let vectors = tmp.path().join("vectors.bin");
    SemanticSearch::open(embedder(32), vectors.clone())
        .unwrap()
        .build(&[(1, "김치찌개".to_string())])
        .unwrap();

    let dumps = tempfile::tempdir().unwrap();
    write_dumps(dumps.path(), ["", "", "", ""]);
    let config = small_config();
    let dataset = collect(&JsonDumpSource::new(dumps.path()), &config).unwrap();
    let err = ingest(
        dataset,
        &store,
        NameIndex::Unavailable(&vectors),
        &config,
        &dumps.path().join("missing.csv"),
    )
    .unwrap_err();

    assert!(matches!(err, IngestError::Impute(ImputeError::EmptyTrainingSet)));
    assert_eq!(store.recipes().unwrap().len(), 6);
    assert_eq!(
        SemanticSearch::open(embedder(32), vectors).unwrap().indexed_count(),
        1
    );
}

use std::sync::{Arc, Mutex};

use crate::events::{DwellEvent, EventError, EventSink, RecommendEvent, SearchEvent};
use crate::recipes::{
    BackendCsv, Dataset, IngredientLine, NationCode, NationInfo, ProcessStep, Recipe, TypeCode,
    TypeInfo,
};
use crate::semantic::{Embedder, EmbeddingError};
use crate::storage::DataDir;

/// Deterministic bag-of-characters embedder.
///
/// Every character and character bigram of the text lands in one of
/// `dims` buckets, so identical texts embed identically and texts that
/// share syllables score higher than texts that share none.
pub struct HashEmbedder {
    name: String,
    dims: usize,
    fail: bool,
}

impl HashEmbedder {
    pub fn named(name: &str, dims: usize) -> Self {
        Self {
            name: name.to_string(),
            dims,
            fail: false,
        }
    }

    /// Embedder whose every call fails, standing in for a model that
    /// could not be loaded.
    pub fn failing(name: &str, dims: usize) -> Self {
        Self {
            fail: true,
            ..Self::named(name, dims)
        }
    }

    fn bucket(&self, feature: &str) -> usize {
        // FNV-1a
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in feature.as_bytes() {
            hash ^= *byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        (hash % self.dims as u64) as usize
    }
}

impl Embedder for HashEmbedder {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if self.fail {
            return Err(EmbeddingError::EmbeddingFailed(format!(
                "model '{}' is not loaded",
                self.name
            )));
        }

        let mut vector = vec![0.0f32; self.dims];
        let chars: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
        for c in &chars {
            vector[self.bucket(&c.to_string())] += 1.0;
        }
        for pair in chars.windows(2) {
            let bigram: String = pair.iter().collect();
            vector[self.bucket(&bigram)] += 0.5;
        }
        Ok(vector)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

pub fn embedder(dims: usize) -> Arc<dyn Embedder> {
    Arc::new(HashEmbedder::named("hash-test", dims))
}

pub const KOREAN: NationCode = NationCode(3020001);
pub const CHINESE: NationCode = NationCode(3020002);
pub const WESTERN: NationCode = NationCode(3020003);

pub const MAIN_DISH: TypeCode = TypeCode(3010001);
pub const SOUP: TypeCode = TypeCode(3010002);

pub fn recipe(id: u64, name: &str, nation: NationCode, kind: TypeCode, calorie: u32) -> Recipe {
    Recipe {
        id,
        name: name.to_string(),
        summary: format!("{name} 만드는 법"),
        nation: Some(nation),
        kind: Some(kind),
        cooking_minutes: 30,
        calorie,
        servings: 2,
    }
}

pub fn line(recipe_id: u64, seq: u32, name: &str, quantity: &str) -> IngredientLine {
    IngredientLine {
        recipe_id,
        seq,
        name: name.to_string(),
        quantity: quantity.to_string(),
    }
}

pub fn step(recipe_id: u64, step: u32, description: &str) -> ProcessStep {
    ProcessStep {
        recipe_id,
        step,
        description: description.to_string(),
    }
}

/// Six recipes across three nations and two types, all with known calories.
pub fn sample_dataset() -> Dataset {
    Dataset {
        recipes: vec![
            recipe(1, "김치찌개", KOREAN, SOUP, 320),
            recipe(2, "된장찌개", KOREAN, SOUP, 250),
            recipe(3, "불고기", KOREAN, MAIN_DISH, 480),
            recipe(4, "마파두부", CHINESE, MAIN_DISH, 410),
            recipe(5, "짬뽕", CHINESE, SOUP, 690),
            recipe(6, "토마토 파스타", WESTERN, MAIN_DISH, 560),
        ],
        ingredients: vec![
            line(1, 1, "김치", "200g"),
            line(1, 2, "돼지고기(앞다리)", "100g"),
            line(1, 3, "두부", "1/2모"),
            line(2, 1, "된장", "2큰술"),
            line(2, 2, "두부", "1/2모"),
            line(2, 3, "애호박", "1/3개"),
            line(3, 1, "소고기", "300g"),
            line(3, 2, "간장", "3큰술"),
            line(4, 1, "두부", "1모"),
            line(4, 2, "돼지고기", "100g"),
            line(4, 3, "두반장", "1큰술"),
            line(5, 1, "오징어", "1마리"),
            line(5, 2, "고춧가루", "2큰술"),
            line(6, 1, "토마토", "2개"),
            line(6, 2, "파스타면", "200g"),
        ],
        process: vec![
            step(1, 1, "김치를 볶는다"),
            step(1, 2, "물을 붓고 끓인다"),
            step(3, 1, "고기를 양념에 재운다"),
        ],
        nations: vec![
            NationInfo { code: KOREAN, name: "한식".to_string() },
            NationInfo { code: CHINESE, name: "중식".to_string() },
            NationInfo { code: WESTERN, name: "양식".to_string() },
        ],
        types: vec![
            TypeInfo { code: MAIN_DISH, name: "메인반찬".to_string() },
            TypeInfo { code: SOUP, name: "국".to_string() },
        ],
    }
}

pub fn fresh_store() -> (BackendCsv, tempfile::TempDir) {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    let dir = DataDir::open(tmp.path()).expect("failed to open data dir");
    let store = BackendCsv::load(dir).expect("failed to load store");
    (store, tmp)
}

/// Keeps every event in memory for inspection.
#[derive(Default)]
pub struct MemorySink {
    pub searches: Mutex<Vec<SearchEvent>>,
    pub recommendations: Mutex<Vec<RecommendEvent>>,
    pub dwells: Mutex<Vec<DwellEvent>>,
}

impl EventSink for MemorySink {
    fn search(&self, event: &SearchEvent) -> Result<(), EventError> {
        self.searches.lock().unwrap().push(event.clone());
        Ok(())
    }

    fn recommend(&self, events: &[RecommendEvent]) -> Result<(), EventError> {
        self.recommendations.lock().unwrap().extend_from_slice(events);
        Ok(())
    }

    fn dwell(&self, event: &DwellEvent) -> Result<(), EventError> {
        self.dwells.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Rejects every event, like a log directory that went read-only.
pub struct BrokenSink;

impl EventSink for BrokenSink {
    fn search(&self, _: &SearchEvent) -> Result<(), EventError> {
        Err(EventError::Poisoned)
    }

    fn recommend(&self, _: &[RecommendEvent]) -> Result<(), EventError> {
        Err(EventError::Poisoned)
    }

    fn dwell(&self, _: &DwellEvent) -> Result<(), EventError> {
        Err(EventError::Poisoned)
    }
}

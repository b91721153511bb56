//! Category filter applied before any ranking.
//!
//! Similarity scores are only compared within one filtered candidate set,
//! so the filter always runs first and narrows the work for the ranker.

use serde::{Deserialize, Serialize};

use crate::recipes::{NationCode, Recipe, TypeCode};

/// Optional nation and type constraints; both present means AND.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nation: Option<NationCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<TypeCode>,
}

impl CategoryFilter {
    pub fn new(nation: Option<NationCode>, kind: Option<TypeCode>) -> Self {
        Self { nation, kind }
    }

    pub fn matches(&self, recipe: &Recipe) -> bool {
        if let Some(nation) = self.nation {
            if recipe.nation != Some(nation) {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if recipe.kind != Some(kind) {
                return false;
            }
        }
        true
    }

    /// Keep the candidates that match, preserving their order.
    pub fn apply<'a, I>(&self, candidates: I) -> Vec<&'a Recipe>
    where
        I: IntoIterator<Item = &'a Recipe>,
    {
        candidates.into_iter().filter(|r| self.matches(r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipe(id: u64, nation: Option<u32>, kind: Option<u32>) -> Recipe {
        Recipe {
            id,
            name: format!("recipe {id}"),
            nation: nation.map(NationCode),
            kind: kind.map(TypeCode),
            ..Default::default()
        }
    }

    fn corpus() -> Vec<Recipe> {
        vec![
            recipe(1, Some(3020001), Some(3010001)),
            recipe(2, Some(3020001), Some(3010002)),
            recipe(3, Some(3020002), Some(3010001)),
            recipe(4, None, Some(3010001)),
            recipe(5, Some(3020002), None),
        ]
    }

    fn ids(recipes: &[&Recipe]) -> Vec<u64> {
        recipes.iter().map(|r| r.id).collect()
    }

    #[test]
    fn unconstrained_keeps_everything() {
        let corpus = corpus();
        let filter = CategoryFilter::default();
        assert_eq!(ids(&filter.apply(&corpus)), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn nation_only() {
        let corpus = corpus();
        let filter = CategoryFilter::new(Some(NationCode(3020002)), None);
        assert_eq!(ids(&filter.apply(&corpus)), vec![3, 5]);
    }

    #[test]
    fn type_only() {
        let corpus = corpus();
        let filter = CategoryFilter::new(None, Some(TypeCode(3010001)));
        assert_eq!(ids(&filter.apply(&corpus)), vec![1, 3, 4]);
    }

    #[test]
    fn both_codes_are_conjunctive() {
        let corpus = corpus();
        let filter = CategoryFilter::new(Some(NationCode(3020001)), Some(TypeCode(3010001)));
        assert_eq!(ids(&filter.apply(&corpus)), vec![1]);
    }

    #[test]
    fn missing_code_never_matches_a_constraint() {
        let corpus = corpus();
        let filter = CategoryFilter::new(Some(NationCode(3020001)), None);
        assert!(!filter.matches(&corpus[3]));
    }

    #[test]
    fn filtering_is_idempotent() {
        let corpus = corpus();
        let filters = [
            CategoryFilter::default(),
            CategoryFilter::new(Some(NationCode(3020001)), None),
            CategoryFilter::new(None, Some(TypeCode(3010001))),
            CategoryFilter::new(Some(NationCode(3020002)), Some(TypeCode(3010001))),
            CategoryFilter::new(Some(NationCode(9)), None),
        ];

        for filter in filters {
            let once = filter.apply(&corpus);
            let twice = filter.apply(once.iter().copied());
            assert_eq!(ids(&once), ids(&twice), "filter {filter:?}");
        }
    }

    #[test]
    fn no_match_yields_empty() {
        let corpus = corpus();
        let filter = CategoryFilter::new(Some(NationCode(1)), Some(TypeCode(1)));
        assert!(filter.apply(&corpus).is_empty());
    }
}

use std::collections::BTreeMap;

use crate::normalize::normalize_ingredient;
use crate::recipes::{IngredientLine, Recipe, RecipeId};

const LINE_DELIMITER: &str = ", ";

/// `"{clean_name} {quantity}"` per line, in sequence order, joined by `", "`.
pub fn feature_text<'a, I>(lines: I) -> String
where
    I: IntoIterator<Item = &'a IngredientLine>,
{
    let mut lines: Vec<&IngredientLine> = lines.into_iter().collect();
    lines.sort_by_key(|l| l.seq);

    lines
        .iter()
        .map(|l| normalize_ingredient(&l.name, &l.quantity).feature_text())
        .collect::<Vec<_>>()
        .join(LINE_DELIMITER)
}

/// Feature text of every recipe; recipes without ingredient lines map to "".
pub fn recipe_features(
    recipes: &[Recipe],
    ingredients: &[IngredientLine],
) -> BTreeMap<RecipeId, String> {
    let mut by_recipe: BTreeMap<RecipeId, Vec<&IngredientLine>> = BTreeMap::new();
    for line in ingredients {
        by_recipe.entry(line.recipe_id).or_default().push(line);
    }

    recipes
        .iter()
        .map(|r| {
            let text = by_recipe
                .remove(&r.id)
                .map(feature_text)
                .unwrap_or_default();
            (r.id, text)
        })
        .collect()
}

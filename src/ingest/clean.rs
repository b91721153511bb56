//! Raw row cleaning.
//!
//! The service mixes numbers and strings freely ("580Kcal", "30분",
//! `3020001` or `"3020001"`), so every field is read leniently.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use super::source::RawRow;
use super::IngestError;
use crate::recipes::{
    IngredientLine, NationCode, NationInfo, ProcessStep, Recipe, RecipeId, TypeCode, TypeInfo,
};

static NOT_NUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\d.]").unwrap());

/// Nation names folded into the categories the app shows.
const NATION_NAMES: &[(&str, &str)] = &[
    ("일본", "일식"),
    ("중국", "중식"),
    ("이탈리아", "양식"),
    ("서양", "양식"),
    ("동남아시아", "기타"),
    ("퓨전", "기타"),
];

/// Nation codes folded to match the renamed categories.
const NATION_CODES: &[(u32, u32)] = &[(3020009, 3020005), (3020006, 3020002)];

pub fn remap_nation_name(name: &str) -> &str {
    NATION_NAMES
        .iter()
        .find(|(from, _)| *from == name)
        .map(|(_, to)| *to)
        .unwrap_or(name)
}

pub fn remap_nation_code(code: u32) -> u32 {
    NATION_CODES
        .iter()
        .find(|(from, _)| *from == code)
        .map(|(_, to)| *to)
        .unwrap_or(code)
}

/// Digits and dots only, truncated to an integer; 0 when nothing parses.
pub fn parse_amount(raw: &str) -> u32 {
    let digits = NOT_NUMERIC.replace_all(raw, "");
    match digits.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => v.trunc().min(u32::MAX as f64) as u32,
        _ => 0,
    }
}

fn text(row: &RawRow, key: &str) -> String {
    match row.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn integer(row: &RawRow, key: &str) -> Option<u64> {
    match row.get(key) {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

fn recipe_id(row: &RawRow, table: &'static str) -> Result<RecipeId, IngestError> {
    integer(row, "RECIPE_ID").ok_or_else(|| IngestError::MissingField {
        table,
        field: "RECIPE_ID",
    })
}

#[derive(Debug, Default)]
pub struct CleanBase {
    pub recipes: Vec<Recipe>,
    pub nations: Vec<NationInfo>,
    pub types: Vec<TypeInfo>,
}

/// Recipes plus the nation and type tables they reference. The first
/// name seen for a code wins.
pub fn clean_base(rows: &[RawRow]) -> Result<CleanBase, IngestError> {
    let mut nations: BTreeMap<NationCode, String> = BTreeMap::new();
    let mut types: BTreeMap<TypeCode, String> = BTreeMap::new();
    let mut recipes = Vec::with_capacity(rows.len());

    for row in rows {
        let id = recipe_id(row, "RECIPE_BASE")?;

        let nation = integer(row, "NATION_CODE").map(|c| NationCode(remap_nation_code(c as u32)));
        if let Some(code) = nation {
            let name = text(row, "NATION_NM");
            nations
                .entry(code)
                .or_insert_with(|| remap_nation_name(&name).to_string());
        }

        let kind = integer(row, "TY_CODE").map(|c| TypeCode(c as u32));
        if let Some(code) = kind {
            types.entry(code).or_insert_with(|| text(row, "TY_NM"));
        }

        recipes.push(Recipe {
            id,
            name: text(row, "RECIPE_NM_KO"),
            summary: text(row, "SUMRY"),
            nation,
            kind,
            cooking_minutes: parse_amount(&text(row, "COOKING_TIME")),
            calorie: parse_amount(&text(row, "CALORIE")),
            servings: parse_amount(&text(row, "QNT")),
        });
    }

    Ok(CleanBase {
        recipes,
        nations: nations
            .into_iter()
            .map(|(code, name)| NationInfo { code, name })
            .collect(),
        types: types
            .into_iter()
            .map(|(code, name)| TypeInfo { code, name })
            .collect(),
    })
}

/// Ingredient lines with sequence numbers reassigned 1..n per recipe, in
/// input order.
pub fn clean_ingredients(rows: &[RawRow]) -> Result<Vec<IngredientLine>, IngestError> {
    let mut next_seq: HashMap<RecipeId, u32> = HashMap::new();
    rows.iter()
        .map(|row| {
            let recipe_id = recipe_id(row, "RECIPE_INGREDIENT")?;
            let seq = next_seq.entry(recipe_id).or_insert(0);
            *seq += 1;
            Ok(IngredientLine {
                recipe_id,
                seq: *seq,
                name: text(row, "IRDNT_NM"),
                quantity: text(row, "IRDNT_CPCTY"),
            })
        })
        .collect()
}

pub fn clean_process(rows: &[RawRow]) -> Result<Vec<ProcessStep>, IngestError> {
    rows.iter()
        .map(|row| {
            Ok(ProcessStep {
                recipe_id: recipe_id(row, "RECIPE_PROCESS")?,
                step: integer(row, "COOKING_NO").ok_or(IngestError::MissingField {
                    table: "RECIPE_PROCESS",
                    field: "COOKING_NO",
                })? as u32,
                description: text(row, "COOKING_DC"),
            })
        })
        .collect()
}

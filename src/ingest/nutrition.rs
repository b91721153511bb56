//! Food nutrition table loaded from the public food composition CSV.
//!
//! The file has Korean headers, optionally a UTF-8 BOM, and a units row
//! right below the header which is skipped.

use std::collections::HashMap;
use std::path::Path;

use super::IngestError;
use crate::recipes::NutritionInfo;

const FOOD_GROUP: &str = "식품군";
const FOOD_NAME: &str = "식품명";
const ENERGY: &str = "에너지";
const CARBOHYDRATE: &str = "탄수화물";
const PROTEIN: &str = "단백질";
const FAT: &str = "지방";
const SUGAR: &str = "당류";

pub fn load_nutrition_csv(path: &Path) -> Result<Vec<NutritionInfo>, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)?;

    let columns: HashMap<String, usize> = reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.trim_start_matches('\u{feff}').trim().to_string(), idx))
        .collect();

    let column = |name: &'static str| -> Result<usize, IngestError> {
        columns
            .get(name)
            .copied()
            .ok_or(IngestError::MissingField {
                table: "NUTRITION_INFO",
                field: name,
            })
    };
    let food_group = column(FOOD_GROUP)?;
    let food_name = column(FOOD_NAME)?;
    let energy = column(ENERGY)?;
    let carbohydrate = column(CARBOHYDRATE)?;
    let protein = column(PROTEIN)?;
    let fat = column(FAT)?;
    let sugar = column(SUGAR)?;

    let mut rows = vec![];
    // first record holds the units
    for record in reader.records().skip(1) {
        let record = record?;
        let field = |idx: usize| record.get(idx).unwrap_or("").trim();
        let number = |idx: usize| field(idx).parse::<f32>().ok().filter(|v| v.is_finite()).unwrap_or(0.0);

        let name = field(food_name);
        if name.is_empty() {
            continue;
        }
        rows.push(NutritionInfo {
            food_group: field(food_group).to_string(),
            food_name: name.to_string(),
            energy: number(energy),
            protein: number(protein),
            fat: number(fat),
            carbohydrate: number(carbohydrate),
            sugar: number(sugar),
        });
    }

    log::info!("read {} nutrition rows from {}", rows.len(), path.display());
    Ok(rows)
}

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use scraper::{Html, Selector};
use tracing::debug;

use super::element_text;
use crate::model::{NutritionFact, NutritionField};

static CALORIES_BLOCK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.nutrition-feature-calories").unwrap());
static CALORIES_QTY: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span.nutrition-feature-calories-quantity").unwrap());
static SERVING_LABEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span.calories-label-title").unwrap());
static TABLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div.nutrition-table").unwrap());
static TABLE_ROW: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.nutrition-table-row").unwrap());
static ROW_LABEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span.table-row-label").unwrap());
static ROW_VALUE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span.table-row-labelValue").unwrap());
static INGREDIENTS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.nutrition-ingredient-list").unwrap());

/// True once any of the nutrition blocks has rendered.
pub fn has_nutrition_blocks(html: &str) -> bool {
    let doc = Html::parse_document(html);
    [&*CALORIES_BLOCK, &*TABLE, &*INGREDIENTS]
        .into_iter()
        .any(|sel| doc.select(sel).next().is_some())
}

pub fn extract(html: &str, item_name: &str) -> NutritionFact {
    extract_at(html, item_name, Utc::now())
}

/// Every block is optional; fields the page does not carry stay unset.
pub fn extract_at(html: &str, item_name: &str, now: DateTime<Utc>) -> NutritionFact {
    let doc = Html::parse_document(html);
    let mut fact = NutritionFact::new(item_name, now);

    if let Some(block) = doc.select(&CALORIES_BLOCK).next() {
        if let Some(qty) = block.select(&CALORIES_QTY).next().map(element_text) {
            fact.set(NutritionField::Calories, qty);
        }
        if let Some(label) = block.select(&SERVING_LABEL).next().map(element_text) {
            fact.set(NutritionField::ServingSize, serving_size(&label));
        }
    }

    if let Some(table) = doc.select(&TABLE).next() {
        for row in table.select(&TABLE_ROW) {
            let label = row.select(&ROW_LABEL).next().map(element_text);
            let value = row.select(&ROW_VALUE).next().map(element_text);
            let (Some(label), Some(value)) = (label, value) else {
                continue;
            };
            match NutritionField::from_label(&label) {
                Some(field) => fact.set(field, value),
                None => debug!("Ignoring nutrition row '{}' for {}", label, item_name),
            }
        }
    }

    if let Some(list) = doc.select(&INGREDIENTS).next() {
        let text = element_text(list);
        if !text.is_empty() {
            fact.ingredients = Some(text);
        }
    }

    fact
}

fn serving_size(label: &str) -> String {
    label.replace("amount per ", "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UNKNOWN;

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    #[test]
    fn full_detail_page() {
        let fact = extract(&fixture("nutrition_grilled_chicken"), "Grilled Chicken");
        assert_eq!(fact.item_name, "Grilled Chicken");
        assert_eq!(fact.get(NutritionField::Calories), "220");
        assert_eq!(fact.get(NutritionField::ServingSize), "1 breast");
        assert_eq!(fact.get(NutritionField::TotalFat), "8g");
        assert_eq!(fact.get(NutritionField::SaturatedFat), "2.5g");
        assert_eq!(fact.get(NutritionField::TotalCarbohydrate), "1g");
        assert_eq!(fact.get(NutritionField::Protein), "35g");
        assert_eq!(fact.get(NutritionField::Sodium), "480mg");
        assert_eq!(
            fact.ingredients(),
            "Chicken Breast, Water, Salt, Spices"
        );
    }

    #[test]
    fn unmatched_and_absent_rows() {
        let fact = extract(&fixture("nutrition_grilled_chicken"), "Grilled Chicken");
        // "Vitamin D" has no field, "Iron" is not on the page
        assert_eq!(fact.get(NutritionField::Iron), UNKNOWN);
        assert_eq!(fact.raw(NutritionField::AddedSugar), None);
    }

    #[test]
    fn page_without_table_defaults_every_table_field() {
        let fact = extract(&fixture("nutrition_no_table"), "Tomato Soup");
        assert_eq!(fact.item_name, "Tomato Soup");
        assert_eq!(fact.get(NutritionField::Calories), "150");
        for field in NutritionField::ALL {
            if matches!(field, NutritionField::Calories | NutritionField::ServingSize) {
                continue;
            }
            assert_eq!(fact.get(field), UNKNOWN, "{}", field.as_str());
        }
        assert_eq!(fact.ingredients(), UNKNOWN);
    }

    #[test]
    fn blank_page_is_all_unknown() {
        let now = Utc::now();
        let fact = extract_at("<html><body></body></html>", "Water", now);
        assert!(NutritionField::ALL.iter().all(|f| fact.get(*f) == UNKNOWN));
        assert_eq!(fact.last_updated, now);
        assert!(!has_nutrition_blocks("<html><body></body></html>"));
    }

    #[test]
    fn serving_label_prefix_removed() {
        assert_eq!(serving_size("amount per 1 cup "), "1 cup");
        assert_eq!(serving_size("Serving"), "Serving");
    }
}

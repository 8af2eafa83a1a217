use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder stored for any nutrition field the detail page does not carry.
pub const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Facility {
    Hillenbrand,
    Earhart,
    Ford,
    Wiley,
    Windsor,
}

impl Facility {
    pub const ALL: [Facility; 5] = [
        Facility::Hillenbrand,
        Facility::Earhart,
        Facility::Ford,
        Facility::Wiley,
        Facility::Windsor,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Facility::Hillenbrand => "Hillenbrand",
            Facility::Earhart => "Earhart",
            Facility::Ford => "Ford",
            Facility::Wiley => "Wiley",
            Facility::Windsor => "Windsor",
        }
    }

    pub fn from_name(name: &str) -> Option<Facility> {
        Facility::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for Facility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MealPeriod {
    Breakfast,
    Lunch,
    Dinner,
    Brunch,
    LateLunch,
}

impl MealPeriod {
    pub const ALL: [MealPeriod; 5] = [
        MealPeriod::Breakfast,
        MealPeriod::Lunch,
        MealPeriod::Dinner,
        MealPeriod::Brunch,
        MealPeriod::LateLunch,
    ];

    pub fn label(self) -> &'static str {
        match self {
            MealPeriod::Breakfast => "Breakfast",
            MealPeriod::Lunch => "Lunch",
            MealPeriod::Dinner => "Dinner",
            MealPeriod::Brunch => "Brunch",
            MealPeriod::LateLunch => "Late Lunch",
        }
    }

    /// Percent-encoded form used in menu URLs.
    pub fn path_segment(self) -> &'static str {
        match self {
            MealPeriod::LateLunch => "Late%20Lunch",
            other => other.label(),
        }
    }
}

impl fmt::Display for MealPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Identity of a stored menu item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MenuKey {
    pub facility: Facility,
    pub item_name: String,
    pub date: NaiveDate,
}

/// One dish offered at one facility on one date. Immutable once stored.
#[derive(Debug, Clone, PartialEq)]
pub struct MenuItem {
    pub facility: Facility,
    pub station: String,
    pub item_name: String,
    pub nutrition_link: Option<String>,
    pub dietary_tags: Vec<String>,
    pub date: NaiveDate,
    pub observed_at: DateTime<Utc>,
}

impl MenuItem {
    pub fn key(&self) -> MenuKey {
        MenuKey {
            facility: self.facility,
            item_name: self.item_name.clone(),
            date: self.date,
        }
    }
}

/// Fixed set of nutrition values read from a detail page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NutritionField {
    Calories,
    ServingSize,
    TotalFat,
    SaturatedFat,
    Cholesterol,
    Sodium,
    TotalCarbohydrate,
    Sugar,
    AddedSugar,
    DietaryFiber,
    Protein,
    Calcium,
    Iron,
}

impl NutritionField {
    pub const ALL: [NutritionField; 13] = [
        NutritionField::Calories,
        NutritionField::ServingSize,
        NutritionField::TotalFat,
        NutritionField::SaturatedFat,
        NutritionField::Cholesterol,
        NutritionField::Sodium,
        NutritionField::TotalCarbohydrate,
        NutritionField::Sugar,
        NutritionField::AddedSugar,
        NutritionField::DietaryFiber,
        NutritionField::Protein,
        NutritionField::Calcium,
        NutritionField::Iron,
    ];

    /// Column name, also the normalized form of the page label.
    pub fn as_str(self) -> &'static str {
        match self {
            NutritionField::Calories => "calories",
            NutritionField::ServingSize => "serving_size",
            NutritionField::TotalFat => "total_fat",
            NutritionField::SaturatedFat => "saturated_fat",
            NutritionField::Cholesterol => "cholesterol",
            NutritionField::Sodium => "sodium",
            NutritionField::TotalCarbohydrate => "total_carbohydrate",
            NutritionField::Sugar => "sugar",
            NutritionField::AddedSugar => "added_sugar",
            NutritionField::DietaryFiber => "dietary_fiber",
            NutritionField::Protein => "protein",
            NutritionField::Calcium => "calcium",
            NutritionField::Iron => "iron",
        }
    }

    /// Map a table row label ("Total Fat") to a field. Unknown labels map to `None`.
    pub fn from_label(label: &str) -> Option<NutritionField> {
        let key = normalize_label(label);
        NutritionField::ALL.into_iter().find(|f| f.as_str() == key)
    }
}

/// Lowercase, trim, spaces to underscores.
pub fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase().replace(' ', "_")
}

/// Nutrition details for one item name. Latest extraction wins.
#[derive(Debug, Clone, PartialEq)]
pub struct NutritionFact {
    pub item_name: String,
    values: [Option<String>; 13],
    pub ingredients: Option<String>,
    pub last_updated: DateTime<Utc>,
}

impl NutritionFact {
    pub fn new(item_name: &str, last_updated: DateTime<Utc>) -> Self {
        NutritionFact {
            item_name: item_name.to_string(),
            values: Default::default(),
            ingredients: None,
            last_updated,
        }
    }

    pub fn set(&mut self, field: NutritionField, value: impl Into<String>) {
        self.values[field as usize] = Some(value.into());
    }

    /// Value as extracted, `None` when the page did not carry it.
    pub fn raw(&self, field: NutritionField) -> Option<&str> {
        self.values[field as usize].as_deref()
    }

    /// Value as stored: the extracted text or [`UNKNOWN`].
    pub fn get(&self, field: NutritionField) -> &str {
        self.raw(field).unwrap_or(UNKNOWN)
    }

    pub fn ingredients(&self) -> &str {
        self.ingredients.as_deref().unwrap_or(UNKNOWN)
    }
}

/// Leading numeric value of a free-form nutrition string ("12.5g" -> 12.5).
/// Anything without digits, including [`UNKNOWN`], reads as 0.
pub fn parse_nutrition_value(value: &str) -> f64 {
    let digits: String = value
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    digits.parse().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_normalization() {
        assert_eq!(NutritionField::from_label("Total Fat"), Some(NutritionField::TotalFat));
        assert_eq!(
            NutritionField::from_label("  Total Carbohydrate "),
            Some(NutritionField::TotalCarbohydrate)
        );
        assert_eq!(NutritionField::from_label("Added Sugar"), Some(NutritionField::AddedSugar));
        assert_eq!(NutritionField::from_label("Vitamin D"), None);
    }

    #[test]
    fn missing_fields_read_unknown() {
        let mut fact = NutritionFact::new("Grilled Chicken", Utc::now());
        fact.set(NutritionField::Protein, "31g");
        assert_eq!(fact.get(NutritionField::Protein), "31g");
        assert_eq!(fact.get(NutritionField::Iron), UNKNOWN);
        assert_eq!(fact.raw(NutritionField::Iron), None);
        assert_eq!(fact.ingredients(), UNKNOWN);
    }

    #[test]
    fn late_lunch_is_encoded() {
        assert_eq!(MealPeriod::LateLunch.path_segment(), "Late%20Lunch");
        assert_eq!(MealPeriod::Brunch.path_segment(), "Brunch");
    }

    #[test]
    fn facility_lookup_ignores_case() {
        assert_eq!(Facility::from_name("earhart"), Some(Facility::Earhart));
        assert_eq!(Facility::from_name("Cary"), None);
    }

    #[test]
    fn numeric_values() {
        assert_eq!(parse_nutrition_value("12.5g"), 12.5);
        assert_eq!(parse_nutrition_value("350"), 350.0);
        assert_eq!(parse_nutrition_value(UNKNOWN), 0.0);
    }
}

use serde::{Deserialize, Serialize};

/// A registry row. Macros are optional; most manifests only carry calories.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NutritionEntry {
    pub calories: f64,
    #[serde(default, alias = "protein")]
    pub protein_g: Option<f64>,
    #[serde(default, alias = "carbs")]
    pub carbs_g: Option<f64>,
    #[serde(default, alias = "fat")]
    pub fat_g: Option<f64>,
}

impl NutritionEntry {
    pub fn calories_only(calories: f64) -> Self {
        Self {
            calories,
            protein_g: None,
            carbs_g: None,
            fat_g: None,
        }
    }
}

/// Where a nutrition figure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Registry entry with a full macro breakdown, used verbatim.
    Exact,
    /// Registry calories with macros derived from fixed dietary ratios.
    Derived,
    /// No registry entry; calories are a placeholder.
    Placeholder,
}

impl Provenance {
    pub fn is_estimated(self) -> bool {
        self != Provenance::Exact
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NutritionInfo {
    pub calories: f64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
    pub provenance: Provenance,
}

/// Half-open range `[min, max)` for placeholder calorie values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalorieRange {
    pub min: u32,
    pub max: u32,
}

impl Default for CalorieRange {
    fn default() -> Self {
        Self { min: 200, max: 600 }
    }
}

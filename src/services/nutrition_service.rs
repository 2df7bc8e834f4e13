use crate::models::classify_types::RankedPrediction;
use crate::models::manifest_types::Manifest;
use crate::models::nutrition_types::{CalorieRange, NutritionEntry, NutritionInfo, Provenance};
use rand::Rng;
use std::collections::HashMap;

// Share of energy from each macro, and kcal per gram.
const PROTEIN_RATIO: f64 = 0.15;
const CARBS_RATIO: f64 = 0.50;
const FAT_RATIO: f64 = 0.35;
const KCAL_PER_G_PROTEIN: f64 = 4.0;
const KCAL_PER_G_CARBS: f64 = 4.0;
const KCAL_PER_G_FAT: f64 = 9.0;

/// Label -> nutrition lookup built once from the manifest.
#[derive(Debug, Clone, Default)]
pub struct NutritionRegistry {
    calories: HashMap<String, f64>,
    nutrition: HashMap<String, NutritionEntry>,
}

impl NutritionRegistry {
    pub fn new(calories: HashMap<String, f64>, nutrition: HashMap<String, NutritionEntry>) -> Self {
        Self { calories, nutrition }
    }

    pub fn from_manifest(manifest: &Manifest) -> Self {
        Self::new(manifest.calories.clone(), manifest.nutrition.clone())
    }

    /// The detailed `nutrition` table wins over the plain `calories` table.
    pub fn lookup(&self, label: &str) -> Option<NutritionEntry> {
        self.nutrition
            .get(label)
            .copied()
            .or_else(|| self.calories.get(label).map(|&kcal| NutritionEntry::calories_only(kcal)))
    }

    pub fn len(&self) -> usize {
        self.calories
            .keys()
            .chain(self.nutrition.keys())
            .collect::<std::collections::HashSet<_>>()
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.calories.is_empty() && self.nutrition.is_empty()
    }
}

/// Protein, carbs and fat grams for a calorie figure, unrounded.
pub fn derive_macros(calories: f64) -> (f64, f64, f64) {
    (
        calories * PROTEIN_RATIO / KCAL_PER_G_PROTEIN,
        calories * CARBS_RATIO / KCAL_PER_G_CARBS,
        calories * FAT_RATIO / KCAL_PER_G_FAT,
    )
}

pub fn placeholder_calories<R: Rng>(range: CalorieRange, rng: &mut R) -> f64 {
    if range.max <= range.min {
        return range.min as f64;
    }
    rng.random_range(range.min..range.max) as f64
}

fn estimated(calories: f64, provenance: Provenance) -> NutritionInfo {
    let (protein_g, carbs_g, fat_g) = derive_macros(calories);
    NutritionInfo {
        calories,
        protein_g,
        carbs_g,
        fat_g,
        provenance,
    }
}

pub fn compose_result<R: Rng>(
    ranked: &RankedPrediction,
    registry: &NutritionRegistry,
    range: CalorieRange,
    rng: &mut R,
) -> NutritionInfo {
    match registry.lookup(&ranked.label) {
        Some(NutritionEntry {
            calories,
            protein_g: Some(protein_g),
            carbs_g: Some(carbs_g),
            fat_g: Some(fat_g),
        }) => NutritionInfo {
            calories,
            protein_g,
            carbs_g,
            fat_g,
            provenance: Provenance::Exact,
        },
        Some(entry) => estimated(entry.calories, Provenance::Derived),
        None => {
            log::debug!("No nutrition entry for '{}', using a placeholder", ranked.label);
            estimated(placeholder_calories(range, rng), Provenance::Placeholder)
        }
    }
}

/// `"french_fries"` -> `"French Fries"`.
pub fn format_label(label: &str) -> String {
    label
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Generic classifiers emit synonym lists (`"pizza, pizza pie"`); keep the first term.
pub fn clean_label(label: &str) -> String {
    label.split(',').next().unwrap_or(label).trim().to_string()
}

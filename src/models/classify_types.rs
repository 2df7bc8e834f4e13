use crate::models::nutrition_types::{NutritionInfo, Provenance};
use serde::{Deserialize, Serialize};

/// Which loading strategy produced the active model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    /// Fine-tuned dish classifier with the manifest's label order.
    Custom,
    /// Generic ImageNet classifier with its own vocabulary.
    Fallback,
}

impl ModelTier {
    pub fn is_custom(self) -> bool {
        self == ModelTier::Custom
    }

    pub fn label(self) -> &'static str {
        match self {
            ModelTier::Custom => "custom dish model",
            ModelTier::Fallback => "generic fallback model",
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct RankedPrediction {
    pub index: usize,
    pub label: String,
    pub probability: f32,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Ranking {
    pub top: RankedPrediction,
    pub top_k: Vec<RankedPrediction>,
}

#[derive(Debug, Serialize, Clone)]
pub struct InferenceResult {
    pub top: RankedPrediction,
    pub top_k: Vec<RankedPrediction>,
    pub nutrition: NutritionInfo,
}

#[derive(Debug, Serialize, Clone)]
pub struct ModelStatus {
    pub tier: ModelTier,
    pub classes: usize,
    pub nutrition_entries: usize,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct DisplayGuess {
    pub display_name: String,
    pub confidence_pct: f32,
}

/// Plain values for the result card.
#[derive(Debug, Serialize, Clone)]
pub struct DisplayResult {
    pub label: String,
    pub display_name: String,
    pub confidence_pct: f32,
    pub calories: u32,
    pub protein_g: u32,
    pub carbs_g: u32,
    pub fat_g: u32,
    pub provenance: Provenance,
    pub tier: ModelTier,
    pub top_k: Vec<DisplayGuess>,
}

use crate::error::AppError;
use crate::models::nutrition_types::NutritionEntry;
use serde::Deserialize;
use std::collections::HashMap;

/// Contents of `classes.json` shipped next to the custom model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    pub classes: Vec<String>,
    pub calories: HashMap<String, f64>,
    pub nutrition: HashMap<String, NutritionEntry>,
}

// Older manifests are a bare array of class names.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawManifest {
    Labels(Vec<String>),
    Full {
        classes: Vec<String>,
        #[serde(default)]
        calories: HashMap<String, f64>,
        #[serde(default)]
        nutrition: HashMap<String, NutritionEntry>,
    },
}

impl Manifest {
    pub fn from_json(text: &str) -> Result<Self, AppError> {
        let raw: RawManifest = serde_json::from_str(text)
            .map_err(|e| AppError::Manifest(format!("Failed to parse manifest JSON: {}", e)))?;

        let manifest = match raw {
            RawManifest::Labels(classes) => Manifest {
                classes,
                ..Default::default()
            },
            RawManifest::Full {
                classes,
                calories,
                nutrition,
            } => Manifest {
                classes,
                calories,
                nutrition,
            },
        };

        if manifest.classes.is_empty() {
            return Err(AppError::Manifest("Class list is empty".to_string()));
        }

        Ok(manifest)
    }
}

use crate::config::AppConfig;
use crate::error::AppError;
use crate::models::classify_types::{
    DisplayGuess, DisplayResult, InferenceResult, ModelStatus, ModelTier, RankedPrediction, Ranking,
};
use crate::models::nutrition_types::{CalorieRange, NutritionInfo};
use crate::services::classifier::inference::{self, ModelProvider};
use crate::services::classifier::model_manager::LoadedModel;
use crate::services::classifier::preprocess::{self, InputSpec, RawImageSource};
use crate::services::nutrition_service::{self, NutritionRegistry};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// The loaded model and its lookup tables, built once at startup and shared
/// by every classification.
#[derive(Clone)]
pub struct ClassifierContext {
    model: Arc<Mutex<Box<dyn ModelProvider>>>,
    class_index: Arc<[String]>,
    registry: Arc<NutritionRegistry>,
    tier: ModelTier,
    input: InputSpec,
    top_k: usize,
    placeholder_calories: CalorieRange,
    generation: Arc<AtomicU64>,
}

impl ClassifierContext {
    pub fn new(loaded: LoadedModel, top_k: usize, placeholder_calories: CalorieRange) -> Self {
        Self {
            model: Arc::new(Mutex::new(loaded.provider)),
            class_index: loaded.class_index,
            registry: Arc::new(loaded.registry),
            tier: loaded.tier,
            input: loaded.input,
            top_k,
            placeholder_calories,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn from_config(loaded: LoadedModel, config: &AppConfig) -> Self {
        Self::new(loaded, config.top_k, config.placeholder_calories)
    }

    pub fn tier(&self) -> ModelTier {
        self.tier
    }

    pub fn is_custom(&self) -> bool {
        self.tier.is_custom()
    }

    pub fn status(&self) -> ModelStatus {
        ModelStatus {
            tier: self.tier,
            classes: self.class_index.len(),
            nutrition_entries: self.registry.len(),
        }
    }

    /// Invalidate any classification still in flight.
    pub fn reset(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Classify a photo for display.
    ///
    /// Each call supersedes the previous one. Returns `Ok(None)` when the
    /// result went stale (a newer request or a `reset`) before it finished.
    pub async fn classify(&self, source: RawImageSource) -> Result<Option<DisplayResult>, AppError> {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let description = source.describe();

        let result = self.infer(source).await;

        // A superseded request is dropped whether it succeeded or failed.
        if self.generation.load(Ordering::SeqCst) != ticket {
            log::debug!("Dropping stale result for {}", description);
            return Ok(None);
        }
        Ok(Some(display_result(&result?, self.tier)))
    }

    /// Preprocess, run the model and join the nutrition registry.
    pub async fn infer(&self, source: RawImageSource) -> Result<InferenceResult, AppError> {
        let model = Arc::clone(&self.model);
        let class_index = Arc::clone(&self.class_index);
        let input = self.input;
        let k = self.top_k;

        let ranking = tokio::task::spawn_blocking(move || -> Result<Ranking, AppError> {
            let tensor = preprocess::preprocess(source, input)?;
            let mut guard = model
                .lock()
                .map_err(|_| AppError::Inference("Model lock poisoned".to_string()))?;
            inference::infer(tensor, &class_index, &mut **guard, k)
        })
        .await??;

        Ok(self.compose(ranking))
    }

    fn compose(&self, ranking: Ranking) -> InferenceResult {
        let ranking = match self.tier {
            ModelTier::Custom => ranking,
            ModelTier::Fallback => Ranking {
                top: cleaned(ranking.top),
                top_k: ranking.top_k.into_iter().map(cleaned).collect(),
            },
        };
        let nutrition: NutritionInfo = nutrition_service::compose_result(
            &ranking.top,
            &self.registry,
            self.placeholder_calories,
            &mut rand::rng(),
        );

        InferenceResult {
            top: ranking.top,
            top_k: ranking.top_k,
            nutrition,
        }
    }
}

fn cleaned(prediction: RankedPrediction) -> RankedPrediction {
    RankedPrediction {
        label: nutrition_service::clean_label(&prediction.label),
        ..prediction
    }
}

/// Percentage with one decimal.
pub fn confidence_pct(probability: f32) -> f32 {
    ((probability as f64 * 1000.0).round() / 10.0) as f32
}

fn grams(value: f64) -> u32 {
    value.max(0.0).round() as u32
}

pub fn display_result(result: &InferenceResult, tier: ModelTier) -> DisplayResult {
    DisplayResult {
        label: result.top.label.clone(),
        display_name: nutrition_service::format_label(&result.top.label),
        confidence_pct: confidence_pct(result.top.probability),
        calories: grams(result.nutrition.calories),
        protein_g: grams(result.nutrition.protein_g),
        carbs_g: grams(result.nutrition.carbs_g),
        fat_g: grams(result.nutrition.fat_g),
        provenance: result.nutrition.provenance,
        tier,
        top_k: result
            .top_k
            .iter()
            .map(|p| DisplayGuess {
                display_name: nutrition_service::format_label(&p.label),
                confidence_pct: confidence_pct(p.probability),
            })
            .collect(),
    }
}

use crate::error::AppError;
use crate::models::nutrition_types::CalorieRange;
use crate::services::classifier::ranking::DEFAULT_TOP_K;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const FALLBACK_MODEL_URL: &str = "https://huggingface.co/Xenova/resnet-50/resolve/main/onnx/model.onnx";
const FALLBACK_CONFIG_URL: &str = "https://huggingface.co/Xenova/resnet-50/resolve/main/config.json";

/// Where the custom model and its manifest live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    Local(PathBuf),
    /// Base URL; each request is cache-busted with a version query.
    Remote(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub model_url: String,
    pub config_url: String,
    pub model_file: String,
    pub config_file: String,
    pub crop_size: u32,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            model_url: FALLBACK_MODEL_URL.to_string(),
            config_url: FALLBACK_CONFIG_URL.to_string(),
            model_file: "resnet-50.onnx".to_string(),
            config_file: "resnet-50-config.json".to_string(),
            crop_size: 224,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory or http(s) base URL holding the custom model.
    pub model_source: String,
    pub manifest_file: String,
    pub model_file: String,
    pub input_size: u32,
    pub cache_dir: PathBuf,
    pub fallback: FallbackConfig,
    pub top_k: usize,
    pub placeholder_calories: CalorieRange,
    pub use_gpu: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model_source: "model".to_string(),
            manifest_file: "classes.json".to_string(),
            model_file: "model.onnx".to_string(),
            input_size: 224,
            cache_dir: PathBuf::from(".nutri-scan"),
            fallback: FallbackConfig::default(),
            top_k: DEFAULT_TOP_K,
            placeholder_calories: CalorieRange::default(),
            use_gpu: false,
        }
    }
}

impl AppConfig {
    /// Defaults, overlaid with the JSON file at `path` when one is given.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    AppError::Config(format!("Failed to read config file {}: {}", path.display(), e))
                })?;
                serde_json::from_str(&content)
                    .map_err(|e| AppError::Config(format!("Failed to parse config JSON: {}", e)))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.top_k == 0 {
            return Err(AppError::Config("top_k must be at least 1".to_string()));
        }
        if self.input_size == 0 || self.fallback.crop_size == 0 {
            return Err(AppError::Config("Model input sizes must be non-zero".to_string()));
        }
        if self.placeholder_calories.min >= self.placeholder_calories.max {
            return Err(AppError::Config(format!(
                "Placeholder calorie range {}..{} is empty",
                self.placeholder_calories.min, self.placeholder_calories.max
            )));
        }
        Ok(())
    }

    pub fn model_source(&self) -> ModelSource {
        if self.model_source.starts_with("http://") || self.model_source.starts_with("https://") {
            ModelSource::Remote(self.model_source.trim_end_matches('/').to_string())
        } else {
            ModelSource::Local(PathBuf::from(&self.model_source))
        }
    }

    pub fn custom_cache_dir(&self) -> PathBuf {
        self.cache_dir.join("custom")
    }

    pub fn fallback_dir(&self) -> PathBuf {
        self.cache_dir.join("fallback")
    }
}

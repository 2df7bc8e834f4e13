use crate::config::{AppConfig, ModelSource};
use crate::error::AppError;
use crate::models::classify_types::ModelTier;
use crate::models::manifest_types::Manifest;
use crate::services::classifier::inference::{ModelProvider, OrtModel, OutputKind};
use crate::services::classifier::preprocess::InputSpec;
use crate::services::classifier::ranking;
use crate::services::nutrition_service::NutritionRegistry;
use futures::StreamExt;
use ort::session::Session;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// A loaded network plus the tensor layout it expects.
pub struct TierModel {
    pub provider: Box<dyn ModelProvider>,
    pub input: InputSpec,
}

/// Everything the classifier needs, fixed at startup.
pub struct LoadedModel {
    pub provider: Box<dyn ModelProvider>,
    pub tier: ModelTier,
    pub class_index: Arc<[String]>,
    pub registry: NutritionRegistry,
    pub input: InputSpec,
}

/// Sources for the two model tiers.
#[allow(async_fn_in_trait)]
pub trait TierLoader {
    async fn load_manifest(&self) -> Result<Manifest, AppError>;

    async fn load_custom(&self) -> Result<TierModel, AppError>;

    /// The generic model and its own label vocabulary.
    async fn load_fallback(&self) -> Result<(TierModel, Vec<String>), AppError>;
}

/// Load the custom tier, or fall back to the generic one.
///
/// Only a fallback failure is fatal. The manifest's nutrition table is kept
/// for the fallback tier when the manifest itself loaded.
pub async fn load_model<L: TierLoader>(loader: &L) -> Result<LoadedModel, AppError> {
    let manifest = match loader.load_manifest().await {
        Ok(manifest) => {
            log::info!("Manifest loaded: {} classes", manifest.classes.len());
            Some(manifest)
        }
        Err(e) => {
            log::warn!("Could not load manifest: {}", e);
            None
        }
    };

    let registry = manifest
        .as_ref()
        .map(NutritionRegistry::from_manifest)
        .unwrap_or_default();

    if let Some(manifest) = manifest {
        match load_custom_checked(loader, manifest.classes.len()).await {
            Ok(model) => {
                log::info!("Custom dish model loaded");
                return Ok(LoadedModel {
                    provider: model.provider,
                    tier: ModelTier::Custom,
                    class_index: manifest.classes.into(),
                    registry,
                    input: model.input,
                });
            }
            Err(e) => log::warn!("Custom model not usable, falling back: {}", e),
        }
    }

    let (model, labels) = loader
        .load_fallback()
        .await
        .map_err(|e| AppError::ModelUnavailable(e.to_string()))?;
    if labels.is_empty() {
        return Err(AppError::ModelUnavailable(
            "Fallback model has no labels".to_string(),
        ));
    }
    log::info!("Fallback model loaded with {} labels", labels.len());

    Ok(LoadedModel {
        provider: model.provider,
        tier: ModelTier::Fallback,
        class_index: labels.into(),
        registry,
        input: model.input,
    })
}

async fn load_custom_checked<L: TierLoader>(
    loader: &L,
    expected_classes: usize,
) -> Result<TierModel, AppError> {
    let model = loader.load_custom().await?;
    warmup(model, expected_classes).await
}

/// One inference on a blank tensor; the output must match the class count.
pub async fn warmup(model: TierModel, expected_classes: usize) -> Result<TierModel, AppError> {
    let TierModel { mut provider, input } = model;
    let (provider, output) = tokio::task::spawn_blocking(move || {
        let output = provider.predict(input.blank());
        (provider, output)
    })
    .await?;

    let output = output?;
    if output.len() != expected_classes {
        return Err(AppError::ShapeMismatch {
            expected: expected_classes,
            actual: output.len(),
        });
    }
    if output.iter().any(|v| !v.is_finite()) {
        return Err(AppError::Inference(
            "Warmup produced non-finite scores".to_string(),
        ));
    }

    Ok(TierModel { provider, input })
}

/// `base/file?v=version`, so caches never serve a stale artifact.
pub fn versioned_url(base: &str, file: &str, version: u128) -> String {
    format!("{}/{}?v={}", base.trim_end_matches('/'), file, version)
}

fn cache_version() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// Labels from a HuggingFace `config.json` `id2label` table. Position `i`
/// holds the label for output `i`; keys missing from the table get the same
/// `Class {i}` name the ranker synthesizes.
pub fn parse_id2label(config: &serde_json::Value) -> Result<Vec<String>, AppError> {
    let id2label = config["id2label"]
        .as_object()
        .ok_or_else(|| AppError::Model("Config missing id2label field".to_string()))?;

    let entries = id2label
        .iter()
        .map(|(k, v)| {
            let idx = k
                .parse::<usize>()
                .map_err(|_| AppError::Model(format!("Invalid id2label key '{}'", k)))?;
            let label = v.as_str().unwrap_or("unknown").to_string();
            Ok((idx, label))
        })
        .collect::<Result<Vec<(usize, String)>, AppError>>()?;

    let len = entries.iter().map(|(idx, _)| idx + 1).max().unwrap_or(0);
    let mut labels: Vec<Option<String>> = vec![None; len];
    for (idx, label) in entries {
        labels[idx] = Some(label);
    }

    let gaps = labels.iter().filter(|l| l.is_none()).count();
    if gaps > 0 {
        log::warn!("id2label has {} missing indices out of {}", gaps, len);
    }

    Ok(labels
        .into_iter()
        .enumerate()
        .map(|(i, label)| label.unwrap_or_else(|| ranking::label_for(i, &[])))
        .collect())
}

/// Loads both tiers from disk and the network using ONNX Runtime.
#[derive(Clone)]
pub struct ModelManager {
    config: AppConfig,
    client: reqwest::Client,
}

impl ModelManager {
    pub fn new(config: AppConfig) -> Self {
        Self::with_client(config, reqwest::Client::new())
    }

    pub fn with_client(config: AppConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    pub fn fallback_model_path(&self) -> PathBuf {
        self.config.fallback_dir().join(&self.config.fallback.model_file)
    }

    pub fn fallback_config_path(&self) -> PathBuf {
        self.config.fallback_dir().join(&self.config.fallback.config_file)
    }

    pub fn is_fallback_downloaded(&self) -> bool {
        self.fallback_model_path().exists() && self.fallback_config_path().exists()
    }

    async fn fetch_text(&self, url: &str) -> Result<String, AppError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(AppError::Model(format!(
                "Failed to fetch {}: HTTP {}",
                url,
                response.status()
            )));
        }
        Ok(response.text().await?)
    }

    async fn download_fallback(&self) -> Result<(), AppError> {
        tokio::fs::create_dir_all(self.config.fallback_dir()).await?;

        let config_path = self.fallback_config_path();
        if !config_path.exists() {
            download_file(&self.client, &self.config.fallback.config_url, &config_path).await?;
        }

        let model_path = self.fallback_model_path();
        if !model_path.exists() {
            download_file(&self.client, &self.config.fallback.model_url, &model_path).await?;
        }

        Ok(())
    }
}

impl TierLoader for ModelManager {
    async fn load_manifest(&self) -> Result<Manifest, AppError> {
        let text = match self.config.model_source() {
            ModelSource::Local(dir) => {
                let path = dir.join(&self.config.manifest_file);
                tokio::fs::read_to_string(&path).await.map_err(|e| {
                    AppError::Manifest(format!("Failed to read {}: {}", path.display(), e))
                })?
            }
            ModelSource::Remote(base) => {
                let url = versioned_url(&base, &self.config.manifest_file, cache_version());
                self.fetch_text(&url).await?
            }
        };
        Manifest::from_json(&text)
    }

    async fn load_custom(&self) -> Result<TierModel, AppError> {
        let model_path = match self.config.model_source() {
            ModelSource::Local(dir) => dir.join(&self.config.model_file),
            ModelSource::Remote(base) => {
                let dir = self.config.custom_cache_dir();
                tokio::fs::create_dir_all(&dir).await?;
                let dest = dir.join(&self.config.model_file);
                let url = versioned_url(&base, &self.config.model_file, cache_version());
                download_file(&self.client, &url, &dest).await?;
                dest
            }
        };

        let session = build_session(model_path, self.config.use_gpu).await?;
        Ok(TierModel {
            provider: Box::new(OrtModel::new(session, OutputKind::Probabilities)),
            input: InputSpec::MobileNet {
                size: self.config.input_size,
            },
        })
    }

    async fn load_fallback(&self) -> Result<(TierModel, Vec<String>), AppError> {
        if !self.is_fallback_downloaded() {
            log::info!("Downloading fallback model into {}", self.config.fallback_dir().display());
            self.download_fallback().await?;
        }

        let config_path = self.fallback_config_path();
        let config_content = tokio::fs::read_to_string(&config_path).await.map_err(|e| {
            AppError::Model(format!("Failed to read config file {}: {}", config_path.display(), e))
        })?;
        let config: serde_json::Value = serde_json::from_str(&config_content)?;
        let labels = parse_id2label(&config)?;

        let session = build_session(self.fallback_model_path(), self.config.use_gpu).await?;
        let model = TierModel {
            provider: Box::new(OrtModel::new(session, OutputKind::Logits)),
            input: InputSpec::ImageNet {
                crop_size: self.config.fallback.crop_size,
            },
        };
        Ok((model, labels))
    }
}

async fn build_session(model_path: PathBuf, use_gpu: bool) -> Result<Session, AppError> {
    if !model_path.exists() {
        return Err(AppError::Model(format!(
            "Model not found: {}",
            model_path.display()
        )));
    }

    tokio::task::spawn_blocking(move || -> Result<Session, AppError> {
        let _ = ort::init().with_name("nutri-scan").commit();

        let mut builder = Session::builder()
            .map_err(|e| AppError::Model(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)
            .map_err(|e| AppError::Model(format!("Failed to set optimization level: {}", e)))?
            .with_intra_threads(4)
            .map_err(|e| AppError::Model(format!("Failed to set intra threads: {}", e)))?;

        if use_gpu {
            builder = builder
                .with_execution_providers([
                    ort::execution_providers::CoreMLExecutionProvider::default().build(),
                    ort::execution_providers::CUDAExecutionProvider::default().build(),
                    ort::execution_providers::CPUExecutionProvider::default().build(),
                ])
                .map_err(|e| AppError::Model(format!("Failed to register GPU execution providers: {}", e)))?;
        } else {
            builder = builder
                .with_execution_providers([
                    ort::execution_providers::CPUExecutionProvider::default().build(),
                ])
                .map_err(|e| AppError::Model(format!("Failed to register CPU execution provider: {}", e)))?;
        }

        builder
            .commit_from_file(&model_path)
            .map_err(|e| AppError::Model(format!("Failed to load ONNX model {}: {}", model_path.display(), e)))
    })
    .await?
}

/// Stream `url` into `dest`. Writes go to a `.part` file that is renamed on
/// success and removed on failure.
async fn download_file(client: &reqwest::Client, url: &str, dest: &Path) -> Result<(), AppError> {
    let partial = partial_path(dest);
    let result = stream_to_file(client, url, &partial).await;

    match result {
        Ok(()) => {
            tokio::fs::rename(&partial, dest).await?;
            Ok(())
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&partial).await;
            Err(e)
        }
    }
}

/// `model.onnx` -> `model.onnx.part`, so sibling files never share a temp name.
fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

async fn stream_to_file(client: &reqwest::Client, url: &str, dest: &Path) -> Result<(), AppError> {
    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(AppError::Model(format!(
            "Failed to download {}: HTTP {}",
            url,
            response.status()
        )));
    }

    let total_size = response.content_length().unwrap_or(0);
    let mut downloaded: u64 = 0;
    let mut last_logged = 0;

    let mut file = tokio::fs::File::create(dest).await?;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        downloaded += chunk.len() as u64;
        tokio::io::AsyncWriteExt::write_all(&mut file, &chunk).await?;

        if total_size > 0 {
            let progress = (downloaded * 100) / total_size;
            if progress >= last_logged + 10 {
                log::debug!("Downloading {}: {}%", url, progress);
                last_logged = progress;
            }
        }
    }
    tokio::io::AsyncWriteExt::flush(&mut file).await?;
    log::info!("Downloaded {} ({} bytes)", url, downloaded);

    Ok(())
}

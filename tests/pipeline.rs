use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use ndarray::Array4;
use nutri_scan_lib::error::AppError;
use nutri_scan_lib::models::classify_types::{DisplayResult, ModelTier};
use nutri_scan_lib::models::manifest_types::Manifest;
use nutri_scan_lib::models::nutrition_types::{CalorieRange, Provenance};
use nutri_scan_lib::services::classifier::context::ClassifierContext;
use nutri_scan_lib::services::classifier::inference::{ModelProvider, OutputKind};
use nutri_scan_lib::services::classifier::model_manager::{
    load_model, LoadedModel, TierLoader, TierModel,
};
use nutri_scan_lib::services::classifier::preprocess::{InputSpec, RawImageSource};
use nutri_scan_lib::services::nutrition_service::{derive_macros, NutritionRegistry};
use std::io::Cursor;
use std::sync::mpsc;

struct Fixed {
    output: Vec<f32>,
    kind: OutputKind,
}

impl ModelProvider for Fixed {
    fn predict(&mut self, _input: Array4<f32>) -> Result<Vec<f32>, AppError> {
        Ok(self.output.clone())
    }

    fn output_kind(&self) -> OutputKind {
        self.kind
    }
}

fn probabilities(output: Vec<f32>) -> Box<dyn ModelProvider> {
    Box::new(Fixed {
        output,
        kind: OutputKind::Probabilities,
    })
}

fn photo() -> RawImageSource {
    let img = RgbImage::from_pixel(32, 24, Rgb([200, 120, 40]));
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    RawImageSource::Bytes(buf.into_inner())
}

fn pizza_sushi_manifest() -> Manifest {
    Manifest::from_json(r#"{"classes": ["pizza", "sushi"], "calories": {"pizza": 300}}"#).unwrap()
}

fn context(provider: Box<dyn ModelProvider>, tier: ModelTier, classes: &[&str], manifest: &Manifest) -> ClassifierContext {
    ClassifierContext::new(
        LoadedModel {
            provider,
            tier,
            class_index: classes.iter().map(|s| s.to_string()).collect::<Vec<_>>().into(),
            registry: NutritionRegistry::from_manifest(manifest),
            input: InputSpec::MobileNet { size: 16 },
        },
        3,
        CalorieRange::default(),
    )
}

#[tokio::test]
async fn unknown_dish_gets_placeholder_nutrition() {
    let manifest = pizza_sushi_manifest();
    let ctx = context(probabilities(vec![0.2, 0.8]), ModelTier::Custom, &["pizza", "sushi"], &manifest);

    let result = ctx.classify(photo()).await.unwrap().unwrap();

    assert_eq!(result.label, "sushi");
    assert_eq!(result.display_name, "Sushi");
    assert_eq!(result.confidence_pct, 80.0);
    assert_eq!(result.provenance, Provenance::Placeholder);
    assert!(result.calories >= 200 && result.calories < 600);
    let (protein, carbs, fat) = derive_macros(result.calories as f64);
    assert_eq!(result.protein_g, protein.round() as u32);
    assert_eq!(result.carbs_g, carbs.round() as u32);
    assert_eq!(result.fat_g, fat.round() as u32);
    assert_eq!(result.top_k.len(), 2);
    assert_eq!(result.tier, ModelTier::Custom);
}

#[tokio::test]
async fn known_calories_derive_macros() {
    let manifest = pizza_sushi_manifest();
    let ctx = context(probabilities(vec![0.9, 0.1]), ModelTier::Custom, &["pizza", "sushi"], &manifest);

    let result = ctx.infer(photo()).await.unwrap();

    assert_eq!(result.top.label, "pizza");
    assert_eq!(result.nutrition.provenance, Provenance::Derived);
    assert_eq!(result.nutrition.calories, 300.0);
    assert_eq!(result.nutrition.carbs_g, 37.5);
}

#[tokio::test]
async fn stale_manifest_synthesizes_labels() {
    let manifest = Manifest::from_json(r#"["pizza", "sushi", "ramen"]"#).unwrap();
    let ctx = context(
        probabilities(vec![0.05, 0.05, 0.1, 0.2, 0.6]),
        ModelTier::Custom,
        &["pizza", "sushi", "ramen"],
        &manifest,
    );

    let result = ctx.infer(photo()).await.unwrap();

    assert_eq!(result.top.index, 4);
    assert_eq!(result.top.label, "Class 4");
    let labels: Vec<_> = result.top_k.iter().map(|p| p.label.as_str()).collect();
    assert_eq!(labels, vec!["Class 4", "Class 3", "ramen"]);
}

#[tokio::test]
async fn bad_photo_is_reported_and_context_stays_usable() {
    let manifest = pizza_sushi_manifest();
    let ctx = context(probabilities(vec![0.3, 0.7]), ModelTier::Custom, &["pizza", "sushi"], &manifest);

    let err = ctx
        .classify(RawImageSource::Bytes(b"not an image".to_vec()))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Preprocessing(_)));
    assert!(!err.is_fatal());

    assert!(ctx.classify(photo()).await.unwrap().is_some());
}

struct Blocking {
    started: Option<tokio::sync::oneshot::Sender<()>>,
    release: mpsc::Receiver<()>,
    fail: bool,
}

impl ModelProvider for Blocking {
    fn predict(&mut self, _input: Array4<f32>) -> Result<Vec<f32>, AppError> {
        if let Some(started) = self.started.take() {
            let _ = started.send(());
        }
        self.release
            .recv()
            .map_err(|_| AppError::Inference("released".to_string()))?;
        if self.fail {
            return Err(AppError::Inference("session failed".to_string()));
        }
        Ok(vec![0.1, 0.9])
    }
}

async fn classify_then_reset(fail: bool) -> Result<Option<DisplayResult>, AppError> {
    let (started_tx, started_rx) = tokio::sync::oneshot::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let manifest = pizza_sushi_manifest();
    let ctx = context(
        Box::new(Blocking {
            started: Some(started_tx),
            release: release_rx,
            fail,
        }),
        ModelTier::Custom,
        &["pizza", "sushi"],
        &manifest,
    );

    let in_flight = {
        let ctx = ctx.clone();
        tokio::spawn(async move { ctx.classify(photo()).await })
    };

    started_rx.await.unwrap();
    ctx.reset();
    release_tx.send(()).unwrap();

    in_flight.await.unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reset_drops_in_flight_result() {
    let result = classify_then_reset(false).await.unwrap();
    assert!(result.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reset_drops_in_flight_error() {
    let result = classify_then_reset(true).await.unwrap();
    assert!(result.is_none());
}

enum Outcome {
    Ok(Vec<f32>),
    Fail,
}

struct FakeLoader {
    manifest: Option<&'static str>,
    custom: Outcome,
    fallback: Outcome,
    fallback_labels: Vec<String>,
}

impl FakeLoader {
    fn fallback_labels() -> Vec<String> {
        vec!["tench, Tinca tinca".to_string(), "pizza, pizza pie".to_string()]
    }
}

impl TierLoader for FakeLoader {
    async fn load_manifest(&self) -> Result<Manifest, AppError> {
        match self.manifest {
            Some(text) => Manifest::from_json(text),
            None => Err(AppError::Manifest("fetch failed".to_string())),
        }
    }

    async fn load_custom(&self) -> Result<TierModel, AppError> {
        match &self.custom {
            Outcome::Ok(output) => Ok(TierModel {
                provider: probabilities(output.clone()),
                input: InputSpec::MobileNet { size: 16 },
            }),
            Outcome::Fail => Err(AppError::Model("model.onnx missing".to_string())),
        }
    }

    async fn load_fallback(&self) -> Result<(TierModel, Vec<String>), AppError> {
        match &self.fallback {
            Outcome::Ok(output) => Ok((
                TierModel {
                    provider: Box::new(Fixed {
                        output: output.clone(),
                        kind: OutputKind::Logits,
                    }),
                    input: InputSpec::ImageNet { crop_size: 16 },
                },
                self.fallback_labels.clone(),
            )),
            Outcome::Fail => Err(AppError::Model("offline".to_string())),
        }
    }
}

#[tokio::test]
async fn custom_tier_is_preferred() {
    let loader = FakeLoader {
        manifest: Some(r#"{"classes": ["pizza", "sushi"], "calories": {"pizza": 300}}"#),
        custom: Outcome::Ok(vec![0.5, 0.5]),
        fallback: Outcome::Fail,
        fallback_labels: Vec::new(),
    };

    let loaded = load_model(&loader).await.unwrap();

    assert_eq!(loaded.tier, ModelTier::Custom);
    assert_eq!(&*loaded.class_index, &["pizza".to_string(), "sushi".to_string()]);
    assert_eq!(loaded.input, InputSpec::MobileNet { size: 16 });
}

#[tokio::test]
async fn manifest_failure_falls_back_and_cleans_labels() {
    let loader = FakeLoader {
        manifest: None,
        custom: Outcome::Ok(vec![0.5, 0.5]),
        fallback: Outcome::Ok(vec![0.0, 4.0]),
        fallback_labels: FakeLoader::fallback_labels(),
    };

    let loaded = load_model(&loader).await.unwrap();
    assert_eq!(loaded.tier, ModelTier::Fallback);
    assert!(loaded.registry.is_empty());

    let ctx = ClassifierContext::new(loaded, 3, CalorieRange::default());
    assert!(!ctx.is_custom());

    let result = ctx.classify(photo()).await.unwrap().unwrap();
    assert_eq!(result.label, "pizza");
    assert_eq!(result.tier, ModelTier::Fallback);
    assert_eq!(result.provenance, Provenance::Placeholder);
}

#[tokio::test]
async fn fallback_keeps_manifest_nutrition() {
    let loader = FakeLoader {
        manifest: Some(r#"{"classes": ["pizza", "sushi"], "calories": {"pizza": 300}}"#),
        custom: Outcome::Fail,
        fallback: Outcome::Ok(vec![0.0, 4.0]),
        fallback_labels: FakeLoader::fallback_labels(),
    };

    let loaded = load_model(&loader).await.unwrap();
    assert_eq!(loaded.tier, ModelTier::Fallback);

    let ctx = ClassifierContext::new(loaded, 3, CalorieRange::default());
    let result = ctx.classify(photo()).await.unwrap().unwrap();
    assert_eq!(result.label, "pizza");
    assert_eq!(result.provenance, Provenance::Derived);
    assert_eq!(result.calories, 300);
}

#[tokio::test]
async fn warmup_shape_mismatch_falls_back() {
    let loader = FakeLoader {
        manifest: Some(r#"["pizza", "sushi", "ramen"]"#),
        custom: Outcome::Ok(vec![0.2, 0.8]),
        fallback: Outcome::Ok(vec![1.0, 0.0]),
        fallback_labels: FakeLoader::fallback_labels(),
    };

    let loaded = load_model(&loader).await.unwrap();
    assert_eq!(loaded.tier, ModelTier::Fallback);
    assert_eq!(loaded.class_index.len(), 2);
}

#[tokio::test]
async fn both_tiers_failing_is_fatal() {
    let loader = FakeLoader {
        manifest: None,
        custom: Outcome::Fail,
        fallback: Outcome::Fail,
        fallback_labels: Vec::new(),
    };

    let err = load_model(&loader).await.err().unwrap();
    assert!(matches!(err, AppError::ModelUnavailable(_)));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn fallback_without_labels_is_fatal() {
    let loader = FakeLoader {
        manifest: None,
        custom: Outcome::Fail,
        fallback: Outcome::Ok(vec![1.0]),
        fallback_labels: Vec::new(),
    };

    assert!(matches!(
        load_model(&loader).await,
        Err(AppError::ModelUnavailable(_))
    ));
}

#[test]
fn status_reports_vocabulary_and_registry_sizes() {
    let manifest = pizza_sushi_manifest();
    let ctx = context(probabilities(vec![0.5, 0.5]), ModelTier::Custom, &["pizza", "sushi"], &manifest);

    let status = ctx.clone().status();
    assert_eq!(status.tier, ModelTier::Custom);
    assert_eq!(status.classes, 2);
    assert_eq!(status.nutrition_entries, 1);
}

use crate::error::AppError;
use crate::models::classify_types::{DisplayResult, ModelStatus};
use crate::services::classifier::context::ClassifierContext;
use crate::services::classifier::preprocess::RawImageSource;
use crate::services::fs_service;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Clone, Default, PartialEq, Eq)]
pub struct ClassifySummary {
    pub classified: usize,
    pub failed: usize,
    pub stale: usize,
}

pub fn get_model_status(ctx: &ClassifierContext) -> ModelStatus {
    ctx.status()
}

/// Classify every photo under `inputs` in order, printing each result.
///
/// A bad photo is logged and skipped; only fatal errors stop the run.
pub async fn classify_images(
    ctx: &ClassifierContext,
    inputs: &[PathBuf],
    json: bool,
) -> Result<ClassifySummary, AppError> {
    let image_paths = fs_service::collect_image_paths(inputs)?;
    let mut summary = ClassifySummary::default();

    if image_paths.is_empty() {
        log::warn!("No images found");
        return Ok(summary);
    }

    for path in image_paths {
        match ctx.classify(RawImageSource::Path(path.clone())).await {
            Ok(Some(result)) => {
                let rendered = if json {
                    render_json(&path, &result)?
                } else {
                    render_text(&path, &result)
                };
                println!("{}", rendered);
                summary.classified += 1;
            }
            Ok(None) => summary.stale += 1,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                log::error!("Failed to classify {}: {}", path.display(), e);
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}

pub fn render_json(path: &Path, result: &DisplayResult) -> Result<String, AppError> {
    Ok(serde_json::to_string(&serde_json::json!({
        "file": path.to_string_lossy(),
        "result": result,
    }))?)
}

pub fn render_text(path: &Path, result: &DisplayResult) -> String {
    let mut out = format!(
        "{}\n  {} ({:.1}% match)\n  Calories: {} kcal{}\n  Protein {}g | Carbs {}g | Fat {}g\n",
        path.display(),
        result.display_name,
        result.confidence_pct,
        result.calories,
        if result.provenance.is_estimated() { " (estimated)" } else { "" },
        result.protein_g,
        result.carbs_g,
        result.fat_g,
    );

    if !result.top_k.is_empty() {
        out.push_str(&format!("  Top {} guesses:\n", result.top_k.len()));
        for (i, guess) in result.top_k.iter().enumerate() {
            out.push_str(&format!(
                "    {}. {} ({:.1}%)\n",
                i + 1,
                guess.display_name,
                guess.confidence_pct
            ));
        }
    }
    out.push_str(&format!("  Model: {}", result.tier.label()));
    out
}

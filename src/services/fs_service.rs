use crate::error::AppError;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp", "tiff", "tif"];

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Expand the given arguments into photo paths.
///
/// Files are kept as given (even without an image extension, so a bad
/// file is reported rather than skipped). Directories are walked and
/// only image files are kept, sorted case-insensitively by path.
pub fn collect_image_paths(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, AppError> {
    let mut images = Vec::new();

    for input in inputs {
        if !input.exists() {
            return Err(format!("Path does not exist: {}", input.display()).into());
        }

        if input.is_file() {
            images.push(input.clone());
            continue;
        }

        let mut found: Vec<PathBuf> = WalkDir::new(input)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                !e.file_name().to_string_lossy().starts_with('.') && is_image_file(e.path())
            })
            .map(|e| e.into_path())
            .collect();

        found.sort_by(|a, b| {
            a.to_string_lossy()
                .to_lowercase()
                .cmp(&b.to_string_lossy().to_lowercase())
        });
        images.extend(found);
    }

    Ok(images)
}

use crate::error::AppError;
use crate::services::exif_service;
use base64::Engine;
use image::{DynamicImage, ImageReader};
use ndarray::Array4;
use std::io::Cursor;
use std::path::PathBuf;

const CROP_PCT: f32 = 0.875;

// ImageNet normalization constants
const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// A photo as handed over by the caller.
#[derive(Debug, Clone)]
pub enum RawImageSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
    /// `data:image/...;base64,...`
    DataUrl(String),
}

impl RawImageSource {
    pub fn describe(&self) -> String {
        match self {
            RawImageSource::Path(path) => path.display().to_string(),
            RawImageSource::Bytes(bytes) => format!("<{} bytes>", bytes.len()),
            RawImageSource::DataUrl(url) => format!("<data url, {} chars>", url.len()),
        }
    }

    fn into_bytes(self) -> Result<Vec<u8>, AppError> {
        match self {
            RawImageSource::Path(path) => std::fs::read(&path).map_err(|e| {
                AppError::Preprocessing(format!("Failed to open image {}: {}", path.display(), e))
            }),
            RawImageSource::Bytes(bytes) => Ok(bytes),
            RawImageSource::DataUrl(url) => decode_data_url(&url),
        }
    }
}

impl From<PathBuf> for RawImageSource {
    fn from(path: PathBuf) -> Self {
        RawImageSource::Path(path)
    }
}

fn decode_data_url(url: &str) -> Result<Vec<u8>, AppError> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| AppError::Preprocessing("Not a data URL".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| AppError::Preprocessing("Data URL has no payload".to_string()))?;
    if !header.ends_with(";base64") {
        return Err(AppError::Preprocessing(
            "Only base64 data URLs are supported".to_string(),
        ));
    }
    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| AppError::Preprocessing(format!("Invalid base64 image data: {}", e)))
}

/// Tensor layout and normalization a model was trained with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSpec {
    /// Nearest-neighbour resize to `size`x`size`, `(x / 127.5) - 1`, NHWC.
    MobileNet { size: u32 },
    /// Shortest-edge resize, centre crop, ImageNet mean/std, NCHW.
    ImageNet { crop_size: u32 },
}

impl InputSpec {
    pub fn shape(&self) -> (usize, usize, usize, usize) {
        match *self {
            InputSpec::MobileNet { size } => (1, size as usize, size as usize, 3),
            InputSpec::ImageNet { crop_size } => (1, 3, crop_size as usize, crop_size as usize),
        }
    }

    /// Zero tensor of the expected shape, used for warmup runs.
    pub fn blank(&self) -> Array4<f32> {
        Array4::zeros(self.shape())
    }
}

#[inline]
pub fn normalize_mobilenet(value: f32) -> f32 {
    value / 127.5 - 1.0
}

pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, AppError> {
    let img = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| AppError::Preprocessing(format!("Failed to read image: {}", e)))?
        .decode()
        .map_err(|e| AppError::Preprocessing(format!("Failed to decode image: {}", e)))?;

    let img = exif_service::apply_orientation(img, exif_service::get_orientation(bytes));
    ensure_non_empty(&img)?;
    Ok(img)
}

fn ensure_non_empty(img: &DynamicImage) -> Result<(), AppError> {
    if img.width() == 0 || img.height() == 0 {
        return Err(AppError::Preprocessing(format!(
            "Image has no pixels ({}x{})",
            img.width(),
            img.height()
        )));
    }
    Ok(())
}

pub fn preprocess(source: RawImageSource, spec: InputSpec) -> Result<Array4<f32>, AppError> {
    let bytes = source.into_bytes()?;
    let img = decode_image(&bytes)?;
    drop(bytes);
    preprocess_decoded(&img, spec)
}

pub fn preprocess_decoded(img: &DynamicImage, spec: InputSpec) -> Result<Array4<f32>, AppError> {
    ensure_non_empty(img)?;
    match spec {
        InputSpec::MobileNet { size } => mobilenet_tensor(img, size),
        InputSpec::ImageNet { crop_size } => imagenet_tensor(img, crop_size),
    }
}

fn mobilenet_tensor(img: &DynamicImage, size: u32) -> Result<Array4<f32>, AppError> {
    let rgb = img
        .resize_exact(size, size, image::imageops::FilterType::Nearest)
        .to_rgb8();

    // RGB8 rows are already HWC, so the data maps straight onto NHWC.
    let data: Vec<f32> = rgb
        .into_raw()
        .into_iter()
        .map(|v| normalize_mobilenet(v as f32))
        .collect();

    Array4::from_shape_vec((1, size as usize, size as usize, 3), data)
        .map_err(|e| AppError::Preprocessing(format!("Failed to create tensor: {}", e)))
}

fn imagenet_tensor(img: &DynamicImage, crop_size: u32) -> Result<Array4<f32>, AppError> {
    // Shortest edge to ceil(crop_size / crop_pct), then a centre crop. The crop
    // window is taken in source pixels first so the resize never exceeds
    // crop_size x crop_size, whatever the aspect ratio.
    let resize_size = (crop_size as f32 / CROP_PCT).ceil() as u32;
    let (w, h) = (img.width(), img.height());
    let short = w.min(h);
    let window = ((crop_size as f64 * short as f64 / resize_size as f64).round() as u32).clamp(1, short);

    let crop_x = (w - window) / 2;
    let crop_y = (h - window) / 2;
    let rgb = img
        .crop_imm(crop_x, crop_y, window, window)
        .resize_exact(crop_size, crop_size, image::imageops::FilterType::Triangle)
        .to_rgb8();

    // Normalize while scattering HWC pixels into CHW planes.
    let hw = (crop_size * crop_size) as usize;
    let mut data = vec![0f32; 3 * hw];
    for (i, pixel) in rgb.into_raw().chunks_exact(3).enumerate() {
        for c in 0..3 {
            data[c * hw + i] = (pixel[c] as f32 / 255.0 - MEAN[c]) / STD[c];
        }
    }

    Array4::from_shape_vec((1, 3, crop_size as usize, crop_size as usize), data)
        .map_err(|e| AppError::Preprocessing(format!("Failed to create tensor: {}", e)))
}

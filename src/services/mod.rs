pub mod classifier;
pub mod exif_service;
pub mod fs_service;
pub mod nutrition_service;

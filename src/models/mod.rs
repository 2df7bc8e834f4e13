pub mod classify_types;
pub mod manifest_types;
pub mod nutrition_types;

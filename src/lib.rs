pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod models;
pub mod services;

use cli::Cli;
use config::AppConfig;
use error::AppError;
use services::classifier::context::ClassifierContext;
use services::classifier::model_manager::{self, ModelManager};

/// Load the model once, then classify every photo named on the command line.
pub async fn run(cli: Cli) -> Result<(), AppError> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);
    config.validate()?;

    let manager = ModelManager::new(config.clone());
    let loaded = model_manager::load_model(&manager).await?;
    let ctx = ClassifierContext::from_config(loaded, &config);

    let status = commands::classifier::get_model_status(&ctx);
    if ctx.is_custom() {
        log::info!("Using {} ({} classes)", status.tier.label(), status.classes);
    } else {
        log::warn!(
            "Using {} ({} labels); dish names and calorie estimates are less reliable",
            status.tier.label(),
            status.classes
        );
    }

    let summary = commands::classifier::classify_images(&ctx, &cli.images, cli.json).await?;
    log::info!(
        "Classified {} photo(s), {} failed",
        summary.classified,
        summary.failed
    );

    if summary.classified == 0 && summary.failed > 0 {
        return Err(format!("All {} photo(s) failed to classify", summary.failed).into());
    }
    Ok(())
}

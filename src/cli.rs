use crate::config::AppConfig;
use clap::Parser;
use std::path::PathBuf;

/// Identify a dish in a photo and estimate its calories and macros.
#[derive(Debug, Parser)]
#[command(name = "nutri-scan", version, about)]
pub struct Cli {
    /// Photos, or directories to search for photos
    #[arg(required = true)]
    pub images: Vec<PathBuf>,

    /// JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Custom model directory or http(s) base URL
    #[arg(short, long)]
    pub model: Option<String>,

    /// Where downloaded models are kept
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Number of ranked guesses to show
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Try GPU execution providers before the CPU
    #[arg(long)]
    pub gpu: bool,

    /// Print one JSON document per photo
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// Command-line flags win over the config file.
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(model) = &self.model {
            config.model_source = model.clone();
        }
        if let Some(cache_dir) = &self.cache_dir {
            config.cache_dir = cache_dir.clone();
        }
        if let Some(top_k) = self.top_k {
            config.top_k = top_k;
        }
        if self.gpu {
            config.use_gpu = true;
        }
    }
}

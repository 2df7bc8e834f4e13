use clap::Parser;
use nutri_scan_lib::cli::Cli;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = nutri_scan_lib::run(cli).await {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use mandelzoom_app::cli::Cli;
use mandelzoom_app::{App, AppPreferences};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    info!("Starting MandelZoom");

    let app = App::new(AppPreferences::load());
    match app.run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

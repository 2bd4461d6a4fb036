use std::process::ExitCode;

use clap::Parser;
use log::{error, warn};

use gmail_export::app;
use gmail_export::cli::{handle_credentials_clear, Cli};
use gmail_export::gmail_api::{CredentialManager, HttpRefresher, InstalledFlow, StoreBackend};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let clear = cli.clear_credentials;
    let config = cli.into_config();

    let store = match StoreBackend::from_kind(&config.credential_store) {
        Ok(store) => store,
        Err(e) => {
            error!("Cannot open credential store: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if clear {
        return match handle_credentials_clear(&store).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("Failed to delete stored credentials: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    let http = reqwest::Client::new();
    let credentials = CredentialManager::new(
        &config,
        store,
        HttpRefresher::new(http.clone()),
        InstalledFlow::new(config.redirect_port),
    );

    match app::run(&config, &credentials, http).await {
        Ok(summary) => {
            if summary.skipped > 0 {
                warn!(
                    "{} of {} messages could not be fetched",
                    summary.skipped,
                    summary.listed
                );
            }
            println!("Data has been saved to {}", summary.output.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

//! `assetdesk` entry point.

use assetdesk_client::cli::{self, Cli};
use assetdesk_client::config::ClientConfig;
use assetdesk_client::desk::AssetDesk;
use assetdesk_client::error::ClientError;
use assetdesk_client::telemetry;
use clap::Parser;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> Result<ExitCode, ClientError> {
    let args = Cli::parse();
    let config = ClientConfig::load(args.config.clone())?;
    telemetry::init(&config.telemetry)?;
    let desk = AssetDesk::new(&config)?;

    match cli::execute(args.command, &desk).await {
        Ok(output) => {
            println!("{}", output);
            Ok(ExitCode::SUCCESS)
        }
        Err(toast) => {
            eprintln!("{}", toast.message);
            Ok(ExitCode::FAILURE)
        }
    }
}

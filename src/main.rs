use std::{sync::Arc, time::Duration};

use clap::Parser;
use color_eyre::Result;
use serial_gateway::{
    cli::Cli, config::Config, console, filters::Filters, gateway::Gateway, logging,
    transport::serial::SerialTransport,
};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e)
            if matches!(
                e.kind(),
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
            ) =>
        {
            e.exit()
        }
        Err(e) => {
            // Missing arguments are a usage error, not a crash.
            let _ = e.print();
            std::process::exit(1);
        }
    };

    let config = Config::new_from_path(&cli.config)?;

    let file_logging = config
        .logging_active
        .then(|| (Level::INFO, cli.log_path.clone()));
    logging::init(Level::INFO, file_logging);

    let filters = Filters::load(&cli.allowlist, &cli.denylist)?;

    let gateway = Gateway::new(config, filters, Arc::new(SerialTransport))?;
    gateway.start();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
        }
        _ = console::run(gateway.clone()) => {
            info!("Console closed, shutting down");
        }
    }

    gateway.stop().await;

    while !gateway.all_readers_exited() {
        info!("Waiting for readers to finish");
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    Ok(())
}

use locus_core::config::Config;
use locus_core::node::{self, Node};
use locus_core::utils::tracing::init_logging;
use locus_core::Context;
use std::path::Path;
use std::process::ExitCode;
use tokio::sync::watch;
use tracing::error;

/// Launch one herd member: `server <ServerName> [config.yml]`. The name
/// must be a key of the config's servers map.
#[tokio::main]
async fn main() -> ExitCode {
    let mut args = std::env::args().skip(1);
    let name = match args.next() {
        Some(name) => name,
        None => {
            eprintln!("Usage: server <ServerName> [config.yml]");
            return ExitCode::FAILURE;
        }
    };
    let config_path = args.next();

    let config = match Config::from_fs(config_path.as_deref().map(Path::new)).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("config error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let ctx = match Context::new(&config, &name) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("Usage: server <ServerName> [config.yml]\nValid names: {}", config.valid_names());
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config.logging);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let member = match Node::bind(ctx, shutdown_rx).await {
        Ok(member) => member,
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    tokio::spawn(async move {
        node::shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    member.run().await;
    ExitCode::SUCCESS
}

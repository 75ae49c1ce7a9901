//! Authentication Gateway
//!
//! Issues ES256 access/refresh tokens and forwards authenticated requests to
//! an upstream service with the verified identity injected as headers.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use auth_gateway::{
    cli::{Cli, Command},
    config::Config,
    gateway::Gateway,
    keys::generate_key_pair,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    match cli.command {
        Some(Command::GenerateKeys) => run_generate_keys(),
        Some(Command::Serve) | None => run_server(cli).await,
    }
}

/// Generate and print a fresh signing key pair.
fn run_generate_keys() -> ExitCode {
    match generate_key_pair() {
        Ok(pair) => {
            println!("Key ID: {}", pair.kid);
            println!();
            println!("Private JWK (configure as jwt.private_key, keep secret):");
            println!(
                "{}",
                serde_json::to_string_pretty(&pair.private_jwk).unwrap_or_default()
            );
            println!();
            println!("Public JWK (publish in your JWKS endpoint):");
            println!(
                "{}",
                serde_json::to_string_pretty(&pair.public_jwk).unwrap_or_default()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to generate keys: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Run the gateway server
async fn run_server(cli: Cli) -> ExitCode {
    let config = match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            // Apply CLI overrides
            if let Some(port) = cli.port {
                config.server.port = port;
            }
            if let Some(ref host) = cli.host {
                config.server.host = host.clone();
            }
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        "Starting auth gateway"
    );

    let gateway = match Gateway::new(config) {
        Ok(g) => g,
        Err(e) => {
            error!("Failed to create gateway: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = gateway.run().await {
        error!("Gateway error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Gateway shutdown complete");
    ExitCode::SUCCESS
}

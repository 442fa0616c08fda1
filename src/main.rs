use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use recruit_gateway::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = cli::Cli::parse();
    let command = args.get_command();

    // The server initializes logging from its config; one-off commands only
    // need warnings
    if !matches!(command, cli::Commands::Start) {
        init_tracing("warn", "pretty");
    }

    // Dispatch to appropriate command handler
    match command {
        cli::Commands::Start => {
            commands::start::execute(&args.config).await?;
        }
        cli::Commands::Test => {
            commands::test::execute(&args.config)?;
        }
        cli::Commands::OAuth { action } => match action {
            cli::OAuthCommands::Status { integration, user } => {
                commands::oauth::status(&args.config, integration, user).await?
            }
            cli::OAuthCommands::Refresh { integration, user } => {
                commands::oauth::refresh(&args.config, integration, user).await?
            }
            cli::OAuthCommands::Logout { integration, user } => {
                commands::oauth::logout(&args.config, integration, user).await?
            }
        },
        cli::Commands::Session { action } => match action {
            cli::SessionCommands::Issue { user, ttl_hours } => {
                commands::session::issue(&args.config, user, ttl_hours).await?
            }
        },
        cli::Commands::Version => {
            println!("recruit-gateway v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

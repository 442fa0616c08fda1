use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "recruit-gateway",
    version,
    about = "OAuth token manager and API proxy for JobAdder and LinkedIn"
)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the gateway server (default)
    Start,

    /// Test configuration file validity
    Test,

    /// OAuth token management
    #[command(name = "oauth")]
    OAuth {
        #[command(subcommand)]
        action: OAuthCommands,
    },

    /// Dashboard session management
    Session {
        #[command(subcommand)]
        action: SessionCommands,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand, Debug, Clone)]
pub enum OAuthCommands {
    /// Show stored token status
    Status {
        /// Integration name (jobadder, linkedin)
        integration: String,

        /// User id (lists all users if omitted)
        user: Option<String>,
    },

    /// Refresh a user's access token now
    Refresh {
        /// Integration name (jobadder, linkedin)
        integration: String,

        /// User id
        user: String,
    },

    /// Delete a user's stored tokens
    Logout {
        /// Integration name (jobadder, linkedin)
        integration: String,

        /// User id
        user: String,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum SessionCommands {
    /// Issue a bearer session token for a dashboard user
    Issue {
        /// User id
        user: String,

        /// Session lifetime in hours
        #[arg(long, default_value = "720")]
        ttl_hours: i64,
    },
}

impl Cli {
    /// Get the command to execute, defaulting to Start if none provided
    pub fn get_command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_start() {
        let cli = Cli {
            config: PathBuf::from("config.toml"),
            command: None,
        };

        assert!(matches!(cli.get_command(), Commands::Start));
    }

    #[test]
    fn test_cli_parsing_global_config() {
        let args = vec!["recruit-gateway", "test", "--config", "/etc/recruit/gateway.toml"];
        let cli = Cli::try_parse_from(args).unwrap();

        assert_eq!(cli.config, PathBuf::from("/etc/recruit/gateway.toml"));
        assert!(matches!(cli.get_command(), Commands::Test));
    }

    #[test]
    fn test_cli_parsing_oauth_status_without_user() {
        let args = vec!["recruit-gateway", "oauth", "status", "linkedin"];
        let cli = Cli::try_parse_from(args).unwrap();

        match cli.get_command() {
            Commands::OAuth {
                action: OAuthCommands::Status { integration, user },
            } => {
                assert_eq!(integration, "linkedin");
                assert!(user.is_none());
            }
            _ => panic!("Expected OAuth status command"),
        }
    }

    #[test]
    fn test_cli_parsing_oauth_refresh_requires_user() {
        let args = vec!["recruit-gateway", "oauth", "refresh", "jobadder"];
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn test_cli_parsing_session_issue() {
        let args = vec!["recruit-gateway", "session", "issue", "user-1", "--ttl-hours", "24"];
        let cli = Cli::try_parse_from(args).unwrap();

        match cli.get_command() {
            Commands::Session {
                action: SessionCommands::Issue { user, ttl_hours },
            } => {
                assert_eq!(user, "user-1");
                assert_eq!(ttl_hours, 24);
            }
            _ => panic!("Expected Session command"),
        }
    }
}

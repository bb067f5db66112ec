pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "nidhi")]
#[command(about = "Nidhi CLI - Operator tooling for the database provisioning API")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in JSON format instead of text")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Request directory schema migrations")]
    Migrate {
        #[command(subcommand)]
        cmd: commands::migrate::MigrateCommands,
    },

    #[command(about = "Issue a signed bearer token for local testing")]
    Token(commands::token::TokenArgs),

    #[command(about = "Show the effective configuration with secrets masked")]
    Config,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Migrate { cmd } => commands::migrate::handle(cmd, output_format).await,
        Commands::Token(args) => commands::token::handle(args, output_format),
        Commands::Config => commands::config::handle(output_format),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_arguments_parse() {
        let cli = Cli::try_parse_from([
            "nidhi", "--json", "token", "--user-id", "7", "--username", "alice", "--role", "student", "--tenant", "north",
        ])
        .unwrap();

        assert!(matches!(OutputFormat::from_cli(&cli), OutputFormat::Json));
        match cli.command {
            Commands::Token(args) => {
                assert_eq!(args.user_id, 7);
                assert_eq!(args.tenant, "north");
                assert!(args.hours.is_none());
            }
            _ => panic!("expected token command"),
        }
    }

    #[test]
    fn text_is_the_default_output() {
        let cli = Cli::try_parse_from(["nidhi", "config"]).unwrap();
        assert!(matches!(OutputFormat::from_cli(&cli), OutputFormat::Text));
        assert!(Cli::try_parse_from(["nidhi", "--text", "config"]).is_err());
    }

    #[test]
    fn migrate_requires_a_subcommand() {
        assert!(Cli::try_parse_from(["nidhi", "migrate"]).is_err());
        assert!(Cli::try_parse_from(["nidhi", "migrate", "run"]).is_ok());
    }
}

pub mod accounts;
pub mod onboard;

use crate::model::Role;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    name = "taskpulse",
    about = "Core and diverted task tracking with productivity dashboards"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    Onboard,
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Run the HTTP API and the nightly rollup in the foreground.
    Service,
    Status,
    Doctor,
    /// Write daily summaries for one day (default: today).
    Rollup {
        #[arg(long)]
        date: Option<String>,
    },
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    Tasks {
        #[command(subcommand)]
        command: TaskCommands,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    Set { key: String, value: String },
    Get { key: String },
}

#[derive(Debug, Subcommand)]
pub enum UserCommands {
    Create {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        #[arg(long, value_enum, default_value_t = RoleArg::Agent)]
        role: RoleArg,
        /// Prompted for when omitted.
        #[arg(long)]
        password: Option<String>,
    },
    List,
    Activate { id: String },
    Deactivate { id: String },
}

#[derive(Debug, Subcommand)]
pub enum TaskCommands {
    List,
    /// Load the catalog file into the database.
    Sync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RoleArg {
    Agent,
    Admin,
}

impl From<RoleArg> for Role {
    fn from(value: RoleArg) -> Self {
        match value {
            RoleArg::Agent => Role::Agent,
            RoleArg::Admin => Role::Admin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Cli, Commands, RoleArg, UserCommands};
    use clap::Parser;

    #[test]
    fn user_create_defaults_to_agent() {
        let cli = Cli::try_parse_from([
            "taskpulse",
            "user",
            "create",
            "--email",
            "ada@example.com",
            "--name",
            "Ada",
        ])
        .expect("parses");

        match cli.command {
            Commands::User {
                command: UserCommands::Create { role, password, .. },
            } => {
                assert_eq!(role, RoleArg::Agent);
                assert!(password.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rollup_takes_optional_date() {
        let cli = Cli::try_parse_from(["taskpulse", "rollup", "--date", "2026-03-10"])
            .expect("parses");
        assert!(matches!(
            cli.command,
            Commands::Rollup { date: Some(ref date) } if date == "2026-03-10"
        ));
    }
}

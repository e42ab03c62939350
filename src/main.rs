use clap::Parser;
use tracing::info;

use survey_recorder::commands::{self, Command};
use survey_recorder::state::{AppState, RecorderConfig};

#[derive(Parser)]
#[command(name = "survey-recorder")]
#[command(about = "Record teacher-feedback survey submissions and summarise them", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// Read `.env` and the environment, start logging, and open the stores.
async fn open_state() -> anyhow::Result<(RecorderConfig, AppState)> {
    // Load env
    let _ = dotenv::dotenv();
    let config = RecorderConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_writer(std::io::stderr)
        .init();

    let state = AppState::build(&config).await?;
    Ok((config, state))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Needs no stores, so a bad SURVEY_* variable cannot break it.
        Command::Classify(args) => commands::classify::run(args)?,
        Command::Submit(args) => {
            let (_, state) = open_state().await?;
            commands::submit::run(&state, args).await?;
        }
        Command::Report(args) => {
            let (config, state) = open_state().await?;
            info!(data_dir = ?config.data_dir, "Building report");
            commands::report::run(&state, args).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_classify_runs_without_config() {
        // Parsing and running classify never touch RecorderConfig.
        let cli = Cli::try_parse_from(["survey-recorder", "classify", "I love it", "--table", "sentiment"])
            .unwrap();
        match cli.command {
            Command::Classify(args) => commands::classify::run(args).unwrap(),
            _ => panic!("expected classify"),
        }
    }
}

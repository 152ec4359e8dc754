use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::*;
use mgn_cli::{
    job::JobCommand, launch::LaunchTestCommand, list::ListCommand, terminate::TerminateTestCommand, HelperConfig,
};
use mgn_types::OperationOutcome;

#[derive(Debug, Parser)]
#[clap(name = "mgn", about = "Bulk-manage migration source servers")]
pub struct Mgn {
    /// Read settings from a JSON file instead of flags
    #[clap(long, short, global = true)]
    config: Option<PathBuf>,
    #[clap(long, short, global = true)]
    verbose: bool,
    #[clap(flatten)]
    settings: HelperConfig,
    #[clap(subcommand)]
    pub command: MgnCommand,
}

#[derive(Debug, Subcommand)]
pub enum MgnCommand {
    /// List source servers with their status
    List(ListCommand),
    /// Launch test instances for many servers
    LaunchTest(LaunchTestCommand),
    /// Terminate test instances for many servers
    TerminateTest(TerminateTestCommand),
    /// Show the status of one job
    Job(JobCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let parser = Mgn::parse();

    let level = if parser.verbose { log::Level::Debug } else { log::Level::Info };
    simple_logger::init_with_level(level)?;

    let config = match &parser.config {
        Some(path) => HelperConfig::from_file(path)?,
        None => parser.settings.clone(),
    };
    log::debug!(
        "Using endpoint {} (region {}, profile {})",
        config.endpoint_url(),
        config.region,
        config.profile
    );
    let api = config.client();

    let outcome = match &parser.command {
        MgnCommand::List(command) => {
            command.handle(&config, api).await?;
            OperationOutcome::AllSucceeded
        }
        MgnCommand::LaunchTest(command) => command.handle(&config, api).await?,
        MgnCommand::TerminateTest(command) => command.handle(&config, api).await?,
        MgnCommand::Job(command) => {
            command.handle(api).await?;
            OperationOutcome::AllSucceeded
        }
    };

    match outcome {
        OperationOutcome::AllSucceeded => Ok(ExitCode::SUCCESS),
        OperationOutcome::Pending => {
            eprintln!("{}", "Operation was cancelled before every server was processed".bright_yellow());
            Ok(ExitCode::from(130))
        }
        OperationOutcome::AllFailed | OperationOutcome::Mixed => Ok(ExitCode::from(1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_parse_on_either_side_of_the_subcommand() {
        let after = Mgn::try_parse_from(["mgn", "list", "--region", "eu-west-1", "--max-concurrent", "3"]).unwrap();
        assert_eq!(after.settings.region, "eu-west-1");
        assert_eq!(after.settings.max_concurrent, 3);
        assert!(matches!(after.command, MgnCommand::List(_)));

        let before = Mgn::try_parse_from(["mgn", "-r", "ap-south-1", "terminate-test", "-i", "s-1,s-2"]).unwrap();
        assert_eq!(before.settings.region, "ap-south-1");
        match before.command {
            MgnCommand::TerminateTest(command) => assert_eq!(command.ids, vec!["s-1", "s-2"]),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}

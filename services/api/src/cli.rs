use crate::evaluate::{run_evaluation, EvaluateArgs};
use crate::server;
use call_compliance::error::AppError;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "Call Compliance Engine",
    about = "Score recorded calls against organization compliance rules",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Evaluate a single call offline against a rules file
    Evaluate(EvaluateArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Override the configured rules file
    #[arg(long)]
    pub(crate) rules: Option<std::path::PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Evaluate(args) => run_evaluation(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["call-compliance-api"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn evaluate_accepts_rules_call_and_organization() {
        let cli = Cli::try_parse_from([
            "call-compliance-api",
            "evaluate",
            "--rules",
            "config/rules.example.json",
            "--call",
            "call.json",
            "--organization",
            "org-acme",
        ])
        .expect("parses");

        match cli.command {
            Some(Command::Evaluate(args)) => {
                assert_eq!(args.organization.as_deref(), Some("org-acme"));
                assert_eq!(args.call.to_string_lossy(), "call.json");
            }
            other => panic!("expected evaluate command, got {other:?}"),
        }
    }

    #[test]
    fn evaluate_requires_a_rules_file() {
        assert!(Cli::try_parse_from(["call-compliance-api", "evaluate", "--call", "call.json"])
            .is_err());
    }
}

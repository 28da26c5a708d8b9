use crate::demo::{run_seed_demo, SeedDemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use nexus_polls::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Nexus Polls",
    about = "Run the Nexus Polls voting API or exercise it from the command line",
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
    /// Create a sample poll in memory, cast votes, and print the results
    SeedDemo(SeedDemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Preload a sample poll so the API has data to browse
    #[arg(long)]
    pub(crate) seed: bool,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::SeedDemo(args) => run_seed_demo(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_demo_accepts_open_days_in_range() {
        let cli = Cli::try_parse_from(["nexus-polls", "seed-demo", "--open-days", "30"])
            .expect("parsed");
        match cli.command {
            Some(Command::SeedDemo(args)) => assert_eq!(args.open_days, Some(30)),
            other => panic!("expected seed-demo, got {other:?}"),
        }
    }

    #[test]
    fn seed_demo_rejects_open_days_out_of_range() {
        for days in ["-1", "0", "3651", "9223372036854775807"] {
            let result = Cli::try_parse_from(["nexus-polls", "seed-demo", "--open-days", days]);
            assert!(result.is_err(), "{days} accepted");
        }
    }
}

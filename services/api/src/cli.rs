use crate::demo::{run_age_check, run_demo, AgeArgs, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use companion_registration::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Companion Registration",
    about = "Run and demonstrate the senior companion registration workflow",
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
    /// Walk a member through every registration step against an in-memory backend
    Demo(DemoArgs),
    /// Check a birthday against the age-eligibility rule
    Age(AgeArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args).await,
        Command::Age(args) => run_age_check(args),
    }
}

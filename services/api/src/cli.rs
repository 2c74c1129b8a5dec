use crate::demo::{list_contractors, run_demo, ContractorsArgs, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use alloy_dispatch::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Alloy Dispatcher",
    about = "Lead intake and first-responder contractor dispatch",
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
    /// Print the contractor roster, optionally filtered to one service type and zip
    Contractors(ContractorsArgs),
    /// Run an in-memory dispatch walkthrough: one booking, competing replies, fan-out
    Demo(DemoArgs),
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
        Command::Contractors(args) => list_contractors(args),
        Command::Demo(args) => run_demo(args).await,
    }
}

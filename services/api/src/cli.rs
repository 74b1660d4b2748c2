use crate::demo::{run_demo, run_health, run_presets, run_process, DemoArgs, ScenarioArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use interpreter_pool::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Interpreter Pool",
    about = "Run and demonstrate the deferred interpreter assignment pool",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service and the pool scheduler (default command)
    Serve(ServeArgs),
    /// Run one daily pool cycle over the demo roster and print the summary
    Process(ScenarioArgs),
    /// Print the pool health report for the demo roster
    Health(ScenarioArgs),
    /// Simulate daily pool runs over a seeded roster and print the outcome
    Demo(DemoArgs),
    /// Print the weight presets behind each policy mode
    Presets,
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Seed the in-memory store with the demo roster and bookings
    #[arg(long)]
    pub(crate) seed_demo: bool,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Process(args) => run_process(args),
        Command::Health(args) => run_health(args),
        Command::Demo(args) => run_demo(args),
        Command::Presets => {
            run_presets();
            Ok(())
        }
    }
}

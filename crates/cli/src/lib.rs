pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "tradedesk",
    about = "Tradedesk operator CLI",
    long_about = "Operate Tradedesk quote calculations, migrations, rate probes, and config inspection.",
    after_help = "Examples:\n  tradedesk calculate quote.json\n  tradedesk rates --date 2026-03-03\n  tradedesk doctor --json"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to the TOML config file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run the calculation engine over a quote input file and print the result")]
    Calculate {
        #[arg(help = "JSON file with quote variables and per-product overrides")]
        input: PathBuf,
    },
    #[command(about = "Probe rate availability for a date, walking back over non-business days")]
    Rates {
        #[arg(long, help = "Rate date (YYYY-MM-DD), defaults to today")]
        date: Option<chrono::NaiveDate>,
    },
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Validate config and database connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Inspect effective configuration values")]
    Config,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Calculate { input } => commands::calculate::run(cli.config, &input),
        Command::Rates { date } => commands::rates::run(cli.config, date),
        Command::Migrate => commands::migrate::run(cli.config),
        Command::Doctor { json } => commands::doctor::run(cli.config, json),
        Command::Config => commands::config::run(cli.config),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "supportdesk",
    about = "Supportdesk operator CLI",
    long_about = "Operate the support desk escalation engine: migrations, seed data, one-off sweeps, scoped ticket listings, config inspection, and readiness checks.",
    after_help = "Examples:\n  supportdesk doctor --json\n  supportdesk sweep\n  supportdesk tickets --role agent --zone North --name Asha"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic support desk seed dataset and verify it")]
    Seed,
    #[command(about = "Run one escalation sweep and print the sweep report as JSON")]
    Sweep,
    #[command(about = "List the tickets a viewer with the given role, zone and name may see")]
    Tickets {
        #[arg(long, help = "Viewer role: admin, manager, agent or customer")]
        role: String,
        #[arg(long, default_value = "", help = "Viewer zone")]
        zone: String,
        #[arg(long, help = "Viewer display name")]
        name: String,
        #[arg(long, help = "Customer identity linked to the viewer, if any")]
        customer_identity: Option<String>,
    },
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, database connectivity and policy table coverage")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Sweep => commands::sweep::run(),
        Command::Tickets { role, zone, name, customer_identity } => {
            commands::tickets::run(commands::tickets::ViewerArgs {
                role,
                zone,
                name,
                customer_identity,
            })
        }
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

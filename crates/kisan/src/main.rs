//! Kisan - farming advisors on the command line

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{
    advise_command, advisors_command, ask_command, consult_command, init_command, parse_fact,
    sessions_clear_command, sessions_list_command, status_command, FarmerArgs,
};

/// Kisan - farming advisors for your terminal
#[derive(Parser)]
#[command(name = "kisan")]
#[command(about = "Farming advisors with bounded critique/refine loops")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Debug logging (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize config and data directories
    Init,
    /// Show configuration status
    Status,
    /// List the advisor catalogue
    Advisors,
    /// Run every advisor in parallel and print the merged report
    Advise {
        #[command(flatten)]
        farmer: FarmerCli,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run one advisor
    Consult {
        /// Advisor route, e.g. crop_management
        route: String,
        #[command(flatten)]
        farmer: FarmerCli,
        /// Print the advice as JSON
        #[arg(long)]
        json: bool,
    },
    /// Talk to the front desk, which delegates to one advisor per turn
    Ask {
        /// Message to send (interactive when omitted)
        #[arg(short, long)]
        message: Option<String>,
        /// Session ID
        #[arg(short, long, default_value = "default")]
        session: String,
    },
    /// Manage saved conversations
    Sessions {
        #[command(subcommand)]
        action: SessionAction,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    /// List saved conversations
    List,
    /// Delete a saved conversation
    Clear {
        /// Session ID, as given to `ask -s`
        session: String,
    },
}

#[derive(clap::Args)]
struct FarmerCli {
    /// Crop details, e.g. "wheat, 2 hectares"
    #[arg(short, long)]
    crop: String,
    /// Farm location
    #[arg(short, long)]
    location: Option<String>,
    /// Extra fact as KEY=VALUE (repeatable)
    #[arg(short, long = "fact", value_parser = parse_fact)]
    facts: Vec<(String, String)>,
}

impl From<FarmerCli> for FarmerArgs {
    fn from(cli: FarmerCli) -> Self {
        FarmerArgs {
            crop: cli.crop,
            location: cli.location,
            facts: cli.facts,
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Init => init_command().await,
        Commands::Status => status_command().await,
        Commands::Advisors => advisors_command().await,
        Commands::Advise { farmer, json } => advise_command(farmer.into(), json).await,
        Commands::Consult {
            route,
            farmer,
            json,
        } => consult_command(route, farmer.into(), json).await,
        Commands::Ask { message, session } => ask_command(message, session).await,
        Commands::Sessions { action } => match action {
            SessionAction::List => sessions_list_command().await,
            SessionAction::Clear { session } => sessions_clear_command(session).await,
        },
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

//! gpuslot CLI
//!
//! Command-line interface for interacting with the gpuslot daemon.

mod commands;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

/// gpuslot - priority-scored GPU time-slot reservations
#[derive(Parser, Debug)]
#[command(name = "gpuslot")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Daemon API address
    #[arg(long, default_value = "http://localhost:9090", global = true)]
    api: String,

    /// User to act as
    #[arg(short, long, global = true)]
    user: Option<String>,

    /// Act as an administrator
    #[arg(long, global = true)]
    admin: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Request a GPU slot with explicit times and factors
    Reserve {
        /// Resource type (e.g., A100)
        resource_type: String,

        /// Slot start (RFC 3339)
        #[arg(long)]
        start: DateTime<Utc>,

        /// Slot end (RFC 3339)
        #[arg(long)]
        end: DateTime<Utc>,

        /// What the slot is for
        #[arg(long, default_value = "")]
        purpose: String,

        /// JSON file with priority factors (defaults to neutral factors)
        #[arg(long)]
        factors: Option<PathBuf>,

        /// Display name
        #[arg(long)]
        name: Option<String>,
    },

    /// Request a GPU slot in plain language
    Ask {
        /// Request text
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,

        /// Display name
        #[arg(long)]
        name: Option<String>,
    },

    /// List reservations
    Ls {
        /// Only reservations owned by this user
        #[arg(long)]
        owner: Option<String>,

        /// Only reservations in this status
        #[arg(long)]
        status: Option<String>,
    },

    /// Show a reservation
    Show {
        /// Reservation ID
        id: Uuid,
    },

    /// Cancel a reservation
    Cancel {
        /// Reservation ID
        id: Uuid,

        /// Reason recorded on the reservation
        #[arg(long)]
        reason: Option<String>,
    },

    /// Move a reservation to another status (administrators)
    Transition {
        /// Reservation ID
        id: Uuid,

        /// Target status (approved, rejected, active, completed, cancelled)
        status: String,

        /// Reason recorded on the reservation
        #[arg(long)]
        reason: Option<String>,
    },

    /// Show preemption requests waiting for an answer
    Pending,

    /// Answer a preemption request
    Respond {
        /// Preemption request ID
        id: Uuid,

        /// accept or decline
        decision: String,
    },

    /// Score a factor file without reserving anything
    Score {
        /// JSON file with priority factors
        factors: PathBuf,
    },

    /// Show reservable resource types
    Resources,

    /// Show extraction usage
    Usage,

    /// Show system status
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let client = commands::ApiClient::new(&cli.api);
    let identity = commands::Identity::new(cli.user, cli.admin);

    match cli.command {
        Commands::Reserve {
            resource_type,
            start,
            end,
            purpose,
            factors,
            name,
        } => {
            let request = commands::ReserveArgs {
                resource_type,
                start,
                end,
                purpose,
                factors,
                name,
            };
            commands::reserve(&client, &identity, request).await?;
        }
        Commands::Ask { text, name } => {
            commands::ask(&client, &identity, text.join(" "), name).await?;
        }
        Commands::Ls { owner, status } => {
            commands::ls(&client, owner, status).await?;
        }
        Commands::Show { id } => {
            commands::show(&client, id).await?;
        }
        Commands::Cancel { id, reason } => {
            commands::cancel(&client, &identity, id, reason).await?;
        }
        Commands::Transition { id, status, reason } => {
            commands::transition(&client, &identity, id, status, reason).await?;
        }
        Commands::Pending => {
            commands::pending(&client, &identity).await?;
        }
        Commands::Respond { id, decision } => {
            commands::respond(&client, &identity, id, &decision).await?;
        }
        Commands::Score { factors } => {
            commands::score(&client, &factors).await?;
        }
        Commands::Resources => {
            commands::resources(&client).await?;
        }
        Commands::Usage => {
            commands::usage(&client).await?;
        }
        Commands::Status => {
            commands::status(&client).await?;
        }
    }

    Ok(())
}

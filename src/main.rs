use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "trailhead")]
#[command(about = "Progression and gamification engine: unlocks, completions, XP, levels and streaks")]
#[command(version)]
struct Cli {
    /// Path to the progress database (defaults to settings.database_path or ~/.trailhead/progress.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Path to the config file (defaults to ~/.trailhead/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },

    /// Manage the authored content tree
    Content {
        #[command(subcommand)]
        action: ContentAction,
    },

    /// Record a completion for a learner and credit its XP
    Complete {
        learner: String,
        node: String,

        /// Response payload as JSON, e.g. '{"kind":"self-assessment","ratings":[5,5]}'
        #[arg(long)]
        payload: Option<String>,

        /// IANA timezone for this activity (overrides the learner's stored zone)
        #[arg(long)]
        timezone: Option<String>,
    },

    /// Show a learner's progress tree under a zone or chapter
    Progress { learner: String, scope: String },

    /// Show a learner's XP, level and streak
    State { learner: String },

    /// Set a learner's IANA timezone
    Timezone { learner: String, timezone: String },

    /// Apply a manual XP adjustment (admin only)
    Adjust {
        learner: String,

        /// Signed XP delta
        #[arg(allow_negative_numbers = true)]
        delta: i64,

        #[arg(long)]
        reason: String,

        /// Actor performing the adjustment
        #[arg(long)]
        actor: String,
    },

    /// Compare cached XP totals with the ledger
    Drift {
        /// Learner to check (all learners if omitted)
        learner: Option<String>,

        /// Keep checking on an interval until interrupted
        #[arg(long)]
        watch: bool,

        /// Seconds between checks in watch mode
        #[arg(long, default_value_t = 300)]
        interval: u64,
    },

    /// Recompute a learner's cached total and level from the ledger
    Rebuild { learner: String },
}

#[derive(Subcommand)]
enum ContentAction {
    /// Replace the content tree with a TOML catalog file
    Import { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let ctx = cli::Context {
        db: cli.db,
        config: cli.config,
        json: cli.json,
    };

    match cli.command {
        Commands::Init { force } => {
            cli::init::init_command(ctx.config.as_deref(), force).await?;
        }
        Commands::Content {
            action: ContentAction::Import { file },
        } => {
            cli::content::import_command(&ctx, &file).await?;
        }
        Commands::Complete {
            learner,
            node,
            payload,
            timezone,
        } => {
            cli::complete::complete_command(&ctx, &learner, &node, payload.as_deref(), timezone.as_deref())
                .await?;
        }
        Commands::Progress { learner, scope } => {
            cli::progress::progress_command(&ctx, &learner, &scope).await?;
        }
        Commands::State { learner } => {
            cli::state::state_command(&ctx, &learner).await?;
        }
        Commands::Timezone { learner, timezone } => {
            cli::state::timezone_command(&ctx, &learner, &timezone).await?;
        }
        Commands::Adjust {
            learner,
            delta,
            reason,
            actor,
        } => {
            cli::adjust::adjust_command(&ctx, &learner, delta, &reason, &actor).await?;
        }
        Commands::Drift {
            learner,
            watch,
            interval,
        } => {
            cli::drift::drift_command(&ctx, learner.as_deref(), watch, interval).await?;
        }
        Commands::Rebuild { learner } => {
            cli::drift::rebuild_command(&ctx, &learner).await?;
        }
    }

    Ok(())
}

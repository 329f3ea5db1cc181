use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use harvest_core::Direction;

mod commands;
mod paths;
mod ui;

#[derive(Parser)]
#[command(name = "harvest")]
#[command(about = "Collect chat channels and archive message histories")]
#[command(version)]
struct Cli {
    /// Data directory (defaults to HARVEST_DATA_DIR, then the platform data dir)
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Show debug logs
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover every member's channels into one deduplicated list
    Collect {
        /// Only process the first N members
        #[arg(long, value_name = "N")]
        max_members: Option<usize>,

        /// Ignore an existing checkpoint and start over
        #[arg(long)]
        fresh: bool,

        /// Move a corrupt checkpoint aside instead of failing
        #[arg(long)]
        discard_corrupt: bool,
    },

    /// Archive the message history of one chat
    Archive {
        #[arg(value_name = "CHAT_ID")]
        chat_id: String,

        /// Start from this message instead of the newest one
        #[arg(long, value_name = "MESSAGE_ID")]
        from: Option<String>,

        /// Traversal direction: before, after or around
        #[arg(long)]
        direction: Option<Direction>,

        /// Stop after N messages
        #[arg(long, value_name = "N")]
        max: Option<usize>,
    },

    /// Archive every chat found by `collect`
    ArchiveAll {
        /// Stop each chat after N messages
        #[arg(long, value_name = "N")]
        max: Option<usize>,

        /// Chats archived in parallel
        #[arg(long, value_name = "N")]
        concurrency: Option<usize>,
    },

    /// Resolve author names in an archive
    Enrich {
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,

        /// Member directory (defaults to members.json from `collect`)
        #[arg(long, value_name = "FILE")]
        directory: Option<PathBuf>,
    },

    /// Inspect or remove the collection checkpoint
    Checkpoint {
        #[command(subcommand)]
        command: CheckpointCommand,
    },

    /// List the known API endpoints
    Endpoints,

    /// Call one endpoint and save the raw response
    Fetch {
        #[arg(value_name = "ENDPOINT")]
        name: String,

        /// Parameter as key=value; repeatable
        #[arg(short = 'p', long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
    },
}

#[derive(Subcommand)]
enum CheckpointCommand {
    /// Show where the next run would resume
    Show,
    /// Delete the checkpoint
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    let mut filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());
    if !cli.verbose {
        filter = filter.add_directive("harvest_core=info".parse()?);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let ctx = commands::Context::load(paths::data_dir(cli.data_dir))?;

    match cli.command {
        Commands::Collect {
            max_members,
            fresh,
            discard_corrupt,
        } => commands::collect::run(&ctx, max_members, fresh, discard_corrupt).await,
        Commands::Archive {
            chat_id,
            from,
            direction,
            max,
        } => commands::archive::run(&ctx, &chat_id, from.as_deref(), direction, max).await,
        Commands::ArchiveAll { max, concurrency } => commands::archive::run_all(&ctx, max, concurrency).await,
        Commands::Enrich { archive, directory } => commands::enrich::run(&ctx, &archive, directory),
        Commands::Checkpoint { command } => match command {
            CheckpointCommand::Show => commands::checkpoint::show(&ctx),
            CheckpointCommand::Clear => commands::checkpoint::clear(&ctx),
        },
        Commands::Endpoints => commands::endpoints::list(&ctx),
        Commands::Fetch { name, params } => commands::endpoints::fetch(&ctx, &name, &params).await,
    }
}

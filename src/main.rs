use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "journald-cwl")]
#[command(about = "Ships systemd journal entries to CloudWatch Logs", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    Run,
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    Cursor {
        #[command(subcommand)]
        action: CursorAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Init {
        #[arg(long)]
        stdout: bool,
    },
}

#[derive(Subcommand)]
enum CursorAction {
    /// Print the stored checkpoint cursor
    Show,
    /// Remove the stored checkpoint
    Reset,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "journald_cwl=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    let result = match cli.command {
        Some(Commands::Run) | None => journald_cwl::cli::run::run(cli.config.clone()).await,
        Some(Commands::Config { action }) => match action {
            ConfigAction::Init { stdout } => journald_cwl::cli::config::init(stdout),
        },
        Some(Commands::Cursor { action }) => match action {
            CursorAction::Show => journald_cwl::cli::cursor::show(config_path).await,
            CursorAction::Reset => journald_cwl::cli::cursor::reset(config_path).await,
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Exiting with error");
            ExitCode::FAILURE
        }
    }
}

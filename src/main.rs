use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use expense_tracker::audit::AuditLogger;
use expense_tracker::cli::{
    handle_expense_command, handle_login, handle_logout, handle_period_command,
    handle_summary_command, handle_whoami, open_session, ExpenseCommands, PeriodCommands,
};
use expense_tracker::config::{Settings, TrackerPaths};
use expense_tracker::display::DisplayOptions;
use expense_tracker::logging;

#[derive(Parser)]
#[command(
    name = "expense-tracker",
    version,
    about = "Track shared expenses against budget periods",
    long_about = "Command-line client for the expense tracker backend. Records expenses, \
                  schedules budget periods and shows how much of each period is left. \
                  Use --offline to work against local JSON tables instead."
)]
struct Cli {
    /// Use the local tables under the data directory instead of the backend
    #[arg(long, global = true, env = "EXPENSE_TRACKER_OFFLINE")]
    offline: bool,

    /// Verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with the configured identity provider
    Login,

    /// Forget the saved session
    Logout,

    /// Show the signed-in user and account
    Whoami,

    /// Expense commands
    #[command(subcommand, alias = "exp")]
    Expense(ExpenseCommands),

    /// Expense period commands
    #[command(subcommand)]
    Period(PeriodCommands),

    /// Show period summaries
    Summary {
        /// Only the period containing today
        #[arg(short, long)]
        current: bool,
    },

    /// Show recent audit log entries
    Audit {
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show current configuration and paths
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let paths = TrackerPaths::new()?;
    let mut settings = Settings::load_or_create(&paths)?;
    if cli.offline {
        settings.offline = true;
    }

    let command = match cli.command {
        Some(Commands::Config) => {
            print_config(&paths, &settings);
            return Ok(());
        }
        Some(Commands::Audit { limit }) => {
            let logger = AuditLogger::new(paths.audit_log());
            let entries = logger.read_recent(limit)?;
            if entries.is_empty() {
                println!("No audit entries yet.");
            }
            for entry in entries {
                println!("{}", entry.format_human_readable());
            }
            return Ok(());
        }
        Some(command) => command,
        None => {
            println!("expense-tracker - shared expenses against budget periods");
            println!();
            println!("Run 'expense-tracker --help' for usage information.");
            return Ok(());
        }
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(command, &paths, &settings))
}

async fn run(command: Commands, paths: &TrackerPaths, settings: &Settings) -> Result<()> {
    let session = Arc::new(open_session(paths, settings)?);
    let opts = DisplayOptions::from_settings(settings);

    {
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                session.close();
            }
        });
    }

    match command {
        Commands::Login => handle_login(&session).await?,
        Commands::Logout => handle_logout(&session)?,
        Commands::Whoami => handle_whoami(&session).await?,
        Commands::Expense(cmd) => handle_expense_command(&session, &opts, cmd).await?,
        Commands::Period(cmd) => handle_period_command(&session, &opts, cmd).await?,
        Commands::Summary { current } => handle_summary_command(&session, &opts, current).await?,
        Commands::Audit { .. } | Commands::Config => {}
    }

    Ok(())
}

fn print_config(paths: &TrackerPaths, settings: &Settings) {
    println!("Expense Tracker Configuration");
    println!("=============================");
    println!("Base directory:  {}", paths.base_dir().display());
    println!("Settings file:   {}", paths.settings_file().display());
    println!("Session file:    {}", paths.session_file().display());
    println!("Audit log:       {}", paths.audit_log().display());
    println!("Data directory:  {}", paths.data_dir().display());
    println!();
    println!("Settings:");
    println!("  Backend:          {}", settings.backend_root());
    println!("  Identity provider: {}", settings.auth_provider);
    println!("  Request timeout:  {}s", settings.request_timeout_secs);
    println!(
        "  Mode:             {}",
        if settings.offline { "offline" } else { "online" }
    );
    println!("  Audit log:        {}", if settings.audit_enabled { "on" } else { "off" });
}

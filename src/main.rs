use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use famledger::cli::{
    handle_budget_command, handle_expense_command, handle_family_command,
    handle_recurring_command, handle_user_command, BudgetCommands, CliContext, ExpenseCommands,
    FamilyCommands, RecurringCommands, UserCommands,
};
use famledger::config::{LedgerPaths, Settings};
use famledger::notify::{CollectingNotifier, LogNotifier, Notifier};
use famledger::storage::Storage;

/// Environment variable holding the log filter
const LOG_ENV: &str = "FAMLEDGER_LOG";

#[derive(Parser)]
#[command(
    name = "famledger",
    version,
    about = "Family and personal expense tracking",
    long_about = "famledger tracks personal and shared family expenses, turns \
                  recurring expenses into real ones on schedule and keeps \
                  category budgets up to date."
)]
struct Cli {
    /// Acting user (id, short id or email)
    #[arg(short, long, global = true, env = "FAMLEDGER_USER")]
    user: Option<String>,

    /// Log notifications instead of printing them
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// User management commands
    #[command(subcommand)]
    User(UserCommands),

    /// Family management commands
    #[command(subcommand)]
    Family(FamilyCommands),

    /// Expense commands
    #[command(subcommand, alias = "exp")]
    Expense(ExpenseCommands),

    /// Budget commands
    #[command(subcommand)]
    Budget(BudgetCommands),

    /// Recurring expense commands
    #[command(subcommand, alias = "rec")]
    Recurring(RecurringCommands),

    /// Show recent changes from the audit log
    History {
        /// Number of entries to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// Initialize the data directory
    Init,

    /// Show current configuration and paths
    Config,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let paths = LedgerPaths::new()?;
    let settings = Settings::load_or_create(&paths)?;

    let storage = Storage::new(paths.clone())?;
    storage.load_all()?;

    let collector = CollectingNotifier::new();
    let log_notifier = LogNotifier;
    let notifier: &dyn Notifier = if cli.quiet { &log_notifier } else { &collector };

    let ctx = CliContext {
        storage: &storage,
        settings: &settings,
        notifier,
        user: cli.user,
    };

    let outcome = match cli.command {
        Some(Commands::User(cmd)) => handle_user_command(&ctx, cmd),
        Some(Commands::Family(cmd)) => handle_family_command(&ctx, cmd),
        Some(Commands::Expense(cmd)) => handle_expense_command(&ctx, cmd),
        Some(Commands::Budget(cmd)) => handle_budget_command(&ctx, cmd),
        Some(Commands::Recurring(cmd)) => handle_recurring_command(&ctx, cmd),
        Some(Commands::History { limit }) => storage.audit().read_recent(limit).map(|entries| {
            if entries.is_empty() {
                println!("No changes recorded yet.");
            }
            for entry in entries {
                println!("{}", entry.format_human_readable());
            }
        }),
        Some(Commands::Init) => {
            println!("Initializing famledger at: {}", paths.base_dir().display());
            paths.ensure_directories()?;
            storage.save_all()?;
            settings.save(&paths)?;
            println!("Initialization complete!");
            println!();
            println!("Next: famledger user add <name> <email>");
            Ok(())
        }
        Some(Commands::Config) => {
            println!("famledger Configuration");
            println!("=======================");
            println!("Base directory: {}", paths.base_dir().display());
            println!("Data directory: {}", paths.data_dir().display());
            println!("Audit log:      {}", paths.audit_log().display());
            println!("Initialized:    {}", storage.is_initialized());
            println!();
            println!("Settings:");
            println!("  Base currency:       {}", settings.currency.base);
            println!("  Known currencies:    {}", settings.currency.currencies.len());
            println!("  Alert threshold:     {}%", settings.default_alert_threshold);
            println!("  Budget period:       {}", settings.default_budget_period);
            println!("  Preview window:      {} days", settings.preview_days);
            println!("  Date format:         {}", settings.date_format);
            Ok(())
        }
        None => {
            println!("famledger - family and personal expense tracking");
            println!();
            println!("Run 'famledger --help' for usage information.");
            Ok(())
        }
    };

    for notification in collector.take() {
        println!("! {}", notification);
    }

    outcome?;
    Ok(())
}

use clap::{Parser, Subcommand};

mod commands;
mod common;

#[derive(Parser)]
#[command(name = "pulsecheck-cli", version, about = "Pulsecheck CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a check-in for a user
    Checkin(commands::checkin::CheckinArgs),
    /// Show user status or the alert summary
    Status(commands::status::StatusArgs),
    /// Show the activity feed
    Activity(commands::activity::ActivityArgs),
    /// Append a conversation activity
    Conversation(commands::conversation::ConversationArgs),
    /// Run the escalation sweep, once or as a loop
    Sweep(commands::sweep::SweepArgs),
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing();
    let result = match cli.command {
        Commands::Checkin(args) => commands::checkin::run(args),
        Commands::Status(args) => commands::status::run(args),
        Commands::Activity(args) => commands::activity::run(args),
        Commands::Conversation(args) => commands::conversation::run(args),
        Commands::Sweep(args) => commands::sweep::run(args),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

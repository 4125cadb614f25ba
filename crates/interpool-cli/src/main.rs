use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};

mod commands;

#[derive(Parser)]
#[command(name = "interpool", version)]
#[command(about = "Interpreter auto-assignment engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decide one booking: assign, pool, or escalate
    Run {
        /// Booking identifier
        booking_id: i64,
    },
    /// One orchestrator pass over the pool
    Tick,
    /// Pool inspection and draining
    Pool {
        #[command(subcommand)]
        action: commands::pool::PoolAction,
    },
    /// Assignment policy management
    Policy {
        #[command(subcommand)]
        action: commands::policy::PolicyAction,
    },
    /// Interpreter roster bookkeeping
    Roster {
        #[command(subcommand)]
        action: commands::roster::RosterAction,
    },
    /// Generate shell completion script
    Complete {
        /// Shell type (bash, zsh, fish, elvish, powershell)
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run { booking_id } => commands::run::run(booking_id),
        Commands::Tick => commands::pool::tick(),
        Commands::Pool { action } => commands::pool::run(action),
        Commands::Policy { action } => commands::policy::run(action),
        Commands::Roster { action } => commands::roster::run(action),
        Commands::Complete { shell } => {
            print_completions(shell);
            Ok(0)
        }
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}

/// Generate shell completion script
fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "interpool", &mut std::io::stdout());
}

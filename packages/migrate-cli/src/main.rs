//! Schema migration toolkit for serverless YDB.
//!
//! Three flows wrap the external `yc`, `ydb`, and `goose` CLIs:
//! - `create` inspects live schema and writes a templated migration file
//! - `apply` partitions a file by database path and runs goose forward
//! - `rollback` drives the same partitions backward

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;

mod cmd;
mod cmd_builder;
mod config;
mod context;
mod goose;
mod migration;
mod partition;
mod picker;
mod scheme;
mod signature;
mod token;
mod yc;

use context::AppContext;
use picker::TerminalPicker;

#[derive(Parser)]
#[command(name = "ydbmig")]
#[command(about = "Schema migration toolkit for serverless YDB")]
#[command(version)]
struct Cli {
    /// Run in quiet mode (non-interactive)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Working root (defaults to the current directory)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect live schema and generate a templated migration file
    Create {
        /// Database name, id, or path (skips the picker)
        #[arg(long)]
        database: Option<String>,

        /// Table name or absolute path (skips the picker)
        #[arg(long)]
        table: Option<String>,

        /// Migration name used in the filename
        #[arg(long)]
        name: Option<String>,

        /// Up statement template; `{table}` expands to the table path
        #[arg(long)]
        up: Option<String>,

        /// Down statement template; `{table}` expands to the table path
        #[arg(long)]
        down: Option<String>,
    },

    /// Partition a migration file by database and run goose up-to
    Apply {
        /// Migration file (skips the picker)
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Partition a migration file by database and run goose down-to
    Rollback {
        /// Migration file (skips the picker)
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Check external tools, token, and migrations directory
    Doctor,

    /// Read or refresh the cached IAM token
    Token {
        /// Mint a fresh token even if one is cached
        #[arg(long)]
        refresh: bool,
    },

    /// Show terminal color capabilities
    #[command(hide = true)]
    Colors,
}

fn main() -> ExitCode {
    // Load environment variables
    let _ = dotenvy::dotenv();
    config::apply_ansi_preference();

    if let Err(e) = ctrlc::set_handler(|| {
        let _ = console::Term::stderr().show_cursor();
        eprintln!();
        eprintln!("Cancelled.");
        std::process::exit(1);
    }) {
        eprintln!("Warning: failed to install Ctrl-C handler: {}", e);
    }

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let ctx = AppContext::new(cli.dir, cli.quiet)?;
    let picker = TerminalPicker::new();

    match cli.command {
        Some(Commands::Create {
            database,
            table,
            name,
            up,
            down,
        }) => cmd::create::run(
            &ctx,
            &picker,
            cmd::create::CreateArgs {
                database,
                table,
                name,
                up,
                down,
            },
        ),
        Some(Commands::Apply { file }) => {
            cmd::apply::run(&ctx, &picker, cmd::apply::ApplyArgs { file })
        }
        Some(Commands::Rollback { file }) => {
            cmd::rollback::run(&ctx, &picker, cmd::rollback::RollbackArgs { file })
        }
        Some(Commands::Doctor) => cmd::doctor(&ctx),
        Some(Commands::Token { refresh }) => cmd::token(&ctx, refresh),
        Some(Commands::Colors) => cmd::colors::run(),
        None => interactive_menu(&ctx, &picker),
    }
}

fn interactive_menu(ctx: &AppContext, picker: &TerminalPicker) -> Result<ExitCode> {
    print_banner();

    let items = vec![
        "📝 Create migration",
        "🚀 Apply migration",
        "⏪ Roll back migration",
        "🩺 Doctor",
        "🛑 Exit",
    ];

    loop {
        println!();
        let choice = dialoguer::Select::with_theme(&ctx.theme())
            .with_prompt("What would you like to do?")
            .items(&items)
            .default(0)
            .interact_opt()?;

        // per-command exit codes are ignored here; the menu keeps running
        match choice {
            Some(0) => {
                let _ = cmd::create::run(ctx, picker, Default::default())?;
            }
            Some(1) => {
                let _ = cmd::apply::run(ctx, picker, Default::default())?;
            }
            Some(2) => {
                let _ = cmd::rollback::run(ctx, picker, Default::default())?;
            }
            Some(3) => {
                let _ = cmd::doctor(ctx)?;
            }
            _ => {
                println!("{}", "👋 Goodbye!".bright_blue());
                return Ok(ExitCode::SUCCESS);
            }
        }
    }
}

fn print_banner() {
    println!("{}", "╔══════════════════════════════════════╗".bright_cyan());
    println!("{}", "║         YDB Migration Toolkit        ║".bright_cyan());
    println!("{}", "╚══════════════════════════════════════╝".bright_cyan());
}

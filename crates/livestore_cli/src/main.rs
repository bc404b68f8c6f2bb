//! livestore CLI
//!
//! Command-line front end for the notes store.
//!
//! # Commands
//!
//! - `demo` - Add a note, reject an invalid one, list every user's notes
//! - `users` - List users
//! - `notes` - Show one user's notes
//! - `add-user` - Add a user
//! - `add-note` - Add a note to a user
//! - `stats` - Display store statistics

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// livestore notes tool.
#[derive(Parser)]
#[command(name = "livestore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long, default_value = "./storage")]
    path: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the demonstration
    Demo,

    /// List users
    Users {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show the notes of a user
    Notes {
        /// Name of the user
        user: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Add a user
    AddUser {
        /// Login name
        name: String,

        /// Password
        password: String,

        /// Grant admin permissions
        #[arg(short, long)]
        admin: bool,
    },

    /// Add a note to a user
    AddNote {
        /// Name of the user owning the note
        user: String,

        /// Title of the note
        title: String,

        /// Body text
        content: String,
    },

    /// Display store statistics
    Stats {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Demo => commands::demo::run(&cli.path)?,
        Commands::Users { format } => commands::users::run(&cli.path, &format)?,
        Commands::Notes { user, format } => commands::notes::run(&cli.path, &user, &format)?,
        Commands::AddUser {
            name,
            password,
            admin,
        } => commands::add::user(&cli.path, &name, &password, admin)?,
        Commands::AddNote {
            user,
            title,
            content,
        } => commands::add::note(&cli.path, &user, &title, &content)?,
        Commands::Stats { format } => commands::stats::run(&cli.path, &format)?,
        Commands::Version => {
            println!("livestore CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("livestore core v{}", livestore_core::VERSION);
        }
    }

    Ok(())
}

//! # Lakehouse Adapter CLI (`lake`)
//!
//! The `lake` binary is the primary interface for the Lakehouse Adapter. It
//! provides commands for ingesting documents, inspecting and querying tables,
//! asking natural-language questions, exporting data, and starting the HTTP
//! server.
//!
//! ## Usage
//!
//! ```bash
//! lake --config ./config/lake.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lake init` | Create the session's SQLite lakehouse file |
//! | `lake ingest <file>` | Extract a document with Gemini and load it |
//! | `lake tables` | List tables with row counts |
//! | `lake describe <table>` | Show a table's columns and types |
//! | `lake query "<sql>"` | Run a read-only SQL query |
//! | `lake ask "<question>"` | Answer a natural-language question via SQL |
//! | `lake export <table>` | Export a table as CSV |
//! | `lake drop <table>` | Drop a table (or `--all`) |
//! | `lake session list` | List known sessions |
//! | `lake serve` | Start the HTTP API server |
//!
//! ## Examples
//!
//! ```bash
//! # Ingest a receipt photo into the default session
//! lake ingest receipt.jpg --auto-fix
//!
//! # Ingest a CSV into a named table, reviewing issues without writing
//! lake ingest sales.csv --table sales --dry-run
//!
//! # Ask a question over specific tables
//! lake ask "top items by revenue" --table sales --table returns
//!
//! # Export to a file
//! lake export sales --output sales.csv
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use lakehouse_adapter::{analyst, config, ingest, manage, server};

/// Lakehouse Adapter CLI — turn messy documents into queryable tables with
/// an LLM extractor and an embedded SQLite lakehouse.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/lake.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "lake",
    about = "Lakehouse Adapter — LLM-powered document ingestion and analysis over SQLite",
    version,
    long_about = "Lakehouse Adapter extracts structured rows from documents (images, CSV, JSON, \
    plain text) using a Gemini model, validates and optionally auto-fixes the data, persists it \
    into evolvable SQLite tables with a raw-JSON shadow column, and answers natural-language \
    questions via model-generated SQL."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/lake.toml`. Model, database, and server
    /// settings are read from this file.
    #[arg(long, global = true, default_value = "./config/lake.toml")]
    config: PathBuf,

    /// Session to operate on. Each session has its own lakehouse file.
    #[arg(long, global = true, default_value = "default")]
    session: String,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Create the session's lakehouse database.
    ///
    /// Creates the data directory and the session's SQLite file. This
    /// command is idempotent.
    Init,

    /// Extract a document and load it into the lakehouse.
    ///
    /// Sends the document to the configured Gemini model for schema
    /// inference and row extraction, reports data quality issues, and
    /// loads the rows into a table. Existing tables evolve to fit new
    /// columns; previously loaded rows are preserved.
    Ingest {
        /// Path to the document (image, CSV, JSON, or plain text).
        file: PathBuf,

        /// Override the model's proposed table name.
        #[arg(long)]
        table: Option<String>,

        /// Replace the extracted rows with a hand-edited JSON array before
        /// loading. Parsed structurally; the content is trusted as-is.
        #[arg(long)]
        rows_file: Option<PathBuf>,

        /// Ask the model to repair detected issues before loading.
        #[arg(long)]
        auto_fix: bool,

        /// Load even if unresolved issues remain.
        #[arg(long)]
        force: bool,

        /// Extract and report without writing to the database.
        #[arg(long)]
        dry_run: bool,
    },

    /// List tables with row counts.
    Tables,

    /// Show a table's columns and types.
    Describe {
        /// Table name.
        table: String,
    },

    /// Drop a table, or every table with `--all`.
    Drop {
        /// Table name.
        table: Option<String>,

        /// Drop every table in the session.
        #[arg(long)]
        all: bool,
    },

    /// Run a SQL query and print the result.
    Query {
        /// The SQL statement.
        sql: String,
    },

    /// Answer a natural-language question with model-generated SQL.
    ///
    /// Sends the question and the schemas of the selected tables to the
    /// model, runs the SQL it produces, and prints the result along with
    /// a chart suggestion when the shape of the data supports one.
    Ask {
        /// The question, in plain language.
        question: String,

        /// Restrict the question to specific tables (repeatable).
        /// Defaults to every table in the session.
        #[arg(long = "table")]
        tables: Vec<String>,
    },

    /// Export a table as CSV.
    Export {
        /// Table name.
        table: String,

        /// Output file. Prints to stdout when omitted.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Manage sessions.
    ///
    /// Each session is an isolated lakehouse file under the configured
    /// data directory.
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Start the HTTP API server.
    ///
    /// Binds to the address configured in `[server].bind` and serves the
    /// ingest, query, and ask endpoints.
    Serve,
}

/// Session management subcommands.
#[derive(Subcommand)]
enum SessionAction {
    /// List sessions found in the data directory.
    List,

    /// Print a fresh session identifier.
    New,

    /// Close the session and delete its lakehouse file.
    Close,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Session id generation needs no config
    if let Commands::Session {
        action: SessionAction::New,
    } = &cli.command
    {
        println!("{}", lakehouse_adapter::session::SessionManager::new_session_id());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            manage::run_init(&cfg, &cli.session).await?;
        }
        Commands::Ingest {
            file,
            table,
            rows_file,
            auto_fix,
            force,
            dry_run,
        } => {
            ingest::run_ingest(
                &cfg,
                &cli.session,
                &file,
                table,
                rows_file.as_deref(),
                auto_fix,
                force,
                dry_run,
            )
            .await?;
        }
        Commands::Tables => {
            manage::run_tables(&cfg, &cli.session).await?;
        }
        Commands::Describe { table } => {
            manage::run_describe(&cfg, &cli.session, &table).await?;
        }
        Commands::Drop { table, all } => {
            manage::run_drop(&cfg, &cli.session, table.as_deref(), all).await?;
        }
        Commands::Query { sql } => {
            manage::run_query(&cfg, &cli.session, &sql).await?;
        }
        Commands::Ask { question, tables } => {
            analyst::run_ask(&cfg, &cli.session, &question, &tables).await?;
        }
        Commands::Export { table, output } => {
            manage::run_export(&cfg, &cli.session, &table, output.as_deref()).await?;
        }
        Commands::Session { action } => match action {
            SessionAction::List => {
                manage::run_session_list(&cfg)?;
            }
            SessionAction::Close => {
                manage::run_session_close(&cfg, &cli.session).await?;
            }
            SessionAction::New => {
                // Handled above (before config loading)
                unreachable!()
            }
        },
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

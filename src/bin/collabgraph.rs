//! Collabgraph CLI — load scraper JSON exports into the graph database.
//!
//! Usage:
//!   collabgraph load <files...> [--db path]
//!   collabgraph stats [--db path]

use clap::{Parser, Subcommand};
use collabgraph::{GraphLoader, OpenStore, SqliteStore};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "collabgraph",
    version,
    about = "Heterogeneous-schema ingestion for collaboration graphs"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load one or more scraper JSON files into the graph
    Load {
        /// JSON files to ingest, in order
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Path to SQLite database file
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Print per-table row counts
    Stats {
        /// Path to SQLite database file
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

/// Get the default database path (~/.local/share/collabgraph/collabgraph.db)
fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    data_dir.join("collabgraph").join("collabgraph.db")
}

fn open_store(db: Option<PathBuf>) -> Result<SqliteStore, String> {
    let db_path = db.unwrap_or_else(default_db_path);
    SqliteStore::open(&db_path).map_err(|e| format!("failed to open database: {}", e))
}

fn cmd_load(store: &SqliteStore, files: &[PathBuf]) -> i32 {
    let mut loader = GraphLoader::new(store);
    for file in files {
        let text = match std::fs::read_to_string(file) {
            Ok(text) => text,
            Err(e) => {
                eprintln!("Error: cannot read '{}': {}", file.display(), e);
                return 1;
            }
        };
        let doc: serde_json::Value = match serde_json::from_str(&text) {
            Ok(doc) => doc,
            Err(e) => {
                eprintln!("Error: '{}' is not valid JSON: {}", file.display(), e);
                return 1;
            }
        };
        // Only a connection failure surfaces here; per-document problems
        // land in the report.
        if let Err(e) = loader.load_document(&doc) {
            eprintln!("Error: {}", e);
            return 1;
        }
        println!("Processed {}", file.display());
    }
    match loader.finish() {
        Ok(report) => {
            println!("{}", report);
            if report.documents_failed > 0 {
                1
            } else {
                0
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_stats(store: &SqliteStore) -> i32 {
    use collabgraph::Store;
    match store.row_counts() {
        Ok(counts) => {
            println!("{:<16}  {:>8}", "TABLE", "ROWS");
            println!("{}", "-".repeat(26));
            for (table, count) in counts {
                println!("{:<16}  {:>8}", table, count);
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let code = match cli.command {
        Commands::Load { files, db } => match open_store(db) {
            Ok(store) => cmd_load(&store, &files),
            Err(e) => {
                eprintln!("Error: {}", e);
                1
            }
        },
        Commands::Stats { db } => match open_store(db) {
            Ok(store) => cmd_stats(&store),
            Err(e) => {
                eprintln!("Error: {}", e);
                1
            }
        },
    };
    std::process::exit(code);
}

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "pgdrift")]
#[command(about = "Extract row-level changes from Postgres")]
#[command(version)]
pub struct Cli {
    /// Path to pgdrift.toml config file
    #[arg(short, long, global = true, default_value = "pgdrift.toml")]
    pub config: PathBuf,

    /// Environment to load (loads .env.{ENV} instead of .env)
    #[arg(short, long, global = true)]
    pub env: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Poll the configured tables and print changed rows as JSON lines
    Poll {
        /// Only poll these tables (defaults to every configured table)
        #[arg(long = "table")]
        tables: Vec<String>,
    },

    /// Stream changes over logical replication and print them as JSON lines
    Replicate {
        /// Replication slot name
        #[arg(long, default_value = "pgdrift")]
        slot: String,

        /// Publication name for logical replication
        #[arg(long, default_value = "pgdrift_pub")]
        publication: String,

        /// Create the replication slot if it doesn't exist
        #[arg(long)]
        create_slot: bool,

        /// Tables to publish (defaults to every configured table)
        #[arg(long = "table")]
        tables: Vec<String>,
    },

    /// Decode one hex-encoded pgoutput message and print it as JSON
    Decode {
        /// Message bytes as hex, e.g. 42000000...
        hex: String,
    },
}

//! Command line arguments

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use uuid::Uuid;

/// Command line arguments for the confstore host
#[derive(Debug, Parser)]
#[command(name = "confstore", version, about = "Multi-tenant configuration entry storage")]
pub struct Cli {
    /// Configuration file; missing files are ignored
    #[arg(short = 'c', long = "config", default_value = "conf/application.yml")]
    pub config: PathBuf,

    /// Storage url, overriding `storage.url`
    #[arg(long = "db-url", env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Tenant whose namespace the command operates on
    #[arg(short = 't', long = "tenant", env = "CONFSTORE_TENANT")]
    pub tenant: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Provision the tenant namespace
    Bootstrap,
    /// Check that the tenant's storage answers
    Health,
    /// Import entries from a JSON file in one transaction
    Import {
        file: PathBuf,
        /// Acting user recorded in entry metadata
        #[arg(long = "user")]
        user: Option<Uuid>,
    },
    /// Print one entry
    Get { id: String },
    /// Search entries
    Search {
        #[arg(long)]
        module: Option<String>,
        #[arg(long = "config-name")]
        config_name: Option<String>,
        #[arg(long)]
        code: Option<String>,
        #[arg(long, default_value_t = 0)]
        offset: u64,
        #[arg(long, default_value_t = 10)]
        limit: u64,
    },
    /// Delete one entry
    Delete { id: String },
    /// Store a query result as a cache table
    Materialize { name: String, query: String },
    /// Drop a cache table
    Evict { name: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_materialize() {
        let cli = Cli::try_parse_from([
            "confstore",
            "--tenant",
            "harvard",
            "materialize",
            "mytablecache",
            "SELECT * FROM config_data",
        ])
        .unwrap();
        assert_eq!(cli.tenant, "harvard");
        assert_eq!(cli.config, PathBuf::from("conf/application.yml"));
        match cli.command {
            Command::Materialize { name, query } => {
                assert_eq!(name, "mytablecache");
                assert_eq!(query, "SELECT * FROM config_data");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_search_defaults() {
        let cli = Cli::try_parse_from([
            "confstore",
            "-t",
            "diku",
            "search",
            "--module",
            "CIRCULATION",
        ])
        .unwrap();
        match cli.command {
            Command::Search {
                module,
                offset,
                limit,
                ..
            } => {
                assert_eq!(module.as_deref(), Some("CIRCULATION"));
                assert_eq!(offset, 0);
                assert_eq!(limit, 10);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_import_user_must_be_uuid() {
        assert!(
            Cli::try_parse_from([
                "confstore",
                "-t",
                "diku",
                "import",
                "entries.json",
                "--user",
                "not-a-uuid",
            ])
            .is_err()
        );
    }
}

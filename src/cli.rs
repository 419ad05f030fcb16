#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreArg {
    /// SQLite database, falling back to the JSON file when it fails
    Sqlite,
    /// JSON file only
    Json,
    /// Nothing persisted past this process
    Memory,
}

#[derive(clap::Subcommand, Debug, Clone)]
pub enum Command {
    /// Rank keys for a page URL
    Rank {
        url: String,
        /// List every key, not just the top three
        #[arg(long)]
        all: bool,
    },
    /// Record that a key was used on a page
    Use { key_id: String, url: String },
    /// Add a key
    Add { name: String, secret: String },
    /// Delete a key by id
    Delete { key_id: String },
    /// List keys in insertion order
    List,
    /// Drop usage records older than the retention horizon
    Prune,
    /// Create the store; with --demo, install three sample keys
    Init {
        #[arg(long)]
        demo: bool,
    },
    /// Read one JSON request from stdin and print the JSON response
    Handle,
}

#[derive(clap::Parser, Debug)]
#[command(name = "keyrank", about = "Rank stored API keys by relevance to a website")]
pub struct Args {
    /// Emit JSON instead of colored text
    #[arg(long, global = true)]
    pub json: bool,

    /// Backing store: sqlite|json|memory
    #[arg(long, global = true, value_enum, env = "KEYRANK_STORE", default_value_t = StoreArg::Sqlite)]
    pub store: StoreArg,

    /// Days of usage history to keep when pruning
    #[arg(
        long,
        global = true,
        env = "KEYRANK_RETENTION_DAYS",
        default_value_t = crate::utils::DEFAULT_RETENTION_DAYS
    )]
    pub retention_days: i64,

    /// Debug mode: log scoring and storage decisions to stderr
    #[arg(long, global = true, env = "KEYRANK_DEBUG")]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Args {
    pub fn parse() -> Self {
        <Args as clap::Parser>::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parses_rank_with_flags() {
        let args = Args::try_parse_from([
            "keyrank",
            "--store",
            "json",
            "rank",
            "https://shop.example.com/cart",
            "--all",
            "--json",
        ])
        .unwrap();
        assert_eq!(args.store, StoreArg::Json);
        assert!(args.json);
        match args.command {
            Command::Rank { url, all } => {
                assert_eq!(url, "https://shop.example.com/cart");
                assert!(all);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn use_takes_key_and_url() {
        let args = Args::try_parse_from(["keyrank", "use", "k1", "https://a.io/"]).unwrap();
        assert!(matches!(args.command, Command::Use { .. }));
        assert_eq!(args.retention_days, crate::utils::DEFAULT_RETENTION_DAYS);
    }

    #[test]
    fn store_and_retention_accepted_after_subcommand() {
        let args = Args::try_parse_from([
            "keyrank",
            "prune",
            "--store",
            "memory",
            "--retention-days",
            "30",
            "--debug",
        ])
        .unwrap();
        assert_eq!(args.store, StoreArg::Memory);
        assert_eq!(args.retention_days, 30);
        assert!(args.debug);
        assert!(matches!(args.command, Command::Prune));
    }
}

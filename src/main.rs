use anyhow::{Context, Result};
use chrono::Utc;
use tracing_subscriber::EnvFilter;

use keyrank::cli::{Args, Command, StoreArg};
use keyrank::display::{print_error, print_json_output, print_keys, print_ranked};
use keyrank::models::Request;
use keyrank::scoring::ScoringConfig;
use keyrank::service::{KeyService, RankedKey, ServiceConfig, UsageOutcome};
use keyrank::store::{FallbackStore, JsonFileStore, KeyStore, MemoryStore, SqliteStore, StoreTier};
use keyrank::utils::{read_stdin, retention_horizon};

fn init_logging(debug: bool) {
    let default_directive = if debug { "keyrank=debug" } else { "keyrank=warn" };
    let filter = EnvFilter::try_from_env("KEYRANK_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn build_store(kind: StoreArg) -> Result<Box<dyn KeyStore>> {
    Ok(match kind {
        StoreArg::Sqlite => Box::new(FallbackStore::new(
            SqliteStore::from_env()?,
            JsonFileStore::from_env()?,
        )),
        StoreArg::Json => Box::new(JsonFileStore::from_env()?),
        StoreArg::Memory => Box::new(MemoryStore::new()),
    })
}

fn note_degraded(tier: StoreTier) {
    if tier == StoreTier::Fallback {
        print_error("primary store failed; change saved to the fallback store");
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let config = ServiceConfig {
        scoring: ScoringConfig::from_env(),
        retention: retention_horizon(args.retention_days),
    };
    let store = build_store(args.store).context("configure key store")?;
    let service = KeyService::open(store, config).context("load keys")?;
    let now = Utc::now();

    if args.json
        && let Some(request) = command_request(&args.command)
    {
        return respond(&service, request, now);
    }

    match args.command {
        Command::Rank { url, all } => {
            let ranked: Vec<RankedKey> = service.rank(&url, now);
            print_ranked(&ranked, all, now);
        }
        Command::Use { key_id, url } => match service.record_usage(&key_id, &url, now)? {
            UsageOutcome::Recorded { record, tier } => {
                note_degraded(tier);
                println!("{} used {} time(s) on {}", key_id, record.use_count, record.domain);
            }
            UsageOutcome::UnknownKey => println!("no key with id {key_id}; nothing recorded"),
        },
        Command::Add { name, secret } => {
            let (key, tier) = service.add_key(&name, &secret, now)?;
            note_degraded(tier);
            println!("added {} ({})", key.name, key.id);
        }
        Command::Delete { key_id } => {
            let (removed, tier) = service.delete_key(&key_id)?;
            note_degraded(tier);
            if removed {
                println!("deleted {key_id}");
            } else {
                println!("no key with id {key_id}");
            }
        }
        Command::List => print_keys(&service.keys(), now),
        Command::Prune => {
            let (removed, tier) = service.prune(now)?;
            note_degraded(tier);
            println!("pruned {removed} usage record(s)");
        }
        Command::Init { demo } => {
            let tier = if demo {
                service.seed_demo(now)?
            } else {
                service.flush()?
            };
            note_degraded(tier);
            println!("store ready: {}", service.store().describe());
        }
        Command::Handle => {
            let stdin = read_stdin()?;
            let request: Request = serde_json::from_slice(&stdin).context("parse request json")?;
            return respond(&service, request, now);
        }
    }
    Ok(())
}

fn respond<S: KeyStore>(
    service: &KeyService<S>,
    request: Request,
    now: chrono::DateTime<Utc>,
) -> Result<()> {
    let response = service.handle(request, now);
    print_json_output(&response)?;
    if !response.success {
        std::process::exit(1);
    }
    Ok(())
}

/// Map a CLI command onto the equivalent trigger request
fn command_request(command: &Command) -> Option<Request> {
    Some(match command {
        Command::Rank { url, .. } => Request::UpdateRanking { url: url.clone() },
        Command::Use { key_id, url } => Request::TrackUsage {
            key_id: key_id.clone(),
            url: url.clone(),
        },
        Command::Add { name, secret } => Request::AddApiKey {
            name: name.clone(),
            key: secret.clone(),
        },
        Command::Delete { key_id } => Request::DeleteApiKey {
            key_id: key_id.clone(),
        },
        Command::List => Request::ListKeys,
        Command::Prune => Request::Prune,
        Command::Init { .. } | Command::Handle => return None,
    })
}

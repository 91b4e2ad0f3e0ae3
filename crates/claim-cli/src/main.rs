use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use claim_api::{serve, DurableStore, EngineApi, JsonFileStore, SqliteSnapshotStore};
use clap::{Args, Parser, Subcommand};
use contracts::EngineConfig;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "claim-cli", version, about = "Location claim game server and store tools")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the HTTP and WebSocket API.
    Serve {
        #[arg(long, env = "CLAIMGAME_ADDR", default_value = "127.0.0.1:5004")]
        addr: SocketAddr,
        /// Seed the demo admin and spots when the store is empty.
        #[arg(long)]
        seed_demo: bool,
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Seed the demo admin and spots into an empty store.
    Seed {
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Print a summary of the latest checkpoint.
    Inspect {
        /// Also list stored checkpoints (sqlite only).
        #[arg(long, default_value_t = 0)]
        history: usize,
        #[command(flatten)]
        store: StoreArgs,
    },
}

#[derive(Debug, Args)]
struct StoreArgs {
    /// JSON file with engine settings; missing fields take their defaults.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, env = "CLAIMGAME_SQLITE_PATH", default_value = "claimgame.sqlite")]
    sqlite: PathBuf,
    /// Keep checkpoints in a JSON file instead of sqlite.
    #[arg(long, conflicts_with = "memory")]
    json: Option<PathBuf>,
    /// Run without a durable store.
    #[arg(long)]
    memory: bool,
}

impl StoreArgs {
    fn engine_config(&self) -> Result<EngineConfig, String> {
        let Some(path) = self.config.as_ref() else {
            return Ok(EngineConfig::default());
        };
        let raw = std::fs::read_to_string(path)
            .map_err(|err| format!("failed to read config {}: {err}", path.display()))?;
        serde_json::from_str(&raw)
            .map_err(|err| format!("invalid config {}: {err}", path.display()))
    }

    fn open_store(&self) -> Result<Option<Arc<dyn DurableStore>>, String> {
        if self.memory {
            return Ok(None);
        }
        if let Some(path) = self.json.as_ref() {
            return Ok(Some(Arc::new(JsonFileStore::new(path))));
        }
        let store = SqliteSnapshotStore::open(&self.sqlite).map_err(|err| {
            format!("failed to open sqlite store {}: {err}", self.sqlite.display())
        })?;
        Ok(Some(Arc::new(store)))
    }

    fn open_api(&self) -> Result<EngineApi, String> {
        let config = self.engine_config()?;
        match self.open_store()? {
            Some(store) => EngineApi::open(config, store)
                .map_err(|err| format!("failed to load checkpoint: {err}")),
            None => Ok(EngineApi::from_config(config)),
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn seed(api: &EngineApi) -> Result<bool, String> {
    let seeded = api
        .engine()
        .seed_demo_data()
        .map_err(|err| format!("failed to seed demo data: {err}"))?;
    if seeded && api.has_store() {
        api.flush_persistence_checked()
            .map_err(|err| format!("failed to write checkpoint: {err}"))?;
    }
    Ok(seeded)
}

async fn run_serve(addr: SocketAddr, seed_demo: bool, store: &StoreArgs) -> Result<(), String> {
    let api = store.open_api()?;
    if seed_demo && seed(&api)? {
        info!("demo data seeded");
    }

    println!("serving api on http://{addr}");
    serve(addr, api)
        .await
        .map_err(|err| format!("server error: {err}"))
}

fn run_seed(store: &StoreArgs) -> Result<(), String> {
    let api = store.open_api()?;
    if seed(&api)? {
        println!("seeded demo admin and 2 spots");
    } else {
        println!("store is not empty; nothing seeded");
    }
    Ok(())
}

fn run_inspect(history: usize, store: &StoreArgs) -> Result<(), String> {
    let api = store.open_api()?;
    let snapshot = api.engine().snapshot();
    println!("{snapshot}");

    for spot in api.engine().list_spots() {
        println!(
            "spot id={} name={:?} claim_points={:.2} claimants={}",
            spot.id,
            spot.name,
            spot.claim_info.total_claim_points,
            spot.claim_info.per_player_claim_points.len()
        );
    }
    for player in api.engine().list_players() {
        println!(
            "player id={} name={:?} role={:?} level={} xp={}",
            player.id, player.display_name, player.role, player.stats.level, player.stats.total_xp
        );
    }

    if history > 0 && !store.memory && store.json.is_none() {
        let sqlite = SqliteSnapshotStore::open(&store.sqlite)
            .map_err(|err| format!("failed to open sqlite store: {err}"))?;
        let snapshots = sqlite
            .list_snapshots(history)
            .map_err(|err| format!("failed to list checkpoints: {err}"))?;
        for summary in snapshots {
            println!(
                "checkpoint id={} saved_at={} players={} spots={} logs={} routes={}",
                summary.snapshot_id,
                summary.saved_at,
                summary.player_count,
                summary.spot_count,
                summary.log_count,
                summary.route_count
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = match &cli.command {
        Command::Serve {
            addr,
            seed_demo,
            store,
        } => run_serve(*addr, *seed_demo, store).await,
        Command::Seed { store } => run_seed(store),
        Command::Inspect { history, store } => run_inspect(*history, store),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

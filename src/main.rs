use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use summit::api::{self, AppState, SecurityConfig};
use summit::config::Config;
use summit::db::Database;
use summit::generate::TaskGenerator;
use summit::geometry::generate_staircase;
use summit::migration::migrate_str;
use summit::sessions::Sessions;

#[derive(Parser)]
#[command(name = "summit")]
#[command(about = "Track goals as a climb to the summit")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Port for HTTP API (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// SQLite database file (overrides config)
        #[arg(long)]
        database: Option<PathBuf>,
    },
    /// Print the climb path for a mountain as JSON
    Path {
        /// Number of tasks on the mountain
        #[arg(short, long, default_value = "0")]
        tasks: usize,

        /// Seed, normally the mountain id
        #[arg(short, long)]
        seed: String,

        /// Tasks done, to report the climber's step
        #[arg(short, long, default_value = "0")]
        done: usize,
    },
    /// Upgrade a stored document to the current schema and print it
    Migrate {
        /// JSON document to read
        file: PathBuf,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "summit=debug,tower_http=debug".into()),
    );

    // stdout is reserved for command output
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn serve(mut config: Config, port: Option<u16>, database: Option<PathBuf>) -> anyhow::Result<()> {
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(path) = database {
        config.database_path = Some(path);
    }

    let db = match &config.database_path {
        Some(path) => Database::open(path.clone())?,
        None => Database::open_default()?,
    };
    db.migrate()?;

    let generator = TaskGenerator::new(
        config.inference_url.clone(),
        config.inference_model.clone(),
        config.inference_timeout(),
    )
    .context("Failed to build inference client")?;

    let sessions = Sessions::new(db, config.debounce());
    let security = SecurityConfig::from_env();
    if security.api_key.is_none() {
        tracing::warn!("SUMMIT_API_KEY is not set, the API is unauthenticated");
    }
    if let Some(limiter) = security.rate_limiter.clone() {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(300));
            loop {
                tick.tick().await;
                limiter.cleanup();
            }
        });
    }

    let idle = config.session_idle();
    let sweeper = sessions.clone();
    tokio::spawn(async move {
        let period = idle.clamp(Duration::from_secs(1), Duration::from_secs(60));
        let mut tick = tokio::time::interval(period);
        loop {
            tick.tick().await;
            let evicted = sweeper.evict_idle(idle).await;
            if evicted > 0 {
                tracing::info!("Evicted {} idle session(s)", evicted);
            }
        }
    });

    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::new(sessions.clone(), generator, config);
    let app = api::create_router_with_security(state, security);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Summit listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;

    sessions.flush_all().await;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();
    let config = Config::load();

    match cli.command {
        Some(Commands::Serve { port, database }) => serve(config, port, database).await?,
        Some(Commands::Path { tasks, seed, done }) => {
            let staircase = generate_staircase(tasks, &seed);
            let output = serde_json::json!({
                "climberIndex": staircase.climber_index(done),
                "staircase": staircase,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Some(Commands::Migrate { file }) => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let state = migrate_str(&raw);
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        None => serve(config, None, None).await?,
    }

    Ok(())
}

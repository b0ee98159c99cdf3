use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use refsys::{
    repositories::{memory::MemoryStore, postgres::PgStore, SharedStore},
    services,
    settings::Settings,
};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "refsys.toml")]
    config: String,
    /// Overrides `server.listen`.
    #[arg(short, long)]
    listen: Option<String>,
    #[arg(long, default_value = "log4rs.yaml")]
    log4rs: String,
    /// Keep everything in process memory instead of Postgres.
    #[arg(long)]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    init_logging(&args.log4rs)?;
    log::info!("Starting referral service.");

    let mut settings = Settings::load(&args.config).context("Failed to load settings.")?;
    if let Some(listen) = args.listen {
        settings.server.listen = listen;
    }

    let store: SharedStore = if args.in_memory {
        log::warn!("Using the in-memory store, nothing will be persisted.");
        Arc::new(MemoryStore::new())
    } else {
        let store = PgStore::connect(&settings.postgres.url, settings.postgres.max_connections)
            .await
            .context("Could not connect to database.")?;
        store.migrate().await?;
        Arc::new(store)
    };

    services::start_services(store, settings).await
}

fn init_logging(path: &str) -> Result<(), anyhow::Error> {
    if !Path::new("logs").exists() {
        fs::create_dir("logs")?;
    }

    match log4rs::init_file(path, Default::default()) {
        Ok(_) => {
            println!("[*] Logging initialized successfully.");
            Ok(())
        }
        Err(e) => {
            println!("[ERROR] Failed to initialize logging: {}", e);
            Err(anyhow::anyhow!("Could not initialize logging: {}", e))
        }
    }
}

mod config;
mod http;
mod openapi;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use entity::{employees, products};
use platform_db::{DbPool, connect, ensure_schema};
use platform_obs::{ObsConfig, init_tracing};
use records::RecordStore;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use tracing::info;

use crate::{
    config::AppConfig,
    http::{AppState, ServeConfig},
};

#[derive(Parser, Debug)]
#[command(name = "records-server", version, about = "REST access to employee, product and user records")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP server.
    Serve(ServeCommand),
    /// Create any missing tables.
    #[command(name = "db:init")]
    DbInit,
    /// Insert a sample employee and product.
    Seed,
    /// Write the OpenAPI description document.
    #[command(name = "openapi:print")]
    OpenapiPrint {
        #[arg(long, value_name = "FILE", help = "Destination file path (stdout when omitted)")]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct ServeCommand {
    #[arg(long, default_value = "0.0.0.0")]
    host: std::net::IpAddr,
    #[arg(long, env = "PORT", default_value_t = 3002)]
    port: u16,
    #[arg(long, help = "Do not create missing tables on startup")]
    skip_bootstrap: bool,
}

impl From<&ServeCommand> for ServeConfig {
    fn from(value: &ServeCommand) -> Self {
        ServeConfig::new(value.host, value.port)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let _tracing = init_tracing(ObsConfig::from_env("records-server"))?;
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(cmd) => run_server(cmd, Arc::new(AppConfig::load()?)).await,
        Command::DbInit => db_init(&AppConfig::load()?).await,
        Command::Seed => run_seed(&AppConfig::load()?).await,
        Command::OpenapiPrint { output } => openapi_print(output),
    }
}

fn openapi_print(output: Option<PathBuf>) -> Result<()> {
    let doc = openapi::document().to_pretty_json()?;
    match output {
        Some(path) => {
            std::fs::write(&path, doc)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(path = %path.display(), "API description written");
        }
        None => println!("{doc}"),
    }
    Ok(())
}

async fn setup_pool(config: &AppConfig) -> Result<DbPool> {
    connect(&config.database)
        .await
        .context("failed to connect to the database")
}

async fn run_server(cmd: ServeCommand, config: Arc<AppConfig>) -> Result<()> {
    let pool = setup_pool(&config).await?;
    if !cmd.skip_bootstrap {
        ensure_schema(&pool).await?;
    }
    let store = RecordStore::new(pool).with_timeout(config.statement_timeout);
    let state = AppState { store, config };
    http::serve((&cmd).into(), state).await
}

async fn db_init(config: &AppConfig) -> Result<()> {
    let pool = setup_pool(config).await?;
    ensure_schema(&pool).await?;
    info!("tables ready");
    Ok(())
}

async fn run_seed(config: &AppConfig) -> Result<()> {
    let pool = setup_pool(config).await?;
    ensure_schema(&pool).await?;

    if employees::Entity::find().one(&pool).await?.is_none() {
        employees::ActiveModel {
            first_name: Set("Juan".into()),
            last_name: Set("Pérez".into()),
            national_id: Set("JUAP890123HDFLNM01".into()),
            ..Default::default()
        }
        .insert(&pool)
        .await?;
        info!("sample employee inserted");
    }

    const SAMPLE_CODE: i32 = 1001;
    if products::Entity::find_by_id(SAMPLE_CODE).one(&pool).await?.is_none() {
        products::ActiveModel {
            code: Set(SAMPLE_CODE),
            name: Set("Leche entera".into()),
            price: Set("21.50".into()),
            brand: Set("Lala".into()),
            size: Set("1 L".into()),
        }
        .insert(&pool)
        .await?;
        info!("sample product inserted");
    }
    Ok(())
}

//! Database settings, connection setup and idempotent table bootstrap.

use std::time::Duration;

use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, DbErr,
    EntityTrait, Schema, Statement,
};
use thiserror::Error;
use tracing::info;
use url::Url;

/// Shared connection pool handle.
pub type DbPool = DatabaseConnection;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("invalid {key}: {value}")]
    InvalidSetting { key: &'static str, value: String },
    #[error(transparent)]
    Db(#[from] DbErr),
}

pub type DbResult<T> = Result<T, DbError>;

/// Connection parameters, read once at startup and passed around explicitly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatabaseSettings {
    /// Full connection URL; takes precedence over the individual parts.
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub max_connections: Option<u32>,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".into(),
            port: 5432,
            user: "postgres".into(),
            password: String::new(),
            name: "records".into(),
            max_connections: None,
        }
    }
}

impl DatabaseSettings {
    pub fn from_env() -> DbResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key/value source, falling back to local
    /// developer defaults for anything unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> DbResult<Self> {
        let defaults = Self::default();
        let port = match lookup("DATABASE_PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| DbError::InvalidSetting {
                key: "DATABASE_PORT",
                value: raw,
            })?,
            None => defaults.port,
        };
        let max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            Some(raw) => Some(raw.trim().parse::<u32>().map_err(|_| DbError::InvalidSetting {
                key: "DATABASE_MAX_CONNECTIONS",
                value: raw,
            })?),
            None => None,
        };
        Ok(Self {
            url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            host: lookup("DATABASE_HOST").unwrap_or(defaults.host),
            port,
            user: lookup("DATABASE_USER").unwrap_or(defaults.user),
            password: lookup("DATABASE_PASSWORD").unwrap_or(defaults.password),
            name: lookup("DATABASE_NAME").unwrap_or(defaults.name),
            max_connections,
        })
    }

    /// Connection URL, with the user and password percent-encoded.
    pub fn database_url(&self) -> DbResult<String> {
        if let Some(url) = &self.url {
            return Ok(url.clone());
        }
        let invalid = |key: &'static str, value: &str| DbError::InvalidSetting {
            key,
            value: value.to_string(),
        };
        let mut url = Url::parse("postgres://localhost").map_err(|_| invalid("DATABASE_URL", ""))?;
        url.set_host(Some(&self.host))
            .map_err(|_| invalid("DATABASE_HOST", &self.host))?;
        url.set_port(Some(self.port))
            .map_err(|_| invalid("DATABASE_PORT", &self.port.to_string()))?;
        url.set_username(&self.user)
            .map_err(|_| invalid("DATABASE_USER", &self.user))?;
        if !self.password.is_empty() {
            url.set_password(Some(&self.password))
                .map_err(|_| invalid("DATABASE_PASSWORD", "<redacted>"))?;
        }
        url.set_path(&self.name);
        Ok(url.into())
    }

    /// Log-safe form of the target, without credentials.
    pub fn redacted_target(&self) -> String {
        match &self.url {
            Some(url) => match url.rsplit_once('@') {
                Some((_, target)) => target.to_string(),
                None => url.clone(),
            },
            None => format!("{}:{}/{}", self.host, self.port, self.name),
        }
    }
}

pub async fn connect(settings: &DatabaseSettings) -> DbResult<DbPool> {
    let mut options = ConnectOptions::new(settings.database_url()?);
    options
        .connect_timeout(Duration::from_secs(10))
        .sqlx_logging(false);
    if let Some(max) = settings.max_connections {
        options.max_connections(max);
    }
    let pool = Database::connect(options).await?;
    info!(target = %settings.redacted_target(), "database connected");
    Ok(pool)
}

/// Single-connection in-memory SQLite database, for tests and local demos.
pub async fn connect_in_memory() -> DbResult<DbPool> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    Ok(Database::connect(options).await?)
}

/// Create the served tables when they do not exist yet.
pub async fn ensure_schema(pool: &DbPool) -> DbResult<()> {
    create_table(pool, entity::employees::Entity).await?;
    create_table(pool, entity::products::Entity).await?;
    create_table(pool, entity::users::Entity).await?;
    Ok(())
}

async fn create_table<E: EntityTrait>(pool: &DbPool, entity: E) -> DbResult<()> {
    let backend = pool.get_database_backend();
    let mut stmt = Schema::new(backend).create_table_from_entity(entity);
    stmt.if_not_exists();
    pool.execute(backend.build(&stmt)).await?;
    Ok(())
}

pub async fn ping(pool: &DbPool) -> bool {
    pool.execute(Statement::from_string(
        pool.get_database_backend(),
        "SELECT 1".to_string(),
    ))
    .await
    .is_ok()
}

/// Backend label for health output.
pub fn backend_name(pool: &DbPool) -> &'static str {
    match pool.get_database_backend() {
        DatabaseBackend::Postgres => "postgres",
        DatabaseBackend::MySql => "mysql",
        DatabaseBackend::Sqlite => "sqlite",
    }
}

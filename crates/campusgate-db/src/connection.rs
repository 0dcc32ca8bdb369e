//! SurrealDB connection management.

use surrealdb::Surreal;
use surrealdb::engine::remote::ws::{Client, Ws};
use surrealdb::opt::auth::Root;
use tracing::info;

use crate::error::DbError;
use crate::schema::run_migrations;
use crate::store::SurrealRecordStore;

/// Configuration for connecting to SurrealDB.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// WebSocket URL (e.g., `127.0.0.1:8000`).
    pub url: String,
    pub namespace: String,
    pub database: String,
    /// Root username for authentication.
    pub username: String,
    /// Root password for authentication.
    pub password: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: "127.0.0.1:8000".into(),
            namespace: "campusgate".into(),
            database: "main".into(),
            username: "root".into(),
            password: "root".into(),
        }
    }
}

impl DbConfig {
    /// Read `CAMPUSGATE_DB_URL`, `CAMPUSGATE_DB_NAMESPACE`,
    /// `CAMPUSGATE_DB_DATABASE`, `CAMPUSGATE_DB_USERNAME` and
    /// `CAMPUSGATE_DB_PASSWORD`, keeping defaults for unset variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`DbConfig::from_env`] with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            url: lookup("CAMPUSGATE_DB_URL").unwrap_or(defaults.url),
            namespace: lookup("CAMPUSGATE_DB_NAMESPACE").unwrap_or(defaults.namespace),
            database: lookup("CAMPUSGATE_DB_DATABASE").unwrap_or(defaults.database),
            username: lookup("CAMPUSGATE_DB_USERNAME").unwrap_or(defaults.username),
            password: lookup("CAMPUSGATE_DB_PASSWORD").unwrap_or(defaults.password),
        }
    }
}

/// Manages a connection to SurrealDB.
#[derive(Clone)]
pub struct DbManager {
    db: Surreal<Client>,
}

impl DbManager {
    /// Connect, authenticate as root, and select the configured
    /// namespace and database.
    pub async fn connect(config: &DbConfig) -> Result<Self, surrealdb::Error> {
        info!(
            url = %config.url,
            namespace = %config.namespace,
            database = %config.database,
            "Connecting to SurrealDB"
        );

        let db = Surreal::new::<Ws>(&config.url).await?;

        db.signin(Root {
            username: config.username.clone(),
            password: config.password.clone(),
        })
        .await?;

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await?;

        info!("Connected to SurrealDB");

        Ok(Self { db })
    }

    pub fn client(&self) -> &Surreal<Client> {
        &self.db
    }

    /// Apply pending migrations and hand out a record store over this
    /// connection.
    pub async fn prepare_store(&self) -> Result<SurrealRecordStore<Client>, DbError> {
        run_migrations(&self.db).await?;
        Ok(SurrealRecordStore::new(self.db.clone()))
    }
}

use diesel::{Connection, PgConnection};
use diesel_async::pooled_connection::{bb8::Pool, AsyncDieselConnectionManager};
use diesel_async::AsyncPgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tokio::sync::OnceCell;
use tracing::{error, info};
use crate::error::StoreError;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub type DbPool = Pool<AsyncPgConnection>;
pub type DbConnection<'a> = bb8::PooledConnection<'a, AsyncDieselConnectionManager<AsyncPgConnection>>;

/// Lazily opens the connection pool and hands out the same pool afterwards.
///
/// A failed attempt leaves nothing cached, so the next call to [`handle`]
/// tries again.
///
/// [`handle`]: StoreConnector::handle
pub struct StoreConnector {
    database_url: String,
    pool: OnceCell<DbPool>,
}

impl StoreConnector {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            pool: OnceCell::new(),
        }
    }

    pub async fn handle(&self) -> Result<&DbPool, StoreError> {
        self.pool.get_or_try_init(|| self.connect()).await
    }

    pub fn is_connected(&self) -> bool {
        self.pool.initialized()
    }

    async fn connect(&self) -> Result<DbPool, StoreError> {
        info!("Running database migrations...");
        let database_url = self.database_url.clone();
        tokio::task::spawn_blocking(move || run_migrations(&database_url))
            .await
            .map_err(|e| StoreError::Connection(format!("Migration task failed: {}", e)))?
            .inspect_err(|e| error!("Could not connect to the database: {}", e))?;
        info!("Migrations completed successfully");

        let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(&self.database_url);
        let pool = Pool::builder()
            .build(config)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        info!("Connected to the database");
        Ok(pool)
    }
}

pub(crate) fn run_migrations(database_url: &str) -> Result<(), StoreError> {
    let mut conn = PgConnection::establish(database_url)
        .map_err(|e| StoreError::Connection(e.to_string()))?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| StoreError::Connection(format!("Migration error: {}", e)))?;
    Ok(())
}

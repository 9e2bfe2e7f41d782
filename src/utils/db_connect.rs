// src/utils/db_connect.rs
use anyhow::{Context, Result};
use bb8::Pool;
use bb8_postgres::PostgresConnectionManager;
use log::{info, warn};
use std::time::Duration;
use tokio_postgres::{Config, NoTls};

pub type PgPool = Pool<PostgresConnectionManager<NoTls>>;

/// Reads the POSTGRES_* variables and constructs a PostgreSQL config.
pub fn build_pg_config() -> Config {
    let mut config = Config::new();
    let host = std::env::var("POSTGRES_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port_str = std::env::var("POSTGRES_PORT").unwrap_or_else(|_| "5432".to_string());
    let port = port_str.parse::<u16>().unwrap_or_else(|_| {
        warn!("Invalid POSTGRES_PORT '{}', falling back to 5432", port_str);
        5432
    });
    let dbname = std::env::var("POSTGRES_DB").unwrap_or_else(|_| "goals".to_string());
    let user = std::env::var("POSTGRES_USER").unwrap_or_else(|_| "postgres".to_string());
    let password = std::env::var("POSTGRES_PASSWORD").unwrap_or_default();

    info!(
        "DB Config: Host={}, Port={}, DB={}, User={}",
        host, port, dbname, user
    );
    config
        .host(&host)
        .port(port)
        .dbname(&dbname)
        .user(&user)
        .password(&password);
    config.application_name("goal_record_dedupe");
    config.connect_timeout(Duration::from_secs(10));
    config
}

/// Initializes the database connection pool and checks it with a test query.
pub async fn connect() -> Result<PgPool> {
    let config = build_pg_config();
    info!("Connecting to PostgreSQL database...");
    let manager = PostgresConnectionManager::new(config, NoTls);

    let pool = Pool::builder()
        .max_size(16)
        .min_idle(Some(1))
        .idle_timeout(Some(Duration::from_secs(180)))
        .connection_timeout(Duration::from_secs(15))
        .build(manager)
        .await
        .context("Failed to build database connection pool")?;

    {
        let conn = pool
            .get()
            .await
            .context("Failed to get test connection from pool")?;
        conn.query_one("SELECT 1", &[])
            .await
            .context("Test query 'SELECT 1' failed")?;
    }
    info!("Database connection pool initialized successfully.");
    Ok(pool)
}

/// (total connections, idle connections, in use)
pub fn get_pool_status(pool: &PgPool) -> (u32, u32, u32) {
    let state = pool.state();
    (
        state.connections,
        state.idle_connections,
        state.connections.saturating_sub(state.idle_connections),
    )
}

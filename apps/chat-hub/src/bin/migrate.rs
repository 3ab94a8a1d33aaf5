//! Schema migrations for the presence store.
//!
//! Usage:
//!   cargo run -p chat-hub --bin chat-migrate              # apply pending
//!   cargo run -p chat-hub --bin chat-migrate -- --pending # list only
//!   cargo run -p chat-hub --bin chat-migrate -- --test    # target `<db>_test`
//!
//! Reads DATABASE_URL from the environment (or .env via dotenvy).

use std::error::Error;

use chat_hub::config::Config;
use diesel::pg::PgConnection;
use diesel::Connection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

type BoxError = Box<dyn Error + Send + Sync>;

fn main() -> Result<(), BoxError> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Config::from_env();
    let mut database_url = config
        .database_url
        .ok_or("DATABASE_URL env var is required")?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|arg| arg == "--test") {
        database_url = with_test_db_suffix(&database_url);
    }

    let mut conn = PgConnection::establish(&database_url)?;

    if args.iter().any(|arg| arg == "--pending") {
        let pending = conn.pending_migrations(MIGRATIONS)?;
        for migration in &pending {
            tracing::info!(name = %migration.name(), "pending");
        }
        tracing::info!(count = pending.len(), "pending migrations");
        return Ok(());
    }

    let applied = conn.run_pending_migrations(MIGRATIONS)?;
    for migration in &applied {
        tracing::info!(%migration, "applied");
    }
    tracing::info!(count = applied.len(), "migrations complete");

    Ok(())
}

/// `postgres://host/chat?x=y` becomes `postgres://host/chat_test?x=y`.
fn with_test_db_suffix(database_url: &str) -> String {
    let (base, query) = match database_url.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (database_url, None),
    };

    let Some((prefix, db_name)) = base.rsplit_once('/') else {
        return database_url.to_string();
    };
    if db_name.is_empty() || db_name.ends_with("_test") {
        return database_url.to_string();
    }

    match query {
        Some(query) => format!("{prefix}/{db_name}_test?{query}"),
        None => format!("{prefix}/{db_name}_test"),
    }
}

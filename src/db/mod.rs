pub mod queries;

use anyhow::Result;
use sqlx::SqlitePool;
use std::fs;

pub const SCHEMA_SQL: &str = include_str!("../../migrations/0001_init.sql");

pub async fn connect(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    SqlitePool::connect(database_url).await
}

/// Apply every migrations/*.sql in filename order. Files may hold
/// multiple statements.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let mut entries: Vec<_> = fs::read_dir("migrations")?.filter_map(|e| e.ok()).collect();
    entries.sort_by_key(|e| e.path());
    for e in entries {
        let p = e.path();
        if p.extension().and_then(|s| s.to_str()) == Some("sql") {
            let sql = fs::read_to_string(&p)?;
            sqlx::raw_sql(&sql).execute(pool).await?;
        }
    }
    Ok(())
}

/// In-process schema setup for embedded callers and tests that run
/// without a migrations directory on disk.
pub async fn apply_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA_SQL).execute(pool).await?;
    Ok(())
}

/// Accept the sqlite URL forms collaborators tend to hand us:
/// sqlite://path, sqlite:path, file:path, or a bare path.
pub fn normalize_sqlite_url(input: &str) -> String {
    if input.starts_with("sqlite://") || input.starts_with("sqlite::memory:") {
        return input.to_string();
    }
    if let Some(rest) = input.strip_prefix("sqlite:") {
        return format!("sqlite://{}", rest.trim_start_matches('/'));
    }
    if let Some(rest) = input.strip_prefix("file:") {
        return format!("sqlite://{rest}");
    }
    format!("sqlite://{input}")
}

pub fn db_file_path(url: &str) -> Option<std::path::PathBuf> {
    if let Some(rest) = url.strip_prefix("sqlite://") {
        if rest == ":memory:" {
            return None;
        }
        return Some(std::path::PathBuf::from(rest));
    }
    None
}

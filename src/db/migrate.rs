use sqlx::PgPool;

/// Schema files in apply order, embedded at build time.
const MIGRATIONS: &[(&str, &str)] = &[(
    "001_curriculum_schema",
    include_str!("../../sql/001_curriculum_schema.sql"),
)];

const BOOKKEEPING_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS "_migrations" (
        "id" SERIAL PRIMARY KEY,
        "name" TEXT NOT NULL UNIQUE,
        "applied_at" TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
"#;

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("migration {name} failed: {source}")]
    Apply {
        name: &'static str,
        #[source]
        source: sqlx::Error,
    },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Embedded migrations not yet listed in `applied`, in order.
fn pending(applied: &[String]) -> Vec<(&'static str, &'static str)> {
    MIGRATIONS
        .iter()
        .copied()
        .filter(|(name, _)| !applied.iter().any(|done| done == name))
        .collect()
}

/// Applies outstanding schema files. Each file and its `_migrations` row
/// commit together, so a failed file leaves nothing half-recorded.
pub async fn run_migrations(pool: &PgPool) -> Result<Vec<&'static str>, MigrationError> {
    sqlx::query(BOOKKEEPING_TABLE).execute(pool).await?;

    let applied: Vec<String> = sqlx::query_scalar(r#"SELECT "name" FROM "_migrations""#)
        .fetch_all(pool)
        .await?;

    let mut newly_applied = Vec::new();
    for (name, sql) in pending(&applied) {
        let apply = |source| MigrationError::Apply { name, source };

        let mut tx = pool.begin().await?;
        sqlx::raw_sql(sql).execute(&mut *tx).await.map_err(apply)?;
        sqlx::query(r#"INSERT INTO "_migrations" ("name") VALUES ($1)"#)
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(apply)?;
        tx.commit().await.map_err(apply)?;

        tracing::info!(migration = name, "schema migration applied");
        newly_applied.push(name);
    }

    if newly_applied.is_empty() {
        tracing::debug!("schema up to date");
    }
    Ok(newly_applied)
}

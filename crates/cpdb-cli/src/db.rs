//! `db` command handlers.

/// # Errors
///
/// Returns an error if the database does not answer.
pub(crate) async fn run_db_ping(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    cpdb_db::health_check(pool).await?;
    println!("database reachable");
    Ok(())
}

/// # Errors
///
/// Returns an error if a migration fails to apply.
pub(crate) async fn run_db_migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let applied = cpdb_db::run_migrations(pool).await?;
    if applied == 0 {
        println!("schema up to date");
    } else {
        println!("applied {applied} migration(s)");
    }
    Ok(())
}

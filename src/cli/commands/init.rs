//! `wto init` - create the database and apply migrations.

use std::path::Path;

use tracing::info;

use crate::repository::migrations::run_migrations;

pub async fn run(database_url: &str) -> anyhow::Result<()> {
    let db_path = database_url.strip_prefix("sqlite:").unwrap_or(database_url);
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    run_migrations(database_url).await?;
    info!("Database ready at {}", db_path);
    println!("Initialized {}", db_path);
    Ok(())
}

//! `wto status` - store counts.

use crate::repository::{AsyncSqlitePool, DocumentRepository};

pub async fn run(database_url: &str) -> anyhow::Result<()> {
    let repo = DocumentRepository::new(AsyncSqlitePool::new(database_url));

    let documents = repo.count().await?;
    let blobs = repo.blob_count().await?;

    println!("documents: {documents}");
    println!("blobs:     {blobs}");
    Ok(())
}

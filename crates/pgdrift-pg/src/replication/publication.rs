//! Publication management.

use std::collections::HashSet;

use pgdrift_core::{quote_ident, TableRef};
use tokio_postgres::Client;
use tracing::info;

use crate::error::PgResult;

pub async fn publication_exists(client: &Client, publication_name: &str) -> PgResult<bool> {
    let exists: bool = client
        .query_one(
            "SELECT EXISTS(SELECT 1 FROM pg_publication WHERE pubname = $1)",
            &[&publication_name],
        )
        .await?
        .get(0);

    Ok(exists)
}

/// Tables currently in the publication.
pub async fn publication_tables(
    client: &Client,
    publication_name: &str,
) -> PgResult<HashSet<TableRef>> {
    let rows = client
        .query(
            "SELECT schemaname::text, tablename::text FROM pg_publication_tables WHERE pubname = $1",
            &[&publication_name],
        )
        .await?;

    Ok(rows
        .iter()
        .map(|r| TableRef::new(r.get::<_, String>(0), r.get::<_, String>(1)))
        .collect())
}

/// The DDL that creates `publication_name`, for all tables when `tables` is empty.
pub fn create_publication_sql(publication_name: &str, tables: &[TableRef]) -> String {
    if tables.is_empty() {
        format!("CREATE PUBLICATION {} FOR ALL TABLES", quote_ident(publication_name))
    } else {
        format!(
            "CREATE PUBLICATION {} FOR TABLE {}",
            quote_ident(publication_name),
            quoted_list(tables)
        )
    }
}

fn quoted_list<'a>(tables: impl IntoIterator<Item = &'a TableRef>) -> String {
    tables
        .into_iter()
        .map(TableRef::quoted)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Make sure the publication exists and covers `tables`.
///
/// A missing publication is created. An existing one gets any missing tables
/// added; tables it already publishes are left alone.
pub async fn ensure_publication(
    client: &Client,
    publication_name: &str,
    tables: &[TableRef],
) -> PgResult<()> {
    if !publication_exists(client, publication_name).await? {
        info!(publication = %publication_name, tables = tables.len(), "Creating publication");
        client
            .batch_execute(&create_publication_sql(publication_name, tables))
            .await?;
        return Ok(());
    }

    if tables.is_empty() {
        info!(publication = %publication_name, "Using existing publication");
        return Ok(());
    }

    let current = publication_tables(client, publication_name).await?;
    let missing: Vec<&TableRef> = tables.iter().filter(|t| !current.contains(*t)).collect();
    if missing.is_empty() {
        info!(publication = %publication_name, "Publication has all required tables");
        return Ok(());
    }

    info!(publication = %publication_name, missing = missing.len(), "Adding tables to publication");
    client
        .batch_execute(&format!(
            "ALTER PUBLICATION {} ADD TABLE {}",
            quote_ident(publication_name),
            quoted_list(missing)
        ))
        .await?;

    Ok(())
}

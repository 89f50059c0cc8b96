//! Replication slot management.

use tokio_postgres::Client;
use tracing::{info, warn};

use super::lsn::parse_lsn;
use crate::error::{PgError, PgResult};

pub async fn slot_exists(client: &Client, slot_name: &str) -> PgResult<bool> {
    let exists: bool = client
        .query_one(
            "SELECT EXISTS(SELECT 1 FROM pg_replication_slots WHERE slot_name = $1)",
            &[&slot_name],
        )
        .await?
        .get(0);

    Ok(exists)
}

async fn slot_plugin(client: &Client, slot_name: &str) -> PgResult<Option<String>> {
    let row = client
        .query_opt(
            "SELECT plugin::text FROM pg_replication_slots WHERE slot_name = $1",
            &[&slot_name],
        )
        .await?;

    Ok(row.and_then(|r| r.get(0)))
}

/// Create a logical replication slot using pgoutput.
pub async fn create_slot(client: &Client, slot_name: &str) -> PgResult<()> {
    info!(slot = %slot_name, "Creating replication slot with pgoutput");
    client
        .execute(
            "SELECT pg_create_logical_replication_slot($1, 'pgoutput')",
            &[&slot_name],
        )
        .await
        .map_err(|e| PgError::SlotCreationFailed(e.to_string()))?;

    Ok(())
}

pub async fn drop_slot(client: &Client, slot_name: &str) -> PgResult<()> {
    info!(slot = %slot_name, "Dropping replication slot");
    client
        .execute("SELECT pg_drop_replication_slot($1)", &[&slot_name])
        .await
        .map_err(|e| PgError::Replication(format!("failed to drop slot: {}", e)))?;

    Ok(())
}

/// Make sure `slot_name` exists and decodes with pgoutput.
///
/// A slot created with another output plugin cannot be read by our decoder,
/// so it is an error rather than something we silently drop.
pub async fn ensure_slot(client: &Client, slot_name: &str, create_if_missing: bool) -> PgResult<()> {
    if slot_exists(client, slot_name).await? {
        let plugin = slot_plugin(client, slot_name).await?;
        if plugin.as_deref() != Some("pgoutput") {
            warn!(slot = %slot_name, plugin = ?plugin, "Slot does not use pgoutput");
            return Err(PgError::Replication(format!(
                "slot '{}' uses plugin {:?}, expected pgoutput",
                slot_name, plugin
            )));
        }
        info!(slot = %slot_name, "Using existing replication slot");
    } else if create_if_missing {
        create_slot(client, slot_name).await?;
    } else {
        return Err(PgError::SlotNotFound(slot_name.to_string()));
    }

    Ok(())
}

/// The slot's `confirmed_flush_lsn`, or `None` if the slot has none yet.
pub async fn confirmed_flush_lsn(client: &Client, slot_name: &str) -> PgResult<Option<u64>> {
    let row = client
        .query_opt(
            "SELECT confirmed_flush_lsn::text FROM pg_replication_slots WHERE slot_name = $1",
            &[&slot_name],
        )
        .await?
        .ok_or_else(|| PgError::SlotNotFound(slot_name.to_string()))?;

    let lsn: Option<String> = row.get(0);
    lsn.as_deref().map(parse_lsn).transpose()
}

use std::io::Write;

use anyhow::{Context, Result};
use tracing::{debug, info};

use pgdrift_config::PipelineConfig;
use pgdrift_core::{ChangeEvent, TableRef};
use pgdrift_pg::{
    connect_postgres, format_lsn, Catalog, PgExecutor, ReplicationStream,
    ReplicationStreamConfig, RetryPolicy, Shutdown,
};

use crate::runner::forward_ctrl_c;

/// Tables to publish: the `--table` arguments, or every configured table.
pub fn publication_tables(config: &PipelineConfig, filter: &[String]) -> Result<Vec<TableRef>> {
    if filter.is_empty() {
        return config
            .tables
            .iter()
            .map(|t| t.table_ref().map_err(anyhow::Error::from))
            .collect();
    }

    filter
        .iter()
        .map(|name| TableRef::parse(name).with_context(|| format!("Invalid table '{}'", name)))
        .collect()
}

/// Stream committed changes as JSON lines until Ctrl-C or the stream ends.
///
/// Each transaction is acknowledged only after all its events are written.
pub async fn run_replication(
    config: &PipelineConfig,
    slot: &str,
    publication: &str,
    create_slot: bool,
    filter: &[String],
) -> Result<()> {
    let connection_string = config.postgres.connection_string.clone();

    let control_client = connect_postgres(&connection_string)
        .await
        .context("Failed to connect to Postgres")?;

    let retry = RetryPolicy::new(config.retry.count, config.retry.delay());
    let catalog = Catalog::new(PgExecutor::new(connection_string.clone(), retry));

    let repl_config = ReplicationStreamConfig {
        connection_string,
        slot_name: slot.to_string(),
        publication_name: publication.to_string(),
        create_slot,
        publication_tables: publication_tables(config, filter)?,
        ..Default::default()
    };

    let mut stream = ReplicationStream::connect(repl_config, &control_client, catalog)
        .await
        .context("Failed to connect for streaming replication")?;

    let (stop_tx, mut shutdown) = Shutdown::channel();
    tokio::spawn(forward_ctrl_c(stop_tx));

    info!(slot, publication, lsn = %format_lsn(stream.ack_lsn()), "Streaming changes");

    let mut total_events: u64 = 0;
    loop {
        let batch = tokio::select! {
            batch = stream.recv_batch() => batch?,
            _ = shutdown.stopped() => break,
        };
        let Some(batch) = batch else {
            break;
        };

        debug!(count = batch.events.len(), lsn = %format_lsn(batch.ack_lsn), "Transaction");
        write_events(&batch.events)?;
        stream.acknowledge(batch.ack_lsn);

        let before = total_events;
        total_events += batch.events.len() as u64;
        if total_events / 1000 > before / 1000 {
            info!(total_events, lsn = %format_lsn(stream.ack_lsn()), "Progress");
        }
    }

    info!(total_events, lsn = %format_lsn(stream.ack_lsn()), "Replication stopped");
    Ok(())
}

fn write_events(events: &[ChangeEvent]) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    for event in events {
        let line = serde_json::to_string(event).context("Failed to serialize change event")?;
        writeln!(stdout, "{}", line).context("Failed to write to stdout")?;
    }
    stdout.flush().context("Failed to flush stdout")
}

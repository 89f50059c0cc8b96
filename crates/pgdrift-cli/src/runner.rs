use std::io::Write;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use pgdrift_config::{PipelineConfig, StrategyConfig, TableConfig};
use pgdrift_core::{PolledRow, Value};
use pgdrift_pg::{
    Increment, PgExecutor, PollInterval, Poller, RetryPolicy, Shutdown, Strategy, XminWindow,
};

use crate::config::select_tables;

/// Rows buffered between the pollers and stdout before pollers wait.
const OUTPUT_BUFFER: usize = 1024;

/// Build the extraction strategy a table is configured with.
pub fn build_strategy(
    table: &TableConfig,
    connection_string: &str,
    retry: RetryPolicy,
) -> Result<Box<dyn Strategy>> {
    let table_ref = table.table_ref()?;
    let executor = PgExecutor::new(connection_string, retry);

    let strategy: Box<dyn Strategy> = match &table.strategy {
        StrategyConfig::Xmin { pk, initial_xmin, .. } => Box::new(
            XminWindow::new(executor, table_ref, pk.as_str(), table.limit)
                .with_initial_xmin(*initial_xmin),
        ),
        StrategyConfig::Increment {
            column,
            initial_value,
        } => {
            let mut increment = Increment::new(executor, table_ref, column.as_str(), table.limit);
            if let Some(value) = initial_value {
                increment = increment.with_watermark(Value::String(value.clone()));
            }
            Box::new(increment)
        }
    };

    Ok(strategy)
}

fn wants_backfill(table: &TableConfig) -> bool {
    matches!(table.strategy, StrategyConfig::Xmin { backfill: true, .. })
}

/// Poll every selected table until Ctrl-C, printing rows as JSON lines.
///
/// Each table runs on its own task; one table failing leaves the rest running.
pub async fn run_poll_loop(config: &PipelineConfig, filter: &[String]) -> Result<()> {
    let tables = select_tables(config, filter)?;
    let retry = RetryPolicy::new(config.retry.count, config.retry.delay());

    let (stop_tx, shutdown) = Shutdown::channel();
    tokio::spawn(forward_ctrl_c(stop_tx));

    let (row_tx, row_rx) = mpsc::channel::<PolledRow>(OUTPUT_BUFFER);
    let writer = tokio::spawn(write_json_lines(row_rx));

    let mut handles = Vec::with_capacity(tables.len());
    for table in tables {
        let strategy = build_strategy(table, &config.postgres.connection_string, retry)
            .with_context(|| format!("Failed to set up table '{}'", table.table))?;
        let interval = PollInterval::new(table.min_interval(), table.max_interval());

        info!(
            table = %strategy.table(),
            limit = table.limit,
            min_interval_secs = table.min_interval_secs,
            max_interval_secs = table.max_interval_secs,
            "Starting poller"
        );

        let mut poller =
            Poller::new(strategy, row_tx.clone(), interval).with_backfill(wants_backfill(table));
        let shutdown = shutdown.clone();
        let name = table.table.clone();
        handles.push((name, tokio::spawn(async move { poller.run(shutdown).await })));
    }
    drop(row_tx);

    let mut failed = Vec::new();
    for (name, handle) in handles {
        match handle.await {
            Ok(Ok(stats)) => info!(
                table = %name,
                passes = stats.passes,
                rows = stats.rows,
                backfilled = stats.backfilled,
                "Table finished"
            ),
            Ok(Err(e)) => {
                error!(table = %name, error = %e, "Table failed");
                failed.push(name);
            }
            Err(e) => {
                error!(table = %name, error = %e, "Poller task panicked");
                failed.push(name);
            }
        }
    }

    writer.await.context("Output writer panicked")??;

    if !failed.is_empty() {
        anyhow::bail!("{} table(s) failed: {}", failed.len(), failed.join(", "));
    }
    Ok(())
}

/// Publish a stop once Ctrl-C arrives.
pub async fn forward_ctrl_c(stop: watch::Sender<bool>) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl-C, stopping after the current pass");
            let _ = stop.send(true);
        }
        Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
    }
}

async fn write_json_lines(mut rows: mpsc::Receiver<PolledRow>) -> Result<()> {
    while let Some(row) = rows.recv().await {
        let line = serde_json::to_string(&row).context("Failed to serialize row")?;
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", line).context("Failed to write to stdout")?;
    }
    Ok(())
}

//! Drives a strategy on an adaptive interval.

use std::time::Duration;

use pgdrift_core::PolledRow;
use tokio::sync::watch;
use tracing::info;

use crate::error::PgResult;
use crate::sink::RowSink;
use crate::strategy::Strategy;

/// Log progress every this many rows within one pass.
const PROGRESS_EVERY: u64 = 100_000;

/// Rows per pass at which polling runs at the minimum interval.
const BUSY_ROWS: u32 = 50;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Bounds for the delay between passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollInterval {
    min: Duration,
    max: Duration,
}

impl PollInterval {
    /// A `min` above `max` is lowered to `max`.
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min: min.min(max),
            max,
        }
    }

    pub fn fixed(interval: Duration) -> Self {
        Self::new(interval, interval)
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Delay before the next pass, given how many rows the last one produced.
    ///
    /// An idle table waits the maximum and a single row still does. From there
    /// the delay falls with `1 / rows`, reaching zero (so the minimum) at 50 rows.
    pub fn next_delay(&self, rows: u64) -> Duration {
        if rows == 0 {
            return self.max;
        }
        if rows >= u64::from(BUSY_ROWS) {
            return self.min;
        }
        // In nanoseconds so any configured maximum fits; the result never exceeds `max`.
        let rows = u128::from(rows);
        let busy = u128::from(BUSY_ROWS);
        let nanos = self.max.as_nanos() * (busy - rows) / ((busy - 1) * rows);
        let delay = Duration::new((nanos / NANOS_PER_SEC) as u64, (nanos % NANOS_PER_SEC) as u32);
        delay.clamp(self.min, self.max)
    }
}

/// Stop signal for a running [`Poller`].
///
/// Once the sender publishes `true` the poller stops at its next sleep or
/// between passes. A dropped sender never stops it.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    pub fn channel() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self::new(rx))
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        Self::channel().1
    }

    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once a stop has been requested.
    pub async fn stopped(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Totals for one [`Poller::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    pub passes: u64,
    pub rows: u64,
    pub backfilled: u64,
}

/// Runs a strategy pass after pass, forwarding every row to a sink.
pub struct Poller<S, K> {
    strategy: S,
    sink: K,
    interval: PollInterval,
    backfill: bool,
}

impl<S: Strategy, K: RowSink> Poller<S, K> {
    pub fn new(strategy: S, sink: K, interval: PollInterval) -> Self {
        Self {
            strategy,
            sink,
            interval,
            backfill: false,
        }
    }

    /// Run the strategy's backfill once before the first incremental pass.
    pub fn with_backfill(mut self, backfill: bool) -> Self {
        self.backfill = backfill;
        self
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    pub fn into_sink(self) -> K {
        self.sink
    }

    /// Poll until `shutdown` fires. Strategy and sink errors end the loop.
    pub async fn run(&mut self, mut shutdown: Shutdown) -> PgResult<PollStats> {
        let table = self.strategy.table().clone();
        let mut stats = PollStats::default();

        if self.backfill && !shutdown.is_stopped() {
            info!(table = %table, "Performing backfill");
            stats.backfilled = self.backfill_once().await?;
            info!(table = %table, rows = stats.backfilled, "Finished backfilling");
        }

        let mut delay = Duration::ZERO;
        while !shutdown.is_stopped() {
            if !delay.is_zero() {
                info!(table = %table, delay_ms = delay.as_millis() as u64, "Sleeping");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.stopped() => break,
                }
            }

            info!(table = %table, "Polling");
            let rows = self.poll_once().await?;
            stats.passes += 1;
            stats.rows += rows;

            if rows == 0 {
                info!(table = %table, "No new rows");
            } else {
                info!(table = %table, rows, "Emitted rows");
            }
            delay = self.interval.next_delay(rows);
        }

        info!(table = %table, passes = stats.passes, rows = stats.rows, "Poller stopped");
        Ok(stats)
    }

    /// One strategy pass; returns the number of rows emitted.
    pub async fn poll_once(&mut self) -> PgResult<u64> {
        let mut rows = 0;
        while let Some(batch) = self.strategy.next_batch().await? {
            rows += self.forward(batch, rows, "Emitted rows and counting").await?;
        }
        Ok(rows)
    }

    async fn backfill_once(&mut self) -> PgResult<u64> {
        let mut rows = 0;
        while let Some(batch) = self.strategy.backfill_batch().await? {
            rows += self.forward(batch, rows, "Backfill in progress").await?;
        }
        Ok(rows)
    }

    async fn forward(
        &mut self,
        batch: Vec<pgdrift_core::Row>,
        so_far: u64,
        progress: &'static str,
    ) -> PgResult<u64> {
        let mut sent = 0;
        for row in batch {
            let table = self.strategy.table().clone();
            self.sink.emit(PolledRow { table, row }).await?;
            sent += 1;
            if (so_far + sent) % PROGRESS_EVERY == 0 {
                info!(table = %self.strategy.table(), rows = so_far + sent, "{}", progress);
            }
        }
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use pgdrift_core::{TableRef, Value};
    use tokio::sync::mpsc;

    use super::*;
    use crate::strategy::Increment;
    use crate::testing::{row, ScriptedExecutor};

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn increment(executor: &Arc<ScriptedExecutor>, limit: u32) -> Increment<Arc<ScriptedExecutor>> {
        Increment::new(executor.clone(), TableRef::new("public", "events"), "id", limit)
    }

    fn rows(ids: std::ops::Range<i64>) -> Vec<pgdrift_core::Row> {
        ids.map(|id| row(&[("id", Value::Int(id))])).collect()
    }

    #[test]
    fn test_idle_pass_waits_maximum() {
        let interval = PollInterval::new(secs(5), secs(60));
        assert_eq!(interval.next_delay(0), secs(60));
    }

    #[test]
    fn test_busy_pass_waits_minimum() {
        let interval = PollInterval::new(secs(5), secs(60));
        assert_eq!(interval.next_delay(50), secs(5));
        assert_eq!(interval.next_delay(10_000), secs(5));
    }

    #[test]
    fn test_delay_scales_with_rows() {
        let interval = PollInterval::new(secs(1), secs(98));
        assert_eq!(interval.next_delay(1), secs(98));
        assert_eq!(interval.next_delay(10), secs(8));
        assert_eq!(interval.next_delay(25), secs(2));
        // 98 * 1 / (49 * 49) is below the floor
        assert_eq!(interval.next_delay(49), secs(1));

        let delays: Vec<_> = (1..=50).map(|rows| interval.next_delay(rows)).collect();
        assert!(delays.windows(2).all(|pair| pair[0] >= pair[1]));
    }

    #[test]
    fn test_huge_maximum_does_not_overflow() {
        let interval = PollInterval::new(secs(1), Duration::MAX);
        assert_eq!(interval.next_delay(1), Duration::MAX);
        assert!(interval.next_delay(2) < Duration::MAX);
        assert!(interval.next_delay(2) > interval.next_delay(3));
        assert_eq!(interval.next_delay(50), secs(1));
    }

    #[test]
    fn test_min_above_max_is_lowered() {
        let interval = PollInterval::new(secs(90), secs(60));
        assert_eq!(interval.min(), secs(60));
        assert_eq!(interval.next_delay(1000), secs(60));
    }

    /// Requests a stop as soon as it sees the first row.
    struct StopOnFirstRow {
        rows: Vec<PolledRow>,
        stop: watch::Sender<bool>,
    }

    #[async_trait]
    impl RowSink for StopOnFirstRow {
        async fn emit(&mut self, row: PolledRow) -> PgResult<()> {
            self.rows.push(row);
            let _ = self.stop.send(true);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_stop_waits_for_pass_to_finish() {
        let executor = Arc::new(ScriptedExecutor::new().respond(rows(1..3)).respond(rows(3..4)));
        let (stop, shutdown) = Shutdown::channel();
        let sink = StopOnFirstRow { rows: Vec::new(), stop };

        let mut poller = Poller::new(increment(&executor, 2), sink, PollInterval::fixed(secs(0)));
        let stats = poller.run(shutdown).await.unwrap();

        assert_eq!(stats, PollStats { passes: 1, rows: 3, backfilled: 0 });
        assert_eq!(poller.into_sink().rows.len(), 3);
        assert_eq!(executor.remaining(), 0);
    }

    #[tokio::test]
    async fn test_stop_interrupts_sleep() {
        let executor = Arc::new(ScriptedExecutor::new().respond(rows(1..2)));
        let (stop, shutdown) = Shutdown::channel();
        let (tx, mut rx) = mpsc::channel(8);

        let strategy = increment(&executor, 10);
        let handle = tokio::spawn(async move {
            let mut poller = Poller::new(strategy, tx, PollInterval::fixed(secs(3600)));
            poller.run(shutdown).await
        });

        let first = rx.recv().await.unwrap();
        assert_eq!(first.table.to_string(), "public.events");
        stop.send(true).unwrap();

        let stats = tokio::time::timeout(secs(5), handle)
            .await
            .expect("poller should stop while sleeping")
            .unwrap()
            .unwrap();
        assert_eq!(stats.passes, 1);
    }

    #[tokio::test]
    async fn test_strategy_error_ends_the_loop() {
        let executor = Arc::new(ScriptedExecutor::new());
        let mut poller = Poller::new(
            increment(&executor, 10),
            Vec::new(),
            PollInterval::fixed(secs(0)),
        );

        assert!(poller.run(Shutdown::never()).await.is_err());
    }

    #[tokio::test]
    async fn test_backfill_runs_before_first_pass() {
        struct Backfilling(Increment<Arc<ScriptedExecutor>>, bool);

        #[async_trait]
        impl Strategy for Backfilling {
            fn table(&self) -> &TableRef {
                self.0.table()
            }

            async fn next_batch(&mut self) -> PgResult<Option<Vec<pgdrift_core::Row>>> {
                self.0.next_batch().await
            }

            async fn backfill_batch(&mut self) -> PgResult<Option<Vec<pgdrift_core::Row>>> {
                if std::mem::take(&mut self.1) {
                    Ok(Some(rows(100..102)))
                } else {
                    Ok(None)
                }
            }
        }

        let executor = Arc::new(ScriptedExecutor::new().respond(rows(1..2)));
        let (stop, shutdown) = Shutdown::channel();
        let sink = StopOnFirstRow { rows: Vec::new(), stop };

        let mut poller = Poller::new(
            Backfilling(increment(&executor, 10), true),
            sink,
            PollInterval::fixed(secs(0)),
        )
        .with_backfill(true);
        let stats = poller.run(shutdown).await.unwrap();

        // The stop requested during backfill is honoured before the first pass.
        assert_eq!(stats.backfilled, 2);
        assert_eq!(stats.passes, 0);
        assert_eq!(executor.remaining(), 1);
    }
}

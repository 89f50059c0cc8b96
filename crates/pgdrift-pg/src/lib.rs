pub mod catalog;
mod connect;
mod error;
pub mod executor;
pub mod poller;
pub mod replication;
pub mod retry;
mod rows;
pub mod sink;
pub mod sql;
pub mod strategy;

#[cfg(test)]
mod testing;

pub use catalog::{Catalog, CatalogColumn, ConvertedTuple};
pub use connect::connect_postgres;
pub use error::{PgError, PgResult};
pub use executor::{PgExecutor, QueryExecutor};
pub use poller::{PollInterval, PollStats, Poller, Shutdown};
pub use replication::{
    ensure_publication, ensure_slot, format_lsn, parse_lsn, ChangeAssembler, PgOutputDecoder,
    PgOutputMessage, ReplicationStream, ReplicationStreamConfig, StreamingBatch,
};
pub use retry::RetryPolicy;
pub use sink::RowSink;
pub use strategy::{Increment, Strategy, XminWindow};

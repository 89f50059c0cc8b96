//! Logical replication: the pgoutput wire format and a streaming client.

pub mod client;
pub mod encode;
pub mod lsn;
pub mod pgoutput;
pub mod publication;
pub mod relation_cache;
pub mod slot;

pub use client::{ChangeAssembler, ReplicationStream, ReplicationStreamConfig, StreamingBatch};
pub use lsn::{format_lsn, parse_lsn};
pub use pgoutput::{PgOutputDecoder, PgOutputMessage};
pub use publication::ensure_publication;
pub use relation_cache::RelationCache;
pub use slot::{confirmed_flush_lsn, ensure_slot};

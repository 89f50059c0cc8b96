pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{quote_ident, ChangeEvent, Operation, PolledRow, Row, TableRef, Value};

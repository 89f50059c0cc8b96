//! LSN (Log Sequence Number) text helpers.

use crate::error::{PgError, PgResult};

/// Parse an LSN from Postgres' "X/Y" text form.
pub fn parse_lsn(lsn: &str) -> PgResult<u64> {
    let (high, low) = lsn
        .split_once('/')
        .ok_or_else(|| PgError::InvalidLsn(lsn.to_string()))?;

    let high = u32::from_str_radix(high, 16).map_err(|_| PgError::InvalidLsn(lsn.to_string()))?;
    let low = u32::from_str_radix(low, 16).map_err(|_| PgError::InvalidLsn(lsn.to_string()))?;

    Ok(((high as u64) << 32) | low as u64)
}

/// Format an LSN as "X/Y".
pub fn format_lsn(lsn: u64) -> String {
    format!("{:X}/{:X}", lsn >> 32, lsn & 0xFFFF_FFFF)
}

//! Database record structures matching table schemas.

pub mod costs;
pub mod utilization;

//! Repository implementations backing the store traits.

pub mod costs;
pub mod utilization;

pub use costs::PgCostStore;
pub use utilization::PgUtilizationStore;

//! Pull-based query operators for the Quarry database.
//!
//! Plans are trees of [`Executor`]s: sequential scans at the leaves pull
//! pages through the buffer pool, and aggregation, insertion and deletion
//! sit above them. Everything runs on behalf of one transaction id.
//!
//! [`Executor`]: executor::Executor

/// Hash-grouped aggregation.
pub mod aggregate;
/// The delete driver.
pub mod delete;
/// Operator-level errors.
pub mod errors;
/// The operator contract.
pub mod executor;
/// The insert driver.
pub mod insert;
/// Sequential table scan.
pub mod seq_scan;
/// An operator over materialized tuples.
pub mod tuple_iterator;

pub use aggregate::{Aggregate, AggregateOp, IntAggregator, StrAggregator};
pub use delete::Delete;
pub use errors::{ExecError, ExecResult};
pub use executor::Executor;
pub use insert::Insert;
pub use seq_scan::SeqScan;
pub use tuple_iterator::TupleIterator;

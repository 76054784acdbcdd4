//! Cross-shard record routing.
//!
//! - [`categorize_by_input_shard`] and [`categorize_by_output_shard`] split
//!   batches of raw records by where they must be ordered and committed.
//! - [`TransactionPool`] accumulates cross-shard records on their output
//!   shard until every input shard has reported them.

mod classifier;
mod pool;

pub use classifier::{categorize_by_input_shard, categorize_by_output_shard, OutputRouting};
pub use pool::{PoolError, TransactionPool};

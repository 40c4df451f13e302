//! The contract between the change generator and whoever owns the pool of
//! spendable change outputs.

pub mod memory;
pub mod policy;

use std::future::Future;

use serde::{Deserialize, Serialize};

pub use memory::{MemoryChangePool, PoolError, PoolSession};
pub use policy::select_candidate;

/// Storage identifier of a stored change output.
pub type OutputId = i64;

/// A previously stored, unspent change output offered as funding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeInput {
    pub output_id: OutputId,
    pub satoshis: u64,
}

/// Run-scoped access to the shared change pool.
///
/// One allocator value serves exactly one generation run. Implementations
/// must make selection and claim a single atomic step so that two concurrent
/// runs can never hold the same output.
pub trait ChangeAllocator {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Claim one candidate for this run, or `None` if the pool has nothing
    /// left. Selection order: an exact `exact_satoshis` match, then the
    /// smallest candidate covering `target_satoshis`, then the largest one
    /// below it.
    fn allocate(
        &mut self,
        target_satoshis: u64,
        exact_satoshis: Option<u64>,
    ) -> impl Future<Output = Result<Option<ChangeInput>, Self::Error>> + Send;

    /// Return a candidate claimed by this run to the pool. Releasing anything
    /// this run does not hold is an error.
    fn release(
        &mut self,
        output_id: OutputId,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

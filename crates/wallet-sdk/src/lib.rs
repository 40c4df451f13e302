pub mod allocation;
pub mod error;
pub mod fee;
pub mod generator;
pub mod params;
pub mod random;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod validate;

// Core types
pub use error::{Error, Result};
pub use fee::{
    FeeModel, FeeModelKind, fee_target, input_size, output_size, transaction_size, var_uint_size,
};
pub use params::{
    ChangeOutput, FixedInput, FixedOutput, GenerateChangeParams, MAX_TARGET_NET_COUNT,
};

// Allocation contract
pub use allocation::{
    ChangeAllocator, ChangeInput, MemoryChangePool, OutputId, PoolError, PoolSession,
    select_candidate,
};

// Generation
pub use generator::{ChangeGenerator, GenerationResult, MAX_FUNDING_ROUNDS};
pub use random::RandomSource;
pub use validate::validate_generation_result;

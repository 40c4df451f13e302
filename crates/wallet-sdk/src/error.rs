use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The transaction cannot be balanced from the available change pool.
    #[error("insufficient funds: {required} satoshis required, short by {shortfall}")]
    InsufficientFunds { required: u64, shortfall: u64 },

    /// The generator produced a result that breaks its own accounting.
    /// Indicates a defect, not bad input.
    #[error("internal consistency failure: {0}")]
    InternalConsistency(String),

    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// Failure reported by the change allocator, passed through unchanged.
    #[error("change allocation failed: {0}")]
    Allocation(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    pub(crate) fn allocation<E>(e: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Allocation(Box::new(e))
    }

    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    /// `true` for errors the caller can fix by adding funds or shrinking the transaction.
    pub fn is_insufficient_funds(&self) -> bool {
        matches!(self, Error::InsufficientFunds { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

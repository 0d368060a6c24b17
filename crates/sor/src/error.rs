use {crate::swap, primitive_types::H160};

/// Failures of a route computation. Insufficient liquidity is not an error,
/// it yields an empty [`crate::SwapInfo`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid pool {pool}: {reason}")]
    InvalidPool { pool: String, reason: String },
    #[error("pool {pool} is missing {field}")]
    MissingField { pool: String, field: &'static str },
    #[error("token {token:?} is not traded by pool {pool}")]
    TokenNotInPool { pool: String, token: H160 },
    #[error("{0}")]
    Unsupported(&'static str),
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error(transparent)]
    Math(#[from] swap::error::Error),
}

impl Error {
    pub(crate) fn invalid_pool(pool: impl ToString, reason: impl ToString) -> Self {
        Self::InvalidPool {
            pool: pool.to_string(),
            reason: reason.to_string(),
        }
    }
}

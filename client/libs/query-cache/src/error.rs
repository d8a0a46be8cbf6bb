//! Cache error types

use instafram_common::ApiError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type CacheResult<T> = Result<T, CacheError>;

impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        ApiError::Decode(err.to_string())
    }
}

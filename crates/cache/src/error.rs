use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache capacity must be greater than zero")]
    ZeroCapacity,

    #[error("cache snapshot io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache snapshot encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

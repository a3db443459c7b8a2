//! Session persistence errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("mongo session store: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("redis session store: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("session payload: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("mongo session store requires MONGO_SESSION_STORE_URL")]
    MissingMongoUrl,
}

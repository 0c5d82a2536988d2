use thiserror::Error;

/// Crate-wide error taxonomy.
///
/// None of these are fatal to a running view: transport and payload problems
/// are logged and the poll is retried on the next tick.
#[derive(Debug, Error)]
pub enum Error {
    /// Network failure while talking to the gateway.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The remote reported an error through the `{error: ...}` envelope.
    #[error("remote error: {0}")]
    Remote(String),

    /// A payload was missing fields we cannot proceed without.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// A bulk fetch returned zero records.
    #[error("no data returned")]
    NoData,

    /// A synchronizer was used before its initial bulk fetch.
    #[error("series not initialized")]
    Uninitialized,

    #[error("store error: {0}")]
    Store(#[from] std::io::Error),

    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

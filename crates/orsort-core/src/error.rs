use thiserror::Error;

/// The five semantic error categories the pipeline can surface.
///
/// Every internal stage returns a `Result<_, SortError>`; there are no
/// silent retries and no partial success — once a stage returns an error
/// the content of the caller's output buffers is undefined.
#[derive(Debug, Error)]
pub enum SortError {
    #[error("transport failure talking to rank {peer}: {reason}")]
    Transport { peer: usize, reason: String },

    #[error("allocation failed for {0}")]
    Allocation(&'static str),

    #[error("entropy source failure: {0}")]
    Entropy(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("peer {rank} reported failure: {reason}")]
    PeerError { rank: usize, reason: String },
}

impl From<std::io::Error> for SortError {
    fn from(err: std::io::Error) -> Self {
        SortError::Transport {
            peer: usize::MAX,
            reason: err.to_string(),
        }
    }
}

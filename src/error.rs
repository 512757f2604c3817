//! Error types for the turn coordinator.

/// Top-level error type for the chatbot core.
#[derive(Debug, thiserror::Error)]
pub enum ZiraError {
    /// The response generator failed or panicked.
    #[error("generation failed: {0}")]
    Generation(String),

    /// The speech synthesizer failed or panicked.
    #[error("synthesis failed: {0}")]
    Synthesis(String),

    /// The worker pool queue is full and rejected the submission.
    #[error("worker queue saturated ({capacity} pending)")]
    QueueSaturated {
        /// Configured queue capacity.
        capacity: usize,
    },

    /// Input was empty or otherwise unusable; nothing was submitted.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The coordinator no longer accepts turns.
    #[error("coordinator is shutting down")]
    ShuttingDown,

    /// Worker pool could not be started or has stopped.
    #[error("worker pool error: {0}")]
    Pool(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, ZiraError>;

//! Error type shared by the library crates

/// Errors raised by scheduling, evaluation and the reference trainer
#[derive(Debug, thiserror::Error)]
pub enum PbtError {
    #[error("no evaluation workers available for {0} opponents")]
    NoWorkers(usize),

    #[error("cannot choose from an empty set: {0}")]
    EmptyChoice(&'static str),

    #[error("anneal value {0} outside [0, 1]")]
    AnnealOutOfRange(f64),

    #[error("unknown annealer: {0}")]
    UnknownAnnealer(String),

    #[error("unknown policy: {0}")]
    UnknownPolicy(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("worker failed: {0}")]
    Worker(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PbtError>;

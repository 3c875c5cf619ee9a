use thiserror::Error;

/// Error taxonomy for roster and log operations.
///
/// `Storage` is the only fatal class: the process must not keep running on a
/// broken store. Everything else is recoverable and is reported to observers
/// as a single error notice by the command layer.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("storage failure: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("User \"{0}\" already exists.")]
    DuplicateUser(String),

    #[error("User \"{0}\" not found.")]
    UserNotFound(String),

    #[error("{0}")]
    InvalidCommand(String),

    #[error("code artifact I/O failure: {0}")]
    Artifact(#[from] std::io::Error),

    #[error("code generation failed: {0}")]
    CodeGeneration(String),
}

//! Error types for the execution engine.

use thiserror::Error;

/// Boxed error carried as the cause inside terminal states.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while running a process.
#[derive(Debug, Error)]
pub enum ExecError {
    /// Spawning the underlying process failed.
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        /// The command line that failed to spawn.
        command: String,
        /// The OS-level failure.
        #[source]
        source: std::io::Error,
    },

    /// The process has not been started yet.
    #[error("process not started")]
    NotStarted,

    /// The process has already terminated.
    #[error("process already terminated")]
    AlreadyTerminated,

    /// Writing to the process's input stream failed.
    #[error("failed to write process input: {0}")]
    Input(#[source] std::io::Error),

    /// A pre-termination callback failed.
    #[error("pre-termination callback failed: {0}")]
    Callback(#[source] BoxError),

    /// The exit-state handler failed to classify the run.
    #[error("exit-state classification failed: {0}")]
    Classification(#[source] BoxError),

    /// Reaping the process's exit status failed.
    #[error("failed to reap process {pid}: {source}")]
    Reap {
        /// Pid of the process that could not be reaped.
        pid: u32,
        /// The OS-level failure.
        #[source]
        source: std::io::Error,
    },

    /// Signalling the process failed.
    #[error("failed to signal process {pid}: {message}")]
    Signal {
        /// Pid of the process that could not be signalled.
        pid: u32,
        /// The OS-level failure, rendered.
        message: String,
    },

    /// Capture-side failure.
    #[error(transparent)]
    Capture(#[from] foreman_io::IoError),
}

/// Result type alias for execution operations.
pub type Result<T> = std::result::Result<T, ExecError>;

//! Error types and failure classification for the docker layer.

use std::fmt;

use thiserror::Error;

/// Errors that can occur driving the docker CLI.
#[derive(Debug, Error)]
pub enum DockerError {
    /// docker not found in PATH.
    #[error("docker not found in PATH")]
    NotFound,

    /// A container name failed validation.
    #[error("invalid container name '{0}'")]
    InvalidName(String),

    /// The docker CLI reported a failure.
    #[error("docker command failed: {0}")]
    Failed(DockerFailure),

    /// The docker run could not be classified at all.
    #[error("docker command could not be classified: {0}")]
    Excepted(String),

    /// Failure from the underlying execution engine.
    #[error(transparent)]
    Exec(#[from] foreman_exec::ExecError),

    /// Unparseable CLI output.
    #[error("parse error: {0}")]
    Parse(String),
}

/// Result type alias for docker operations.
pub type Result<T> = std::result::Result<T, DockerError>;

/// Closed set of failures recognized in the docker CLI's error output.
///
/// Classification is data, not control flow: callers branch on these
/// uniformly, and text that matches no known pattern becomes
/// [`DockerFailure::Unknown`] instead of an opaque error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DockerFailure {
    /// The named container does not exist.
    NoSuchContainer(String),
    /// The container name is already taken.
    NameInUse(String),
    /// The container is running and cannot be removed without force.
    RemoveRunning(String),
    /// The container is paused and the operation conflicts with that.
    PauseConflict(String),
    /// The docker daemon cannot be reached.
    DaemonUnreachable(String),
    /// Error text that matches no known pattern.
    Unknown(String),
}

type FailureCtor = fn(String) -> DockerFailure;

/// Ordered (pattern, constructor) table; first match wins. Matching is
/// case-insensitive substring search over the raw error text.
const PATTERNS: &[(&str, FailureCtor)] = &[
    ("no such container", DockerFailure::NoSuchContainer),
    ("is already in use", DockerFailure::NameInUse),
    ("cannot remove a running container", DockerFailure::RemoveRunning),
    ("is paused", DockerFailure::PauseConflict),
    ("unpause the container", DockerFailure::PauseConflict),
    ("cannot connect to the docker daemon", DockerFailure::DaemonUnreachable),
    ("error during connect", DockerFailure::DaemonUnreachable),
];

impl DockerFailure {
    /// Classifies raw CLI error output against the known patterns.
    pub fn classify(stderr: &str) -> Self {
        let text = stderr.trim();
        let lower = text.to_lowercase();
        for (pattern, build) in PATTERNS {
            if lower.contains(pattern) {
                return build(text.to_string());
            }
        }
        DockerFailure::Unknown(text.to_string())
    }

    /// The raw error text this failure was classified from.
    pub fn message(&self) -> &str {
        match self {
            DockerFailure::NoSuchContainer(m)
            | DockerFailure::NameInUse(m)
            | DockerFailure::RemoveRunning(m)
            | DockerFailure::PauseConflict(m)
            | DockerFailure::DaemonUnreachable(m)
            | DockerFailure::Unknown(m) => m,
        }
    }
}

impl fmt::Display for DockerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DockerFailure::NoSuchContainer(_) => "no such container",
            DockerFailure::NameInUse(_) => "name already in use",
            DockerFailure::RemoveRunning(_) => "cannot remove running container",
            DockerFailure::PauseConflict(_) => "container is paused",
            DockerFailure::DaemonUnreachable(_) => "daemon unreachable",
            DockerFailure::Unknown(_) => "unknown error",
        };
        write!(f, "{} ({})", label, self.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_no_such_container() {
        let failure = DockerFailure::classify(
            "Error response from daemon: No such container: web-1",
        );
        assert!(matches!(failure, DockerFailure::NoSuchContainer(_)));
    }

    #[test]
    fn test_classify_name_in_use() {
        let failure = DockerFailure::classify(
            "Error response from daemon: Conflict. The container name \"/web-1\" is already in use by container \"abc123\".",
        );
        assert!(matches!(failure, DockerFailure::NameInUse(_)));
    }

    #[test]
    fn test_classify_remove_running() {
        let failure = DockerFailure::classify(
            "Error response from daemon: You cannot remove a running container abc123. Stop the container before attempting removal or force remove",
        );
        assert!(matches!(failure, DockerFailure::RemoveRunning(_)));
    }

    #[test]
    fn test_classify_paused() {
        let failure = DockerFailure::classify(
            "Error response from daemon: Container web-1 is paused. Unpause the container before stopping or killing",
        );
        assert!(matches!(failure, DockerFailure::PauseConflict(_)));
    }

    #[test]
    fn test_classify_daemon_unreachable() {
        let failure = DockerFailure::classify(
            "Cannot connect to the Docker daemon at unix:///var/run/docker.sock. Is the docker daemon running?",
        );
        assert!(matches!(failure, DockerFailure::DaemonUnreachable(_)));
    }

    #[test]
    fn test_unrecognized_text_falls_through_to_unknown() {
        let failure = DockerFailure::classify("something entirely novel went wrong");
        assert_eq!(
            failure,
            DockerFailure::Unknown("something entirely novel went wrong".to_string())
        );
    }

    #[test]
    fn test_classify_keeps_raw_message() {
        let raw = "Error response from daemon: No such container: api";
        assert_eq!(DockerFailure::classify(raw).message(), raw);
    }

    #[test]
    fn test_display_labels() {
        let failure = DockerFailure::classify("no such container: x");
        assert!(failure.to_string().starts_with("no such container"));
        let failure = DockerFailure::Unknown("weird".into());
        assert!(failure.to_string().starts_with("unknown error"));
    }
}

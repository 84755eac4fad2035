//! Container states parsed from docker CLI output.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DockerError, Result};

/// State of a docker container as reported by the CLI.
///
/// Always re-derived from the runtime on demand; see
/// [`Container::state`](crate::Container::state).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerState {
    /// No container with the queried name exists.
    NotExistent,
    /// Created but never started.
    Created,
    /// Currently running.
    Running,
    /// Restarting under a restart policy.
    Restarting,
    /// Paused.
    Paused,
    /// Being removed.
    Removing,
    /// Exited; the code is taken from the status column when present.
    Exited {
        /// Exit code parsed from `Exited (N) ...`, when the column carried
        /// one.
        exit_code: Option<i32>,
    },
    /// Dead (the daemon failed to fully remove it).
    Dead,
    /// The CLI reported a state this layer does not recognize.
    Error {
        /// The unrecognized state token.
        message: String,
    },
}

impl ContainerState {
    /// Parses one `name<TAB>state<TAB>status` line of `docker ps` output,
    /// as produced by `--format '{{.Names}}\t{{.State}}\t{{.Status}}'`.
    pub fn parse_line(line: &str) -> Result<(String, Self)> {
        let mut fields = line.split('\t');
        let name = fields
            .next()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| DockerError::Parse(format!("missing container name: {line:?}")))?;
        let state = fields
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| DockerError::Parse(format!("missing container state: {line:?}")))?;
        let status = fields.next().unwrap_or_default();

        let state = match state.to_lowercase().as_str() {
            "created" => ContainerState::Created,
            "running" | "up" => ContainerState::Running,
            "restarting" => ContainerState::Restarting,
            "paused" => ContainerState::Paused,
            "removing" => ContainerState::Removing,
            "exited" => ContainerState::Exited {
                exit_code: parse_exit_code(status),
            },
            "dead" => ContainerState::Dead,
            other => ContainerState::Error {
                message: other.to_string(),
            },
        };
        Ok((name.to_string(), state))
    }

    /// Whether the container exists at all.
    pub fn exists(&self) -> bool {
        !matches!(self, ContainerState::NotExistent)
    }

    /// Whether the container is currently running.
    pub fn is_running(&self) -> bool {
        matches!(self, ContainerState::Running)
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerState::NotExistent => f.write_str("not existent"),
            ContainerState::Created => f.write_str("created"),
            ContainerState::Running => f.write_str("running"),
            ContainerState::Restarting => f.write_str("restarting"),
            ContainerState::Paused => f.write_str("paused"),
            ContainerState::Removing => f.write_str("removing"),
            ContainerState::Exited { exit_code: Some(code) } => write!(f, "exited ({code})"),
            ContainerState::Exited { exit_code: None } => f.write_str("exited"),
            ContainerState::Dead => f.write_str("dead"),
            ContainerState::Error { message } => write!(f, "error: {message}"),
        }
    }
}

/// Pulls the code out of an `Exited (N) ...` status column.
fn parse_exit_code(status: &str) -> Option<i32> {
    let open = status.find('(')?;
    let rest = &status[open + 1..];
    let close = rest.find(')')?;
    rest[..close].trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_running_line() {
        let (name, state) = ContainerState::parse_line("web-1\trunning\tUp 5 seconds").unwrap();
        assert_eq!(name, "web-1");
        assert_eq!(state, ContainerState::Running);
        assert!(state.is_running());
        assert!(state.exists());
    }

    #[test]
    fn test_parse_exited_line_extracts_code() {
        let (_, state) =
            ContainerState::parse_line("job\texited\tExited (42) 3 seconds ago").unwrap();
        assert_eq!(
            state,
            ContainerState::Exited {
                exit_code: Some(42)
            }
        );
        assert_eq!(state.to_string(), "exited (42)");
    }

    #[test]
    fn test_parse_exited_line_without_code() {
        let (_, state) = ContainerState::parse_line("job\texited\t").unwrap();
        assert_eq!(state, ContainerState::Exited { exit_code: None });
    }

    #[test]
    fn test_parse_exited_line_missing_status_column() {
        let (_, state) = ContainerState::parse_line("job\texited").unwrap();
        assert_eq!(state, ContainerState::Exited { exit_code: None });
    }

    #[test]
    fn test_parse_all_plain_states() {
        for (token, expected) in [
            ("created", ContainerState::Created),
            ("restarting", ContainerState::Restarting),
            ("paused", ContainerState::Paused),
            ("removing", ContainerState::Removing),
            ("dead", ContainerState::Dead),
        ] {
            let (_, state) =
                ContainerState::parse_line(&format!("c\t{token}\tirrelevant")).unwrap();
            assert_eq!(state, expected);
        }
    }

    #[test]
    fn test_unknown_state_token_becomes_error() {
        let (_, state) = ContainerState::parse_line("c\tglitching\t?").unwrap();
        assert_eq!(
            state,
            ContainerState::Error {
                message: "glitching".to_string()
            }
        );
        assert!(state.exists());
        assert!(!state.is_running());
    }

    #[test]
    fn test_parse_rejects_malformed_lines() {
        assert!(ContainerState::parse_line("").is_err());
        assert!(ContainerState::parse_line("name-only").is_err());
        assert!(ContainerState::parse_line("\trunning\tUp").is_err());
    }

    #[test]
    fn test_exit_code_parse_edge_cases() {
        assert_eq!(parse_exit_code("Exited (0) 2 hours ago"), Some(0));
        assert_eq!(parse_exit_code("Exited (137) 1 second ago"), Some(137));
        assert_eq!(parse_exit_code("no parentheses"), None);
        assert_eq!(parse_exit_code("Exited (not-a-number)"), None);
    }

    #[test]
    fn test_not_existent_does_not_exist() {
        assert!(!ContainerState::NotExistent.exists());
        assert!(!ContainerState::NotExistent.is_running());
    }
}

//! Locating and invoking the docker CLI.

use std::path::{Path, PathBuf};

use tracing::{debug, trace, warn};
use which::which;

use foreman_exec::{CommandSpec, Executor, ExitState};
use foreman_io::IoKind;

use crate::error::{DockerError, DockerFailure, Result};
use crate::name::ContainerName;
use crate::state::ContainerState;

/// Locator and command factory for the docker binary.
///
/// All communication with the container runtime goes through its
/// command-line interface; the only wire format this layer understands is
/// docker's tab-separated, line-per-entity text output.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: PathBuf,
}

impl DockerCli {
    /// Locates docker in PATH.
    ///
    /// # Errors
    ///
    /// Returns [`DockerError::NotFound`] if docker is not available.
    pub fn new() -> Result<Self> {
        let binary = which("docker").map_err(|_| DockerError::NotFound)?;
        debug!(path = %binary.display(), "docker found");
        Ok(Self { binary })
    }

    /// Uses an explicit binary path instead of searching PATH.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Checks whether docker is available in PATH.
    pub fn is_available() -> bool {
        which("docker").is_ok()
    }

    /// Path of the docker binary this CLI drives.
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Builds a command spec for a docker invocation.
    pub(crate) fn command<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec::new(self.binary.to_string_lossy()).args(args)
    }

    /// Runs a docker command to completion as a short-lived Exec.
    ///
    /// Success returns the captured standard output; a CLI failure has its
    /// error output classified into a [`DockerFailure`].
    pub(crate) fn run<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let spec = self.command(args);
        trace!(command = %spec, "running docker command");
        let execution = Executor::new().execute(spec)?;
        let state = execution.wait()?;
        match &*state {
            ExitState::Succeeded { io, .. } => {
                let stdout: Vec<&str> = io
                    .iter()
                    .filter(|e| e.kind() == IoKind::Output)
                    .map(|e| e.text())
                    .collect();
                Ok(stdout.join("\n"))
            }
            ExitState::Failed { io, .. } => {
                let stderr: Vec<&str> = io
                    .iter()
                    .filter(|e| e.kind() == IoKind::Error)
                    .map(|e| e.text())
                    .collect();
                Err(DockerError::Failed(DockerFailure::classify(
                    &stderr.join("\n"),
                )))
            }
            ExitState::Excepted { cause, .. } => Err(DockerError::Excepted(cause.to_string())),
        }
    }

    // ==================== Queries ====================

    /// Queries the state of the named container.
    ///
    /// A name with no matching `docker ps` line is
    /// [`ContainerState::NotExistent`], not an error.
    pub fn container_state(&self, name: &ContainerName) -> Result<ContainerState> {
        let stdout = self.run([
            "ps".to_string(),
            "--all".to_string(),
            "--filter".to_string(),
            format!("name={name}"),
            "--format".to_string(),
            "{{.Names}}\t{{.State}}\t{{.Status}}".to_string(),
        ])?;

        // The name filter matches substrings, so compare exactly.
        for line in stdout.lines().filter(|l| !l.is_empty()) {
            match ContainerState::parse_line(line) {
                Ok((candidate, state)) if candidate == name.as_str() => return Ok(state),
                Ok(_) => {}
                Err(e) => warn!(line = %line, error = %e, "failed to parse container line"),
            }
        }
        Ok(ContainerState::NotExistent)
    }

    /// Lists all containers with their states.
    pub fn list_containers(&self) -> Result<Vec<(String, ContainerState)>> {
        let stdout = self.run([
            "ps",
            "--all",
            "--format",
            "{{.Names}}\t{{.State}}\t{{.Status}}",
        ])?;

        let mut containers = Vec::new();
        for line in stdout.lines().filter(|l| !l.is_empty()) {
            match ContainerState::parse_line(line) {
                Ok(entry) => containers.push(entry),
                Err(e) => warn!(line = %line, error = %e, "failed to parse container line"),
            }
        }
        Ok(containers)
    }
}

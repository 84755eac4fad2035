//! Container lifecycle driven through the docker CLI.

use std::sync::RwLock;
use std::time::Duration;

use tracing::debug;

use crate::cli::DockerCli;
use crate::error::Result;
use crate::name::ContainerName;
use crate::state::ContainerState;

/// A named docker container with an opportunistically cached state.
///
/// The state is re-derived from the runtime on every [`state`](Self::state)
/// query; the cache only remembers the last answer and is never refreshed in
/// the background, so staleness is exactly as old as the caller's last
/// query. Lifecycle operations are each a short-lived Exec against the
/// docker CLI.
#[derive(Debug)]
pub struct Container {
    name: ContainerName,
    cli: DockerCli,
    last_known_state: RwLock<Option<ContainerState>>,
}

impl Container {
    /// Creates a handle for the named container. No runtime call is made;
    /// the container may or may not exist.
    pub fn new(cli: DockerCli, name: ContainerName) -> Self {
        Self {
            name,
            cli,
            last_known_state: RwLock::new(None),
        }
    }

    /// The container's name.
    pub fn name(&self) -> &ContainerName {
        &self.name
    }

    /// The last state a query returned, without asking the runtime again.
    pub fn last_known_state(&self) -> Option<ContainerState> {
        match self.last_known_state.read() {
            Ok(cache) => cache.clone(),
            Err(_) => None,
        }
    }

    /// Queries the runtime for the current state and refreshes the cache.
    pub fn state(&self) -> Result<ContainerState> {
        let state = self.cli.container_state(&self.name)?;
        if let Ok(mut cache) = self.last_known_state.write() {
            *cache = Some(state.clone());
        }
        Ok(state)
    }

    /// Whether a container with this name exists at all.
    pub fn exists(&self) -> Result<bool> {
        Ok(self.state()?.exists())
    }

    /// Whether the container is currently running.
    pub fn is_running(&self) -> Result<bool> {
        Ok(self.state()?.is_running())
    }

    // ==================== Lifecycle ====================

    /// Starts the container.
    pub fn start(&self) -> Result<()> {
        debug!(name = %self.name, "starting container");
        self.cli.run(["start", self.name.as_str()]).map(drop)
    }

    /// Stops the container cooperatively.
    ///
    /// `timeout` overrides the daemon's grace period before it falls back
    /// to killing; `None` defers to the daemon's default.
    pub fn stop(&self, timeout: Option<Duration>) -> Result<()> {
        debug!(name = %self.name, timeout = ?timeout, "stopping container");
        let mut args = vec!["stop".to_string()];
        if let Some(timeout) = timeout {
            args.push("--time".to_string());
            args.push(timeout.as_secs().to_string());
        }
        args.push(self.name.to_string());
        self.cli.run(args).map(drop)
    }

    /// Kills the container, optionally with a specific signal.
    pub fn kill(&self, signal: Option<&str>) -> Result<()> {
        debug!(name = %self.name, signal = ?signal, "killing container");
        let mut args = vec!["kill".to_string()];
        if let Some(signal) = signal {
            args.push("--signal".to_string());
            args.push(signal.to_string());
        }
        args.push(self.name.to_string());
        self.cli.run(args).map(drop)
    }

    /// Removes the container; `force` removes a running one.
    pub fn remove(&self, force: bool) -> Result<()> {
        debug!(name = %self.name, force, "removing container");
        let mut args = vec!["rm".to_string()];
        if force {
            args.push("--force".to_string());
        }
        args.push(self.name.to_string());
        self.cli.run(args).map(drop)
    }
}

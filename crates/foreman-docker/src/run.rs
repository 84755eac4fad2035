//! Container-backed process runs.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use foreman_exec::{
    render_dump, BoxError, CommandSpec, Exec, Executor, ExitContext, ExitState, ExitStateHandler,
    ProcessingMode, DEFAULT_DUMP_TAIL,
};
use foreman_io::IoKind;

use crate::cli::DockerCli;
use crate::container::Container;
use crate::error::{DockerFailure, Result};
use crate::name::ContainerName;

/// Description of a `docker run` invocation, assembled with a fluent API.
#[derive(Debug, Clone)]
pub struct DockerRun {
    image: String,
    name: ContainerName,
    command: Option<String>,
    args: Vec<String>,
    env: Vec<(String, String)>,
    volumes: Vec<(PathBuf, String)>,
    working_dir: Option<String>,
    auto_remove: bool,
    interactive: bool,
}

impl DockerRun {
    /// Starts a run description for `image`.
    ///
    /// The container name defaults to the sanitized image name plus a
    /// random suffix; override it with [`name`](Self::name).
    pub fn image(image: impl Into<String>) -> Self {
        let image = image.into();
        let suffix = Uuid::new_v4().simple().to_string();
        let name = ContainerName::sanitized(&format!("{}-{}", image, &suffix[..8]));
        Self {
            image,
            name,
            command: None,
            args: Vec::new(),
            env: Vec::new(),
            volumes: Vec::new(),
            working_dir: None,
            auto_remove: false,
            interactive: false,
        }
    }

    /// Sets the container name.
    pub fn name(mut self, name: ContainerName) -> Self {
        self.name = name;
        self
    }

    /// Sets the command run inside the container.
    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Appends one command argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several command arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets one environment variable inside the container.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Mounts a host path into the container.
    pub fn volume(mut self, host: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        self.volumes.push((host.into(), container.into()));
        self
    }

    /// Sets the working directory inside the container.
    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Removes the container automatically when it exits.
    pub fn auto_remove(mut self, auto_remove: bool) -> Self {
        self.auto_remove = auto_remove;
        self
    }

    /// Keeps the container's input stream open for interactive writes.
    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    /// The container name this run will use.
    pub fn container_name(&self) -> &ContainerName {
        &self.name
    }

    /// The docker CLI invocation for this run.
    pub fn to_spec(&self, cli: &DockerCli) -> CommandSpec {
        let mut args = vec!["run".to_string(), "--name".to_string(), self.name.to_string()];
        if self.auto_remove {
            args.push("--rm".to_string());
        }
        if self.interactive {
            args.push("--interactive".to_string());
        }
        if let Some(dir) = &self.working_dir {
            args.push("--workdir".to_string());
            args.push(dir.clone());
        }
        for (key, value) in &self.env {
            args.push("--env".to_string());
            args.push(format!("{key}={value}"));
        }
        for (host, container) in &self.volumes {
            args.push("--volume".to_string());
            args.push(format!("{}:{}", host.display(), container));
        }
        args.push(self.image.clone());
        if let Some(command) = &self.command {
            args.push(command.clone());
            args.extend(self.args.iter().cloned());
        }
        cli.command(args)
    }
}

/// Exit-state classification aware of the docker CLI's own exit codes.
///
/// 125 is a daemon/CLI failure, 126 a non-invocable command, 127 a missing
/// command; anything else is the containerized process's own exit code. For
/// the CLI's codes the captured error output is classified into the known
/// failure patterns and named in the dump.
#[derive(Debug, Default, Clone, Copy)]
pub struct DockerExitHandler;

impl ExitStateHandler for DockerExitHandler {
    fn classify(&self, ctx: ExitContext<'_>) -> std::result::Result<ExitState, BoxError> {
        if ctx.exit_code == 0 {
            return Ok(ExitState::Succeeded {
                pid: ctx.pid,
                io: ctx.io.to_vec(),
            });
        }

        let runtime_failure = if matches!(ctx.exit_code, 125 | 126 | 127) {
            let stderr: Vec<&str> = ctx
                .io
                .iter()
                .filter(|e| e.kind() == IoKind::Error)
                .map(|e| e.text())
                .collect();
            Some(DockerFailure::classify(&stderr.join("\n")))
        } else {
            None
        };

        let dump = render_dump(
            ctx.command,
            Some(ctx.pid),
            Some(ctx.exit_code),
            runtime_failure.as_ref().map(|f| f as &dyn std::fmt::Display),
            ctx.io,
            DEFAULT_DUMP_TAIL,
        );
        Ok(ExitState::Failed {
            pid: ctx.pid,
            exit_code: ctx.exit_code,
            io: ctx.io.to_vec(),
            dump,
        })
    }
}

/// A container-backed process run.
///
/// The underlying [`Exec`] drives the docker CLI client; `stop` and `kill`
/// route through the container lifecycle, so the containerized process — not
/// just the CLI client — is terminated. The referenced [`Container`] remains
/// independently queryable.
#[derive(Debug)]
pub struct DockerExec {
    exec: Exec,
    container: Container,
}

impl DockerExec {
    /// Spawns the container run; returns immediately with the handle.
    pub fn spawn(cli: &DockerCli, run: DockerRun) -> Result<Self> {
        let mode = if run.interactive {
            ProcessingMode::asynchronous().interactive(true)
        } else {
            ProcessingMode::asynchronous()
        };
        let spec = run.to_spec(cli);
        debug!(name = %run.name, command = %spec, "spawning container run");

        let execution = Executor::new()
            .with_mode(mode)
            .with_handler(Arc::new(DockerExitHandler))
            .execute(spec)?;

        Ok(Self {
            exec: execution.exec().clone(),
            container: Container::new(cli.clone(), run.name),
        })
    }

    /// The underlying run handle.
    pub fn exec(&self) -> &Exec {
        &self.exec
    }

    /// The referenced container, independently queryable.
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Blocks until the containerized process finishes.
    pub fn wait_for(&self) -> foreman_exec::Result<Arc<ExitState>> {
        self.exec.wait_for()
    }

    /// Stops the container cooperatively; the Exec then resolves on its
    /// own. A no-op once the run has terminated.
    pub fn stop(&self, timeout: Option<Duration>) -> Result<()> {
        if self.exec.exit_state().is_some() {
            return Ok(());
        }
        self.container.stop(timeout)
    }

    /// Kills the container. A no-op once the run has terminated.
    pub fn kill(&self, signal: Option<&str>) -> Result<()> {
        if self.exec.exit_state().is_some() {
            return Ok(());
        }
        self.container.kill(signal)
    }
}

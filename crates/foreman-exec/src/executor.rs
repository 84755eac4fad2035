//! Configuration-driven execution strategies.

use std::sync::Arc;
use std::time::Duration;

use foreman_io::IoEvent;

use crate::command::CommandSpec;
use crate::error::Result;
use crate::exec::{Exec, Processor};
use crate::state::{DefaultExitHandler, ExitState, ExitStateHandler, DEFAULT_DUMP_TAIL};

/// Whether execution blocks the calling thread until termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Synchronicity {
    /// The calling thread blocks until termination; the terminal state is
    /// available on the returned execution.
    #[default]
    Sync,
    /// Spawning returns immediately; termination is awaited later through
    /// the exec handle.
    Async,
}

/// How the caller consumes a run's streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interactivity {
    /// Input (if any) is written once and closed; output is drained to
    /// completion with no further interaction.
    NonInteractive {
        /// Canned input written before the input stream closes.
        input: Option<String>,
    },
    /// The caller keeps writing input while output is drained.
    Interactive {
        /// Drain through the non-blocking reader, surfacing partial lines
        /// as events, instead of the simpler blocking line reader.
        non_blocking: bool,
    },
}

impl Default for Interactivity {
    fn default() -> Self {
        Interactivity::NonInteractive { input: None }
    }
}

/// Combined processing strategy for one run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessingMode {
    /// Whether execution blocks until termination.
    pub synchronicity: Synchronicity,
    /// How the run's streams are consumed.
    pub interactivity: Interactivity,
}

impl ProcessingMode {
    /// Synchronous, non-interactive processing — the default.
    pub fn sync() -> Self {
        Self::default()
    }

    /// Asynchronous, non-interactive processing.
    pub fn asynchronous() -> Self {
        Self {
            synchronicity: Synchronicity::Async,
            ..Self::default()
        }
    }

    /// Sets canned input for a non-interactive run.
    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.interactivity = Interactivity::NonInteractive {
            input: Some(input.into()),
        };
        self
    }

    /// Switches to interactive stream consumption.
    pub fn interactive(mut self, non_blocking: bool) -> Self {
        self.interactivity = Interactivity::Interactive { non_blocking };
        self
    }
}

/// Tunables for the execution engine.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Window the non-blocking reader waits per read attempt. This is the
    /// only timeout in the engine; total-runtime limits are the caller's
    /// concern.
    pub read_timeout: Duration,
    /// Trailing IO events embedded in diagnostic dumps.
    pub dump_tail: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(100),
            dump_tail: DEFAULT_DUMP_TAIL,
        }
    }
}

impl ExecutorConfig {
    /// Creates a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the non-blocking read window.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Sets how many trailing IO events dumps embed.
    pub fn with_dump_tail(mut self, tail: usize) -> Self {
        self.dump_tail = tail;
        self
    }
}

/// Runs command specs according to a processing mode.
///
/// # Example
///
/// ```no_run
/// use foreman_exec::{CommandSpec, Executor};
///
/// let execution = Executor::new()
///     .execute(CommandSpec::new("echo").arg("hello"))
///     .unwrap();
/// assert!(execution.exit_state().unwrap().successful());
/// ```
#[derive(Default)]
pub struct Executor {
    config: ExecutorConfig,
    mode: ProcessingMode,
    processor: Option<Processor>,
    handler: Option<Arc<dyn ExitStateHandler>>,
}

impl Executor {
    /// Creates an executor with default config and mode (sync,
    /// non-interactive, no processor, default exit handler).
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the engine tunables.
    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Overrides the processing mode.
    pub fn with_mode(mut self, mode: ProcessingMode) -> Self {
        self.mode = mode;
        self
    }

    /// Installs a processor invoked once per IO event, in ledger order.
    pub fn with_processor<F>(mut self, processor: F) -> Self
    where
        F: Fn(&IoEvent) + Send + Sync + 'static,
    {
        self.processor = Some(Arc::new(processor));
        self
    }

    /// Overrides the exit-state classification.
    pub fn with_handler(mut self, handler: Arc<dyn ExitStateHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Spawns `command` according to the configured mode.
    ///
    /// In [`Synchronicity::Sync`] the call blocks until termination and the
    /// terminal state is available on the returned execution; in
    /// [`Synchronicity::Async`] it returns immediately.
    pub fn execute(&self, command: CommandSpec) -> Result<Execution> {
        let handler = self
            .handler
            .clone()
            .unwrap_or_else(|| Arc::new(DefaultExitHandler::with_tail(self.config.dump_tail)));
        let exec = Exec::new(
            command,
            self.config.clone(),
            self.mode.interactivity.clone(),
            self.processor.clone(),
            handler,
        );
        exec.start()?;
        let exit = match self.mode.synchronicity {
            Synchronicity::Sync => Some(exec.wait_for()?),
            Synchronicity::Async => None,
        };
        Ok(Execution { exec, exit })
    }
}

/// Outcome of [`Executor::execute`].
#[derive(Debug)]
pub struct Execution {
    exec: Exec,
    exit: Option<Arc<ExitState>>,
}

impl Execution {
    /// The run handle.
    pub fn exec(&self) -> &Exec {
        &self.exec
    }

    /// The terminal state, present after a synchronous run.
    pub fn exit_state(&self) -> Option<&Arc<ExitState>> {
        self.exit.as_ref()
    }

    /// Waits for termination; immediate when the run was synchronous.
    pub fn wait(&self) -> Result<Arc<ExitState>> {
        match &self.exit {
            Some(state) => Ok(Arc::clone(state)),
            None => self.exec.wait_for(),
        }
    }
}

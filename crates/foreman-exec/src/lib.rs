//! Process execution and lifecycle engine for Foreman.
//!
//! This crate spawns external programs and reconciles the OS's blocking
//! process APIs with incremental, race-free consumption of their output:
//! - [`CommandSpec`]: the resolved command description the engine consumes
//! - [`Exec`]: the handle for one run — lifecycle, streams, captured IO
//! - [`ExitState`]: the terminal classification, resolved exactly once
//! - [`Executor`] / [`ProcessingMode`]: sync/async × interactive/
//!   non-interactive strategies with a per-event processor
//!
//! # Example
//!
//! ```no_run
//! use foreman_exec::{CommandSpec, Executor, ProcessingMode};
//!
//! // Synchronous: the terminal state is the result.
//! let execution = Executor::new()
//!     .execute(CommandSpec::new("echo").arg("hello"))
//!     .unwrap();
//! assert!(execution.exit_state().unwrap().successful());
//!
//! // Asynchronous: spawn now, wait later.
//! let execution = Executor::new()
//!     .with_mode(ProcessingMode::asynchronous())
//!     .execute(CommandSpec::new("sleep").arg("5"))
//!     .unwrap();
//! let exec = execution.exec().clone();
//! exec.stop().unwrap();
//! let state = exec.wait_for().unwrap();
//! assert!(!state.successful());
//! ```

pub mod command;
pub mod error;
pub mod exec;
pub mod executor;
pub mod state;
pub mod termination;

pub use command::CommandSpec;
pub use error::{BoxError, ExecError, Result};
pub use exec::{Exec, PreTerminationCallback, Processor, TerminationCallback};
pub use executor::{Execution, Executor, ExecutorConfig, Interactivity, ProcessingMode, Synchronicity};
pub use state::{
    render_dump, DefaultExitHandler, ExitContext, ExitState, ExitStateHandler, DEFAULT_DUMP_TAIL,
};
pub use termination::TerminationHandle;

//! Terminal classification of a finished run.

use std::fmt;
use std::sync::Arc;

use foreman_io::IoEvent;

use crate::command::CommandSpec;
use crate::error::{BoxError, ExecError};

/// Default number of trailing IO events embedded in a diagnostic dump.
pub const DEFAULT_DUMP_TAIL: usize = 10;

/// Terminal state of a finished run.
///
/// Monotonic: an Exec resolves to exactly one of these, which is then cached
/// and shared with every observer.
#[derive(Debug)]
pub enum ExitState {
    /// The process exited with code 0.
    Succeeded {
        /// OS process id of the run.
        pid: u32,
        /// Snapshot of the run's captured IO.
        io: Vec<Arc<IoEvent>>,
    },
    /// The process exited with a non-zero code.
    Failed {
        /// OS process id of the run.
        pid: u32,
        /// The non-zero exit code.
        exit_code: i32,
        /// Snapshot of the run's captured IO.
        io: Vec<Arc<IoEvent>>,
        /// Human-readable diagnostic dump.
        dump: String,
    },
    /// The run could not be classified: spawning, stream handling, a
    /// callback, or classification itself failed.
    Excepted {
        /// Pid, when the process got far enough to have one.
        pid: Option<u32>,
        /// Exit code, when it was reaped before the failure. Recorded for
        /// inspection; deliberately not used for classification.
        exit_code: Option<i32>,
        /// Snapshot of the run's captured IO.
        io: Vec<Arc<IoEvent>>,
        /// The original failure.
        cause: ExecError,
        /// Human-readable diagnostic dump.
        dump: String,
    },
}

impl ExitState {
    /// Whether the run succeeded.
    pub fn successful(&self) -> bool {
        matches!(self, ExitState::Succeeded { .. })
    }

    /// The pid, when the process got far enough to have one.
    pub fn pid(&self) -> Option<u32> {
        match self {
            ExitState::Succeeded { pid, .. } | ExitState::Failed { pid, .. } => Some(*pid),
            ExitState::Excepted { pid, .. } => *pid,
        }
    }

    /// The exit code, when one was observed.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ExitState::Succeeded { .. } => Some(0),
            ExitState::Failed { exit_code, .. } => Some(*exit_code),
            ExitState::Excepted { exit_code, .. } => *exit_code,
        }
    }

    /// The IO captured up to termination.
    pub fn io(&self) -> &[Arc<IoEvent>] {
        match self {
            ExitState::Succeeded { io, .. }
            | ExitState::Failed { io, .. }
            | ExitState::Excepted { io, .. } => io,
        }
    }

    /// The diagnostic dump; empty for successful runs.
    pub fn dump(&self) -> &str {
        match self {
            ExitState::Succeeded { .. } => "",
            ExitState::Failed { dump, .. } | ExitState::Excepted { dump, .. } => dump,
        }
    }

    /// The original failure, for excepted runs.
    pub fn cause(&self) -> Option<&ExecError> {
        match self {
            ExitState::Excepted { cause, .. } => Some(cause),
            _ => None,
        }
    }
}

impl fmt::Display for ExitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitState::Succeeded { pid, .. } => write!(f, "succeeded (pid {pid})"),
            ExitState::Failed { pid, exit_code, .. } => {
                write!(f, "failed with exit code {exit_code} (pid {pid})")
            }
            ExitState::Excepted { cause, .. } => write!(f, "excepted: {cause}"),
        }
    }
}

/// Everything an exit-state handler sees about a finished process.
#[derive(Debug)]
pub struct ExitContext<'a> {
    /// OS process id of the run.
    pub pid: u32,
    /// The reaped exit code.
    pub exit_code: i32,
    /// The command that was run.
    pub command: &'a CommandSpec,
    /// The IO captured up to termination.
    pub io: &'a [Arc<IoEvent>],
}

/// Pluggable classification of a finished process into an [`ExitState`].
///
/// An error here never hangs the run: the Exec terminates as
/// [`ExitState::Excepted`] carrying the handler failure as cause.
pub trait ExitStateHandler: Send + Sync {
    /// Classifies the finished process.
    fn classify(&self, ctx: ExitContext<'_>) -> std::result::Result<ExitState, BoxError>;
}

/// Default classification: exit code 0 is success, anything else a failure
/// with a diagnostic dump.
#[derive(Debug, Clone, Copy)]
pub struct DefaultExitHandler {
    tail: usize,
}

impl DefaultExitHandler {
    /// Creates a handler embedding the default IO tail in dumps.
    pub fn new() -> Self {
        Self {
            tail: DEFAULT_DUMP_TAIL,
        }
    }

    /// Overrides how many trailing IO events dumps embed.
    pub fn with_tail(tail: usize) -> Self {
        Self { tail }
    }
}

impl Default for DefaultExitHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ExitStateHandler for DefaultExitHandler {
    fn classify(&self, ctx: ExitContext<'_>) -> std::result::Result<ExitState, BoxError> {
        if ctx.exit_code == 0 {
            Ok(ExitState::Succeeded {
                pid: ctx.pid,
                io: ctx.io.to_vec(),
            })
        } else {
            let dump = render_dump(
                ctx.command,
                Some(ctx.pid),
                Some(ctx.exit_code),
                None,
                ctx.io,
                self.tail,
            );
            Ok(ExitState::Failed {
                pid: ctx.pid,
                exit_code: ctx.exit_code,
                io: ctx.io.to_vec(),
                dump,
            })
        }
    }
}

/// Renders the human-readable diagnostic dump embedded in failure states.
///
/// The dump names the command line and its attached files, the pid and exit
/// code when known, the failure cause when there is one, and the last `tail`
/// captured IO events — enough to understand the run without re-running it.
pub fn render_dump(
    command: &CommandSpec,
    pid: Option<u32>,
    exit_code: Option<i32>,
    cause: Option<&dyn fmt::Display>,
    io: &[Arc<IoEvent>],
    tail: usize,
) -> String {
    let mut lines = vec![format!("command: {}", command.command_line())];
    if !command.attachments().is_empty() {
        let attachments: Vec<String> = command
            .attachments()
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        lines.push(format!("attachments: {}", attachments.join(", ")));
    }
    if let Some(pid) = pid {
        lines.push(format!("pid: {pid}"));
    }
    if let Some(code) = exit_code {
        lines.push(format!("exit code: {code}"));
    }
    if let Some(cause) = cause {
        lines.push(format!("cause: {cause}"));
    }
    let skip = io.len().saturating_sub(tail);
    if io.len() > skip {
        lines.push("last io:".to_string());
        for event in &io[skip..] {
            lines.push(format!("  {event}"));
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use foreman_io::{IoKind, IoLedger};

    fn sample_io() -> Vec<Arc<IoEvent>> {
        let ledger = IoLedger::new();
        ledger.record(IoKind::Output, "building").unwrap();
        ledger.record(IoKind::Error, "warning: deprecated").unwrap();
        ledger.events()
    }

    #[test]
    fn test_zero_exit_code_is_success() {
        let command = CommandSpec::new("true");
        let state = DefaultExitHandler::new()
            .classify(ExitContext {
                pid: 42,
                exit_code: 0,
                command: &command,
                io: &sample_io(),
            })
            .unwrap();

        assert!(state.successful());
        assert_eq!(state.pid(), Some(42));
        assert_eq!(state.exit_code(), Some(0));
        assert!(state.dump().is_empty());
        assert_eq!(state.io().len(), 2);
    }

    #[test]
    fn test_nonzero_exit_code_fails_with_dump() {
        let command = CommandSpec::new("sh").arg("-c").arg("exit 42");
        let state = DefaultExitHandler::new()
            .classify(ExitContext {
                pid: 7,
                exit_code: 42,
                command: &command,
                io: &sample_io(),
            })
            .unwrap();

        assert!(!state.successful());
        assert_eq!(state.exit_code(), Some(42));
        assert!(state.dump().contains("exit code: 42"));
        assert!(state.dump().contains("sh -c 'exit 42'"));
        assert!(state.dump().contains("warning: deprecated"));
    }

    #[test]
    fn test_dump_mentions_attachments() {
        let command = CommandSpec::new("sh").arg("/tmp/run.sh").attach("/tmp/run.sh");
        let dump = render_dump(&command, Some(1), Some(1), None, &[], DEFAULT_DUMP_TAIL);
        assert!(dump.contains("attachments: /tmp/run.sh"));
    }

    #[test]
    fn test_dump_tail_limits_io() {
        let ledger = IoLedger::new();
        for i in 0..20 {
            ledger.record(IoKind::Output, format!("line{i}")).unwrap();
        }
        let dump = render_dump(
            &CommandSpec::new("x"),
            None,
            None,
            None,
            &ledger.events(),
            3,
        );
        assert!(!dump.contains("line16"));
        assert!(dump.contains("line17"));
        assert!(dump.contains("line19"));
    }

    #[test]
    fn test_display_summaries() {
        let succeeded = ExitState::Succeeded { pid: 1, io: vec![] };
        assert_eq!(succeeded.to_string(), "succeeded (pid 1)");

        let failed = ExitState::Failed {
            pid: 2,
            exit_code: 3,
            io: vec![],
            dump: String::new(),
        };
        assert_eq!(failed.to_string(), "failed with exit code 3 (pid 2)");

        let excepted = ExitState::Excepted {
            pid: None,
            exit_code: None,
            io: vec![],
            cause: ExecError::NotStarted,
            dump: String::new(),
        };
        assert!(excepted.to_string().contains("process not started"));
        assert!(excepted.cause().is_some());
    }
}

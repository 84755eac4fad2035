//! The Exec handle: one spawned process run.

use std::fmt;
use std::io::{Read, Write};
use std::process::{Child, ChildStdin, ExitStatus};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use tracing::{debug, warn};

use foreman_io::{
    BlockingLineReader, IoEvent, IoKind, IoLedger, MirrorRead, NonBlockingLineReader, TeeWriter,
};

use crate::command::CommandSpec;
use crate::error::{BoxError, ExecError, Result};
use crate::executor::{ExecutorConfig, Interactivity};
use crate::state::{render_dump, ExitContext, ExitState, ExitStateHandler};
use crate::termination::{TerminationCell, TerminationHandle};

/// Callback run after the streams drain but before classification; an error
/// forces the run to terminate as [`ExitState::Excepted`].
pub type PreTerminationCallback = Box<dyn FnOnce() -> std::result::Result<(), BoxError> + Send>;

/// Callback invoked best-effort once the terminal state is fixed.
pub type TerminationCallback =
    Box<dyn FnOnce(&ExitState) -> std::result::Result<(), BoxError> + Send>;

/// Callback receiving every IO event of a run in ledger order.
pub type Processor = Arc<dyn Fn(&IoEvent) + Send + Sync>;

enum IoMessage {
    Event { kind: IoKind, text: String },
    StreamClosed,
}

#[derive(Default)]
struct RuntimeState {
    started: bool,
    pid: Option<u32>,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    io_tx: Option<Sender<IoMessage>>,
}

struct ExecInner {
    command: CommandSpec,
    config: ExecutorConfig,
    interactivity: Interactivity,
    processor: Option<Processor>,
    handler: Arc<dyn ExitStateHandler>,
    ledger: Arc<IoLedger>,
    cell: Arc<TerminationCell>,
    runtime: Mutex<RuntimeState>,
    pre_callbacks: Mutex<Vec<PreTerminationCallback>>,
    post_callbacks: Mutex<Vec<TerminationCallback>>,
    out_mirror: Arc<Mutex<TeeWriter>>,
    err_mirror: Arc<Mutex<TeeWriter>>,
}

/// Handle for one spawned process run.
///
/// An Exec owns its process's lifecycle, its IO ledger, and its stream
/// handles. Output and error are drained by per-stream reader threads into a
/// single pump, which appends to the ledger (single writer), invokes the
/// processor in ledger order, and mirrors raw bytes to any attached sinks.
/// The terminal state resolves exactly once, no matter how termination was
/// triggered or how many observers wait for it.
///
/// Handles are cheap to clone and share one underlying run.
#[derive(Clone)]
pub struct Exec {
    inner: Arc<ExecInner>,
}

impl Exec {
    pub(crate) fn new(
        command: CommandSpec,
        config: ExecutorConfig,
        interactivity: Interactivity,
        processor: Option<Processor>,
        handler: Arc<dyn ExitStateHandler>,
    ) -> Self {
        Self {
            inner: Arc::new(ExecInner {
                command,
                config,
                interactivity,
                processor,
                handler,
                ledger: Arc::new(IoLedger::new()),
                cell: Arc::new(TerminationCell::new()),
                runtime: Mutex::new(RuntimeState::default()),
                pre_callbacks: Mutex::new(Vec::new()),
                post_callbacks: Mutex::new(Vec::new()),
                out_mirror: Arc::new(Mutex::new(TeeWriter::new())),
                err_mirror: Arc::new(Mutex::new(TeeWriter::new())),
            }),
        }
    }

    /// The command this run executes.
    pub fn command(&self) -> &CommandSpec {
        &self.inner.command
    }

    /// The process id, once spawned.
    pub fn pid(&self) -> Option<u32> {
        self.lock_runtime().pid
    }

    /// The run's IO ledger.
    pub fn io(&self) -> Arc<IoLedger> {
        Arc::clone(&self.inner.ledger)
    }

    /// The terminal state, if the run already terminated.
    pub fn exit_state(&self) -> Option<Arc<ExitState>> {
        self.inner.cell.peek()
    }

    /// Awaitable handle resolved exactly once when the run terminates.
    pub fn termination(&self) -> TerminationHandle {
        TerminationHandle::new(Arc::clone(&self.inner.cell))
    }

    /// Spawns the process. Calling this on an already-started Exec is a
    /// no-op.
    ///
    /// Spawning records a `Meta` event with the resolved command line and
    /// any attached files. A spawn failure resolves the run as
    /// [`ExitState::Excepted`] and is also returned.
    pub fn start(&self) -> Result<()> {
        let mut rt = self.lock_runtime();
        if rt.started {
            return Ok(());
        }
        rt.started = true;

        debug!(command = %self.inner.command, "spawning process");
        let mut child = match self.inner.command.to_command().spawn() {
            Ok(child) => child,
            Err(e) => {
                let command_line = self.inner.command.command_line();
                let returned = std::io::Error::new(e.kind(), e.to_string());
                let cause = ExecError::Spawn {
                    command: command_line.clone(),
                    source: e,
                };
                let dump = render_dump(
                    &self.inner.command,
                    None,
                    None,
                    Some(&cause as &dyn fmt::Display),
                    &[],
                    self.inner.config.dump_tail,
                );
                self.inner.cell.resolve(Arc::new(ExitState::Excepted {
                    pid: None,
                    exit_code: None,
                    io: Vec::new(),
                    cause,
                    dump,
                }));
                return Err(ExecError::Spawn {
                    command: command_line,
                    source: returned,
                });
            }
        };

        let pid = child.id();
        rt.pid = Some(pid);

        let (tx, rx) = mpsc::channel();

        // The spawn record is the first event every observer sees.
        let mut meta = format!("process {pid} started: {}", self.inner.command.command_line());
        if !self.inner.command.attachments().is_empty() {
            let attachments: Vec<String> = self
                .inner
                .command
                .attachments()
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            meta.push_str(&format!(" (attachments: {})", attachments.join(", ")));
        }
        let _ = tx.send(IoMessage::Event {
            kind: IoKind::Meta,
            text: meta,
        });

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        rt.stdin = child.stdin.take();

        if let Interactivity::NonInteractive { input } = &self.inner.interactivity {
            if let Some(input) = input {
                if let Some(stdin) = rt.stdin.as_mut() {
                    match stdin.write_all(input.as_bytes()).and_then(|_| stdin.flush()) {
                        Ok(()) => {
                            let _ = tx.send(IoMessage::Event {
                                kind: IoKind::Input,
                                text: input.clone(),
                            });
                        }
                        // The process may already have exited without
                        // reading; its own exit state tells the story.
                        Err(e) => warn!(pid, error = %e, "failed to write canned input"),
                    }
                }
            }
            // Closing stdin tells the process no further input is coming.
            rt.stdin = None;
        }

        rt.child = Some(child);
        rt.io_tx = Some(tx.clone());
        drop(rt);

        match stdout {
            Some(stdout) => self.drain_stream(
                stdout,
                IoKind::Output,
                Arc::clone(&self.inner.out_mirror),
                tx.clone(),
            ),
            None => {
                let _ = tx.send(IoMessage::StreamClosed);
            }
        }
        match stderr {
            Some(stderr) => self.drain_stream(
                stderr,
                IoKind::Error,
                Arc::clone(&self.inner.err_mirror),
                tx.clone(),
            ),
            None => {
                let _ = tx.send(IoMessage::StreamClosed);
            }
        }
        drop(tx);

        let exec = self.clone();
        thread::spawn(move || exec.monitor(rx));
        Ok(())
    }

    /// Requests cooperative termination: the input stream closes and, on
    /// unix, the process receives `SIGTERM`. Returns without waiting.
    ///
    /// A no-op once the run has terminated.
    pub fn stop(&self) -> Result<()> {
        if self.inner.cell.peek().is_some() {
            return Ok(());
        }
        let mut rt = self.lock_runtime();
        if !rt.started {
            return Err(ExecError::NotStarted);
        }
        // Closing stdin is the cooperative half: well-behaved filters exit
        // on end of input.
        rt.stdin = None;
        let pid = rt.pid;
        drop(rt);

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = pid {
                debug!(pid, "sending SIGTERM");
                if let Err(errno) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                    // ESRCH: the process is already gone.
                    if errno != nix::errno::Errno::ESRCH {
                        return Err(ExecError::Signal {
                            pid,
                            message: errno.to_string(),
                        });
                    }
                }
            }
            Ok(())
        }
        #[cfg(not(unix))]
        {
            let _ = pid;
            self.kill()
        }
    }

    /// Forcefully terminates the process.
    ///
    /// A no-op once the run has terminated.
    pub fn kill(&self) -> Result<()> {
        if self.inner.cell.peek().is_some() {
            return Ok(());
        }
        let mut rt = self.lock_runtime();
        if !rt.started {
            return Err(ExecError::NotStarted);
        }
        rt.stdin = None;
        let pid = rt.pid;
        if let Some(child) = rt.child.as_mut() {
            if let Some(pid) = pid {
                debug!(pid, "killing process");
            }
            match child.kill() {
                Ok(()) => {}
                // Exited between our check and the kill.
                Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => {}
                Err(e) => {
                    return Err(ExecError::Signal {
                        pid: pid.unwrap_or(0),
                        message: e.to_string(),
                    })
                }
            }
        }
        Ok(())
    }

    /// Blocks until the run terminates and returns the cached terminal
    /// state. Every concurrent caller receives the identical state.
    pub fn wait_for(&self) -> Result<Arc<ExitState>> {
        if self.inner.cell.peek().is_none() && !self.lock_runtime().started {
            return Err(ExecError::NotStarted);
        }
        Ok(self.inner.cell.wait())
    }

    /// Writes `text` to the process's input stream and records it as an
    /// `Input` event.
    pub fn write_input(&self, text: &str) -> Result<()> {
        let mut rt = self.lock_runtime();
        if !rt.started {
            return Err(ExecError::NotStarted);
        }
        let stdin = rt.stdin.as_mut().ok_or(ExecError::AlreadyTerminated)?;
        stdin.write_all(text.as_bytes()).map_err(ExecError::Input)?;
        stdin.flush().map_err(ExecError::Input)?;
        if let Some(tx) = &rt.io_tx {
            let _ = tx.send(IoMessage::Event {
                kind: IoKind::Input,
                text: text.to_string(),
            });
        }
        Ok(())
    }

    /// Closes the process's input stream, signalling end of input.
    pub fn close_input(&self) {
        self.lock_runtime().stdin = None;
    }

    /// Attaches a sink that receives a copy of every output byte.
    pub fn mirror_output(&self, sink: Box<dyn Write + Send>) {
        lock_tee(&self.inner.out_mirror).attach(sink);
    }

    /// Attaches a sink that receives a copy of every error byte.
    pub fn mirror_error(&self, sink: Box<dyn Write + Send>) {
        lock_tee(&self.inner.err_mirror).attach(sink);
    }

    /// Registers a callback run after the streams drain but before the exit
    /// state is classified. The first callback error forces the run to
    /// terminate as [`ExitState::Excepted`].
    ///
    /// Registration must happen before termination; later registrations
    /// never run.
    pub fn on_pre_termination<F>(&self, callback: F)
    where
        F: FnOnce() -> std::result::Result<(), BoxError> + Send + 'static,
    {
        self.lock_pre().push(Box::new(callback));
    }

    /// Registers a callback invoked once with the terminal state.
    ///
    /// If the run already terminated, the callback fires immediately with
    /// the cached state. Callback errors are logged and do not affect the
    /// fixed state or other callbacks.
    pub fn on_termination<F>(&self, callback: F)
    where
        F: FnOnce(&ExitState) -> std::result::Result<(), BoxError> + Send + 'static,
    {
        self.lock_post().push(Box::new(callback));
        if let Some(state) = self.inner.cell.peek() {
            // Terminated while registering: deliver now. Draining under the
            // lock keeps this race-free against the monitor's own drain.
            let callbacks: Vec<TerminationCallback> = self.lock_post().drain(..).collect();
            run_termination_callbacks(callbacks, &state);
        }
    }

    fn drain_stream<R>(
        &self,
        source: R,
        kind: IoKind,
        mirror: Arc<Mutex<TeeWriter>>,
        tx: Sender<IoMessage>,
    ) where
        R: Read + Send + 'static,
    {
        let interactivity = self.inner.interactivity.clone();
        let timeout = self.inner.config.read_timeout;
        thread::spawn(move || {
            let source = MirrorRead::new(source, mirror);
            match interactivity {
                Interactivity::Interactive { non_blocking: true } => {
                    let mut reader = NonBlockingLineReader::spawn(source);
                    loop {
                        let batch = reader.read_lines(timeout);
                        for line in batch.lines {
                            if tx.send(IoMessage::Event { kind, text: line }).is_err() {
                                return;
                            }
                        }
                        if batch.eof {
                            break;
                        }
                    }
                }
                _ => {
                    let mut reader = BlockingLineReader::new(source);
                    while let Some(line) = reader.next_line() {
                        if tx.send(IoMessage::Event { kind, text: line }).is_err() {
                            return;
                        }
                    }
                }
            }
            let _ = tx.send(IoMessage::StreamClosed);
        });
    }

    /// Pump loop and termination sequence; runs on the monitor thread.
    fn monitor(self, rx: Receiver<IoMessage>) {
        let mut open_streams = 2;
        while open_streams > 0 {
            match rx.recv() {
                Ok(IoMessage::Event { kind, text }) => self.pump(kind, text),
                Ok(IoMessage::StreamClosed) => open_streams -= 1,
                Err(_) => break,
            }
        }
        // Input events sent while the streams were closing may still be
        // queued; both StreamClosed markers are already consumed.
        while let Ok(IoMessage::Event { kind, text }) = rx.try_recv() {
            self.pump(kind, text);
        }
        self.finalize();
    }

    /// Single writer of the ledger; keeps processor delivery in ledger
    /// order.
    fn pump(&self, kind: IoKind, text: String) {
        match self.inner.ledger.record(kind, text) {
            Ok(event) => {
                if let Some(processor) = &self.inner.processor {
                    processor(&event);
                }
            }
            Err(e) => warn!(error = %e, "io event lost: ledger unavailable"),
        }
    }

    /// Computes and resolves the terminal state exactly once.
    fn finalize(&self) {
        let (pid, child) = {
            let mut rt = self.lock_runtime();
            rt.stdin = None;
            (rt.pid, rt.child.take())
        };

        // Pre-termination callbacks run before classification; the first
        // failure wins and the run is excepted.
        let mut pre_failure: Option<BoxError> = None;
        let callbacks: Vec<PreTerminationCallback> = self.lock_pre().drain(..).collect();
        for callback in callbacks {
            if let Err(e) = callback() {
                pre_failure = Some(e);
                break;
            }
        }

        // Reap the exit code exactly once. A run already doomed to
        // `Excepted` still reaps, so no zombie is left behind; the code is
        // then recorded but not classified.
        let mut reap_failure: Option<ExecError> = None;
        let exit_code: Option<i32> = match child {
            Some(mut child) => match child.wait() {
                Ok(status) => Some(exit_code_of(status)),
                Err(e) => {
                    reap_failure = Some(ExecError::Reap {
                        pid: pid.unwrap_or(0),
                        source: e,
                    });
                    None
                }
            },
            None => None,
        };

        let io = self.inner.ledger.events();
        let state = if let Some(cause) = pre_failure {
            self.excepted(pid, exit_code, io, ExecError::Callback(cause))
        } else if let Some(cause) = reap_failure {
            self.excepted(pid, None, io, cause)
        } else {
            match (pid, exit_code) {
                (Some(pid), Some(code)) => {
                    let ctx = ExitContext {
                        pid,
                        exit_code: code,
                        command: &self.inner.command,
                        io: &io,
                    };
                    match self.inner.handler.classify(ctx) {
                        Ok(state) => state,
                        Err(e) => {
                            self.excepted(Some(pid), Some(code), io, ExecError::Classification(e))
                        }
                    }
                }
                _ => self.excepted(pid, exit_code, io, ExecError::NotStarted),
            }
        };

        let state = Arc::new(state);
        self.inner.cell.resolve(Arc::clone(&state));
        debug!(state = %state, "process terminated");

        let callbacks: Vec<TerminationCallback> = self.lock_post().drain(..).collect();
        run_termination_callbacks(callbacks, &state);
    }

    fn excepted(
        &self,
        pid: Option<u32>,
        exit_code: Option<i32>,
        io: Vec<Arc<IoEvent>>,
        cause: ExecError,
    ) -> ExitState {
        let dump = render_dump(
            &self.inner.command,
            pid,
            exit_code,
            Some(&cause as &dyn fmt::Display),
            &io,
            self.inner.config.dump_tail,
        );
        ExitState::Excepted {
            pid,
            exit_code,
            io,
            cause,
            dump,
        }
    }

    fn lock_runtime(&self) -> MutexGuard<'_, RuntimeState> {
        match self.inner.runtime.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_pre(&self) -> MutexGuard<'_, Vec<PreTerminationCallback>> {
        match self.inner.pre_callbacks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_post(&self) -> MutexGuard<'_, Vec<TerminationCallback>> {
        match self.inner.post_callbacks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl fmt::Debug for Exec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rt = self.lock_runtime();
        f.debug_struct("Exec")
            .field("command", &self.inner.command.command_line())
            .field("started", &rt.started)
            .field("pid", &rt.pid)
            .field("terminated", &self.inner.cell.peek().is_some())
            .finish()
    }
}

fn lock_tee(tee: &Arc<Mutex<TeeWriter>>) -> MutexGuard<'_, TeeWriter> {
    match tee.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn run_termination_callbacks(callbacks: Vec<TerminationCallback>, state: &ExitState) {
    for callback in callbacks {
        if let Err(e) = callback(state) {
            warn!(error = %e, "termination callback failed");
        }
    }
}

/// Maps an exit status to a code, using the shell convention `128 + signal`
/// for signal-terminated processes.
fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::DefaultExitHandler;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn plain_exec(command: CommandSpec) -> Exec {
        Exec::new(
            command,
            ExecutorConfig::default(),
            Interactivity::default(),
            None,
            Arc::new(DefaultExitHandler::new()),
        )
    }

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh").arg("-c").arg(script)
    }

    #[test]
    fn test_echo_succeeds_with_single_output_event() {
        let exec = plain_exec(CommandSpec::new("echo").arg("hello"));
        exec.start().unwrap();
        let state = exec.wait_for().unwrap();

        assert!(state.successful());
        assert_eq!(state.exit_code(), Some(0));

        let outputs = exec.io().by_kind(IoKind::Output);
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].text(), "hello");
    }

    #[test]
    fn test_spawn_records_meta_event() {
        let exec = plain_exec(CommandSpec::new("true").attach("/tmp/ref.txt"));
        exec.start().unwrap();
        exec.wait_for().unwrap();

        let meta = exec.io().by_kind(IoKind::Meta);
        assert_eq!(meta.len(), 1);
        assert!(meta[0].text().contains("true"));
        assert!(meta[0].text().contains("/tmp/ref.txt"));
    }

    #[test]
    fn test_nonzero_exit_fails_with_dump() {
        let exec = plain_exec(sh("exit 42"));
        exec.start().unwrap();
        let state = exec.wait_for().unwrap();

        assert!(!state.successful());
        assert_eq!(state.exit_code(), Some(42));
        assert!(state.dump().contains("exit code: 42"));
    }

    #[test]
    fn test_start_is_idempotent() {
        let exec = plain_exec(CommandSpec::new("true"));
        exec.start().unwrap();
        exec.start().unwrap();
        let state = exec.wait_for().unwrap();
        assert!(state.successful());
        // One spawn, one meta event.
        assert_eq!(exec.io().by_kind(IoKind::Meta).len(), 1);
    }

    #[test]
    fn test_spawn_failure_resolves_excepted() {
        let exec = plain_exec(CommandSpec::new("/nonexistent/program/for/foreman"));
        assert!(matches!(exec.start(), Err(ExecError::Spawn { .. })));

        let state = exec.wait_for().unwrap();
        assert!(state.cause().is_some());
        assert!(state.dump().contains("cause:"));
        assert_eq!(state.pid(), None);
    }

    #[test]
    fn test_concurrent_waiters_get_identical_state() {
        let exec = plain_exec(sh("sleep 0.2; echo done"));
        exec.start().unwrap();

        let mut joins = Vec::new();
        for _ in 0..3 {
            let exec = exec.clone();
            joins.push(thread::spawn(move || exec.wait_for().unwrap()));
        }
        let here = exec.wait_for().unwrap();
        for join in joins {
            let there = join.join().unwrap();
            assert!(Arc::ptr_eq(&here, &there));
        }
    }

    #[test]
    fn test_stop_and_kill_are_noops_after_termination() {
        let exec = plain_exec(CommandSpec::new("true"));
        exec.start().unwrap();
        exec.wait_for().unwrap();

        exec.stop().unwrap();
        exec.kill().unwrap();
        exec.stop().unwrap();
    }

    #[test]
    fn test_lifecycle_before_start_errors() {
        let exec = plain_exec(CommandSpec::new("true"));
        assert!(matches!(exec.stop(), Err(ExecError::NotStarted)));
        assert!(matches!(exec.kill(), Err(ExecError::NotStarted)));
        assert!(matches!(exec.wait_for(), Err(ExecError::NotStarted)));
    }

    #[test]
    fn test_kill_terminates_long_running_process() {
        let exec = plain_exec(sh("sleep 30"));
        exec.start().unwrap();
        thread::sleep(Duration::from_millis(100));
        exec.kill().unwrap();

        let state = exec.wait_for().unwrap();
        assert!(!state.successful());
        // SIGKILL surfaces as 128 + 9 on unix.
        #[cfg(unix)]
        assert_eq!(state.exit_code(), Some(137));
    }

    #[cfg(unix)]
    #[test]
    fn test_stop_terminates_cooperatively() {
        let exec = plain_exec(sh("sleep 30"));
        exec.start().unwrap();
        thread::sleep(Duration::from_millis(100));
        exec.stop().unwrap();

        let state = exec.wait_for().unwrap();
        // SIGTERM surfaces as 128 + 15.
        assert_eq!(state.exit_code(), Some(143));
    }

    #[test]
    fn test_write_input_reaches_process_and_ledger() {
        let exec = Exec::new(
            CommandSpec::new("cat"),
            ExecutorConfig::default(),
            Interactivity::Interactive {
                non_blocking: false,
            },
            None,
            Arc::new(DefaultExitHandler::new()),
        );
        exec.start().unwrap();
        exec.write_input("ping\n").unwrap();
        exec.close_input();

        let state = exec.wait_for().unwrap();
        assert!(state.successful());

        let ledger = exec.io();
        assert_eq!(ledger.text(IoKind::Output), "ping");
        let inputs = ledger.by_kind(IoKind::Input);
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].text(), "ping\n");
    }

    #[test]
    fn test_write_input_after_termination_errors() {
        let exec = plain_exec(CommandSpec::new("true"));
        exec.start().unwrap();
        exec.wait_for().unwrap();
        assert!(matches!(
            exec.write_input("late"),
            Err(ExecError::AlreadyTerminated)
        ));
    }

    #[test]
    fn test_output_is_mirrored_while_captured() {
        #[derive(Clone, Default)]
        struct SharedBuf(Arc<Mutex<Vec<u8>>>);
        impl Write for SharedBuf {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mirror = SharedBuf::default();
        let exec = plain_exec(CommandSpec::new("echo").arg("teed"));
        exec.mirror_output(Box::new(mirror.clone()));
        exec.start().unwrap();
        exec.wait_for().unwrap();

        assert_eq!(exec.io().text(IoKind::Output), "teed");
        assert_eq!(String::from_utf8_lossy(&mirror.0.lock().unwrap()), "teed\n");
    }

    #[test]
    fn test_pre_termination_failure_takes_priority_over_exit_code() {
        let exec = plain_exec(CommandSpec::new("true"));
        exec.on_pre_termination(|| Err("callback exploded".into()));
        exec.start().unwrap();

        let state = exec.wait_for().unwrap();
        assert!(!state.successful());
        let cause = state.cause().expect("excepted state carries a cause");
        assert!(matches!(cause, ExecError::Callback(_)));
        // The real exit code is retained for inspection, not classified.
        assert_eq!(state.exit_code(), Some(0));
    }

    #[test]
    fn test_handler_failure_still_resolves_the_run() {
        struct ExplodingHandler;
        impl ExitStateHandler for ExplodingHandler {
            fn classify(
                &self,
                _ctx: ExitContext<'_>,
            ) -> std::result::Result<ExitState, BoxError> {
                Err("handler bug".into())
            }
        }

        let exec = Exec::new(
            CommandSpec::new("true"),
            ExecutorConfig::default(),
            Interactivity::default(),
            None,
            Arc::new(ExplodingHandler),
        );
        exec.start().unwrap();
        let state = exec.wait_for().unwrap();
        assert!(matches!(state.cause(), Some(ExecError::Classification(_))));
        assert_eq!(state.exit_code(), Some(0));
    }

    #[test]
    fn test_post_termination_callbacks_fire_exactly_once_each() {
        let counter = Arc::new(AtomicUsize::new(0));
        let exec = plain_exec(CommandSpec::new("true"));
        for _ in 0..3 {
            let counter = Arc::clone(&counter);
            exec.on_termination(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        exec.start().unwrap();
        exec.wait_for().unwrap();
        // Give the monitor thread time to run the callbacks after resolving.
        thread::sleep(Duration::from_millis(100));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_failing_post_callback_does_not_block_others() {
        let counter = Arc::new(AtomicUsize::new(0));
        let exec = plain_exec(CommandSpec::new("true"));
        exec.on_termination(|_| Err("first callback fails".into()));
        {
            let counter = Arc::clone(&counter);
            exec.on_termination(move |state| {
                assert!(state.successful());
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        exec.start().unwrap();
        exec.wait_for().unwrap();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_late_post_callback_fires_immediately() {
        let exec = plain_exec(CommandSpec::new("true"));
        exec.start().unwrap();
        exec.wait_for().unwrap();
        thread::sleep(Duration::from_millis(100));

        let fired = Arc::new(AtomicUsize::new(0));
        {
            let fired = Arc::clone(&fired);
            exec.on_termination(move |_| {
                fired.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_processor_sees_events_in_ledger_order() {
        let seen: Arc<Mutex<Vec<(IoKind, String)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let processor: Processor =
            Arc::new(move |event| sink.lock().unwrap().push((event.kind(), event.text().into())));

        let exec = Exec::new(
            sh("echo a; echo b; echo oops >&2; echo c"),
            ExecutorConfig::default(),
            Interactivity::default(),
            Some(processor),
            Arc::new(DefaultExitHandler::new()),
        );
        exec.start().unwrap();
        exec.wait_for().unwrap();
        thread::sleep(Duration::from_millis(100));

        let seen = seen.lock().unwrap();
        let ledger: Vec<(IoKind, String)> = exec
            .io()
            .events()
            .iter()
            .map(|e| (e.kind(), e.text().to_string()))
            .collect();
        assert_eq!(*seen, ledger);

        let outputs: Vec<&str> = seen
            .iter()
            .filter(|(kind, _)| *kind == IoKind::Output)
            .map(|(_, text)| text.as_str())
            .collect();
        assert_eq!(outputs, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_attached_script_file_runs_and_is_named_in_diagnostics() {
        use std::io::Write as _;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fail.sh");
        let mut file = std::fs::File::create(&script).unwrap();
        writeln!(file, "echo preparing").unwrap();
        writeln!(file, "exit 3").unwrap();
        drop(file);

        let exec = plain_exec(
            CommandSpec::new("sh")
                .arg(script.display().to_string())
                .attach(&script),
        );
        exec.start().unwrap();
        let state = exec.wait_for().unwrap();

        assert_eq!(state.exit_code(), Some(3));
        assert!(state.dump().contains("attachments:"));
        assert!(state.dump().contains("fail.sh"));
        assert!(state.dump().contains("preparing"));
    }

    #[test]
    fn test_cross_stream_events_keep_arrival_order() {
        let exec = plain_exec(sh("echo out1; sleep 0.2; echo err1 >&2; sleep 0.2; echo out2"));
        exec.start().unwrap();
        exec.wait_for().unwrap();

        let events = exec.io().events();
        let texts: Vec<&str> = events
            .iter()
            .filter(|e| e.kind() != IoKind::Meta)
            .map(|e| e.text())
            .collect();
        assert_eq!(texts, vec!["out1", "err1", "out2"]);
    }
}
